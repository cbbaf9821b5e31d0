use std::collections::HashMap;
use std::sync::Mutex;

use taxon_gateway::error::ApiError;
use taxon_gateway::wiki::{
    PageOutcome, WikiApi, build_priority_keywords, collect_content, pick_best_image, score_image,
};

#[derive(Default)]
struct ScriptedWiki {
    outcomes: HashMap<String, PageOutcome>,
    summaries: HashMap<(String, u8), String>,
    images: HashMap<String, Vec<String>>,
    search_hits: HashMap<String, Vec<String>>,
    lookups: Mutex<Vec<String>>,
}

impl WikiApi for ScriptedWiki {
    fn lookup(&self, term: &str, _auto_suggest: bool) -> Result<PageOutcome, ApiError> {
        self.lookups.lock().unwrap().push(term.to_string());
        Ok(self
            .outcomes
            .get(term)
            .cloned()
            .unwrap_or(PageOutcome::Missing))
    }

    fn search(&self, term: &str, _limit: usize) -> Result<Vec<String>, ApiError> {
        Ok(self.search_hits.get(term).cloned().unwrap_or_default())
    }

    fn summary(&self, title: &str, sentences: u8) -> Result<Option<String>, ApiError> {
        Ok(self.summaries.get(&(title.to_string(), sentences)).cloned())
    }

    fn images(&self, title: &str) -> Result<Vec<String>, ApiError> {
        Ok(self.images.get(title).cloned().unwrap_or_default())
    }
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

#[test]
fn species_photo_beats_neutral_image() {
    let kws = build_priority_keywords(Some("escherichia_coli"), Some("e._coli"));
    let urls = vec![
        "https://upload.example/some_random_plate.jpg".to_string(),
        "https://upload.example/escherichia_coli_micrograph.jpg".to_string(),
    ];
    let best = pick_best_image(&urls, &kws, Some("escherichia_coli"));
    assert_eq!(
        best.as_deref(),
        Some("https://upload.example/escherichia_coli_micrograph.jpg")
    );
}

#[test]
fn blocked_keywords_disqualify_images() {
    let kws = keywords(&["panthera_leo"]);
    assert_eq!(
        score_image(
            "https://upload.example/panthera_leo_range_map.png",
            &kws,
            Some("panthera_leo"),
        ),
        None
    );
    assert_eq!(
        score_image("https://upload.example/cladogram_cats.png", &kws, None),
        None
    );
    assert_eq!(
        score_image("https://upload.example/notes.pdf", &kws, None),
        None
    );
}

#[test]
fn filename_prefix_and_scientific_match_stack_bonuses() {
    let kws = keywords(&["panthera_leo", "panthera"]);
    // contains (+5 each keyword) + prefix (+3 each) + scientific-in-filename (+5)
    let score = score_image(
        "https://upload.example/panthera_leo_male.jpg",
        &kws,
        Some("panthera_leo"),
    )
    .unwrap();
    assert_eq!(score, 21);

    let neutral = score_image("https://upload.example/zebra.jpg", &kws, None).unwrap();
    assert_eq!(neutral, 0);
}

#[test]
fn taxobox_bonus_and_svg_penalty() {
    let kws: Vec<String> = Vec::new();
    assert_eq!(
        score_image("https://upload.example/taxobox_header.jpg", &kws, None),
        Some(2)
    );
    // thumbnail renditions of SVGs carry both extensions
    assert_eq!(
        score_image("https://upload.example/plain.jpg/200px-plain.svg", &kws, None),
        Some(-1)
    );
}

#[test]
fn negative_scores_yield_no_image() {
    let kws: Vec<String> = Vec::new();
    let urls = vec!["https://upload.example/plain.jpg/200px-plain.svg".to_string()];
    assert_eq!(pick_best_image(&urls, &kws, None), None);
}

#[test]
fn ties_keep_the_first_image() {
    let kws: Vec<String> = Vec::new();
    let urls = vec![
        "https://upload.example/first.jpg".to_string(),
        "https://upload.example/second.jpg".to_string(),
    ];
    assert_eq!(
        pick_best_image(&urls, &kws, None).as_deref(),
        Some("https://upload.example/first.jpg")
    );
}

#[test]
fn scientific_name_tried_before_user_term_and_stops_early() {
    let mut wiki = ScriptedWiki::default();
    wiki.outcomes.insert(
        "Panthera leo".to_string(),
        PageOutcome::Resolved("Lion".to_string()),
    );
    wiki.summaries.insert(
        ("Lion".to_string(), 2),
        "The lion is a large cat of the genus Panthera, native to Africa and India; males have a prominent mane.".to_string(),
    );
    wiki.images.insert(
        "Lion".to_string(),
        vec!["//upload.example/panthera_leo_male.jpg".to_string()],
    );

    let content = collect_content(&wiki, "Lion", Some("Panthera leo (Linnaeus, 1758)"));
    assert_eq!(
        content.image_url.as_deref(),
        Some("https://upload.example/panthera_leo_male.jpg")
    );
    assert!(content.summary.is_some());
    // Both facts were satisfied by the scientific name, so the user term was
    // never looked up.
    assert_eq!(*wiki.lookups.lock().unwrap(), vec!["Panthera leo"]);
}

#[test]
fn short_summary_triggers_wider_extract() {
    let mut wiki = ScriptedWiki::default();
    wiki.outcomes.insert(
        "Aardvark".to_string(),
        PageOutcome::Resolved("Aardvark".to_string()),
    );
    wiki.summaries
        .insert(("Aardvark".to_string(), 2), "A burrowing mammal.".to_string());
    wiki.summaries.insert(
        ("Aardvark".to_string(), 3),
        "A burrowing mammal. The aardvark is nocturnal and feeds almost exclusively on ants and termites across sub-Saharan Africa.".to_string(),
    );

    let content = collect_content(&wiki, "Aardvark", None);
    assert!(content.summary.unwrap().contains("nocturnal"));
}

#[test]
fn disambiguation_requeues_first_two_options() {
    let mut wiki = ScriptedWiki::default();
    wiki.outcomes.insert(
        "Jaguar".to_string(),
        PageOutcome::Disambiguation(vec![
            "Jaguar (animal)".to_string(),
            "Jaguar Cars".to_string(),
            "Jaguar (band)".to_string(),
        ]),
    );
    wiki.outcomes.insert(
        "Jaguar (animal)".to_string(),
        PageOutcome::Resolved("Jaguar (animal)".to_string()),
    );
    wiki.summaries.insert(
        ("Jaguar (animal)".to_string(), 2),
        "The jaguar is a large cat species and the only living member of the genus Panthera native to the Americas.".to_string(),
    );

    let content = collect_content(&wiki, "Jaguar", None);
    assert!(content.summary.is_some());
    let lookups = wiki.lookups.lock().unwrap();
    assert!(lookups.contains(&"Jaguar (animal)".to_string()));
    assert!(!lookups.contains(&"Jaguar (band)".to_string()));
}

#[test]
fn missing_page_falls_back_to_text_search() {
    let mut wiki = ScriptedWiki::default();
    wiki.search_hits.insert(
        "sea wolf fish".to_string(),
        vec!["Atlantic wolffish".to_string()],
    );
    wiki.outcomes.insert(
        "Atlantic wolffish".to_string(),
        PageOutcome::Resolved("Atlantic wolffish".to_string()),
    );
    wiki.summaries.insert(
        ("Atlantic wolffish".to_string(), 2),
        "The Atlantic wolffish is a marine fish of the wolffish family, found in the North Atlantic Ocean.".to_string(),
    );

    let content = collect_content(&wiki, "sea wolf fish", None);
    assert!(content.summary.unwrap().contains("wolffish"));
}

#[test]
fn search_hit_disambiguation_requeues_options() {
    let mut wiki = ScriptedWiki::default();
    // The term itself has no page; the one-result search lands on a
    // disambiguation page whose options must be tried in turn.
    wiki.search_hits
        .insert("sole".to_string(), vec!["Sole".to_string()]);
    wiki.outcomes.insert(
        "Sole".to_string(),
        PageOutcome::Disambiguation(vec![
            "Sole (fish)".to_string(),
            "Sole, Norway".to_string(),
            "Sole (band)".to_string(),
        ]),
    );
    wiki.outcomes.insert(
        "Sole (fish)".to_string(),
        PageOutcome::Resolved("Sole (fish)".to_string()),
    );
    wiki.summaries.insert(
        ("Sole (fish)".to_string(), 2),
        "Sole is a group of flatfish species belonging to several families, prized as food fish in many coastal cuisines.".to_string(),
    );

    let content = collect_content(&wiki, "sole", None);
    assert!(content.summary.unwrap().contains("flatfish"));
    let lookups = wiki.lookups.lock().unwrap();
    assert!(lookups.contains(&"Sole (fish)".to_string()));
    assert!(!lookups.contains(&"Sole (band)".to_string()));
}

#[test]
fn no_candidates_returns_empty_content() {
    let wiki = ScriptedWiki::default();
    let content = collect_content(&wiki, "", None);
    assert_eq!(content.image_url, None);
    assert_eq!(content.summary, None);
}
