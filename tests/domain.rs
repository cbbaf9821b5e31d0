use serde_json::json;

use taxon_gateway::domain::{
    GramFilter, GramStain, TaxonDetail, WikiContent,
};

fn minimal_detail(gram: &str) -> TaxonDetail {
    TaxonDetail {
        tax_id: "562".to_string(),
        scientific_name: "Escherichia coli".to_string(),
        rank: "species".to_string(),
        lineage: Vec::new(),
        gram_stain_taxonomy_comment: None,
        genome_info: Vec::new(),
        biosample_info: Vec::new(),
        gram_stain_derived: gram.to_string(),
        oxygen_requirement_derived: "Not found".to_string(),
        primary_isolation_source: "N/A".to_string(),
        primary_genome_size_bp: "N/A".to_string(),
    }
}

#[test]
fn derived_gram_stain_round_trips_through_display() {
    assert_eq!(
        minimal_detail("Gram-negative").derived_gram_stain(),
        Some(GramStain::Negative)
    );
    assert_eq!(minimal_detail("Not found").derived_gram_stain(), None);
}

#[test]
fn filter_matches_derived_values() {
    let negative = minimal_detail("Gram-negative");
    assert!(GramFilter::Any.matches(negative.derived_gram_stain()));
    assert!(GramFilter::Negative.matches(negative.derived_gram_stain()));
    assert!(!GramFilter::Positive.matches(negative.derived_gram_stain()));

    let unknown = minimal_detail("Not found");
    assert!(GramFilter::Any.matches(unknown.derived_gram_stain()));
    assert!(!GramFilter::Negative.matches(unknown.derived_gram_stain()));
}

#[test]
fn detail_serializes_with_stable_field_names() {
    let value = serde_json::to_value(minimal_detail("Gram-negative")).unwrap();
    assert_eq!(value["tax_id"], json!("562"));
    assert_eq!(value["scientific_name"], json!("Escherichia coli"));
    assert_eq!(value["gram_stain_derived"], json!("Gram-negative"));
    assert_eq!(value["primary_genome_size_bp"], json!("N/A"));
    assert!(value.get("gram_stain_taxonomy_comment").is_none());
}

#[test]
fn wiki_content_uses_camel_case_image_field() {
    let content = WikiContent {
        image_url: Some("https://upload.example/x.jpg".to_string()),
        summary: None,
    };
    let value = serde_json::to_value(&content).unwrap();
    assert_eq!(value["imageUrl"], json!("https://upload.example/x.jpg"));
    assert!(value.get("summary").is_none());
}
