use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::WikiContent;
use crate::error::ApiError;

/// Filename fragments that mark an image as non-illustrative (range maps,
/// diagrams, audio icons and similar).
pub const BLOCKED_IMAGE_KEYWORDS: &[&str] = &[
    "map",
    "range",
    "distribution",
    "locator",
    "chart",
    "diagram",
    "logo",
    "icon",
    "disambig",
    "sound",
    "audio",
    "timeline",
    "scale",
    "reconstruction",
    "skeleton",
    "skull",
    "footprint",
    "tracks",
    "scat",
    "phylogeny",
    "cladogram",
    "taxonomy",
    "cite_note",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Canonical page title after redirects/suggestions.
    Resolved(String),
    Missing,
    /// The title maps to multiple candidate pages; carries the first options.
    Disambiguation(Vec<String>),
}

pub trait WikiApi: Send + Sync {
    fn lookup(&self, term: &str, auto_suggest: bool) -> Result<PageOutcome, ApiError>;
    fn search(&self, term: &str, limit: usize) -> Result<Vec<String>, ApiError>;
    fn summary(&self, title: &str, sentences: u8) -> Result<Option<String>, ApiError>;
    fn images(&self, title: &str) -> Result<Vec<String>, ApiError>;
}

#[derive(Clone)]
pub struct WikiHttpClient {
    client: Client,
    api_url: String,
}

impl WikiHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("taxon-gateway/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ApiError::WikiHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| ApiError::WikiHttp(err.to_string()))?;
        Ok(Self {
            client,
            api_url: config.wiki_api_url.clone(),
        })
    }

    fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .query(&[("format", "json"), ("formatversion", "2")])
            .send()
            .map_err(|err| ApiError::WikiHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "Wikipedia request failed".to_string());
            return Err(ApiError::WikiStatus { status, message });
        }
        response
            .json()
            .map_err(|err| ApiError::WikiHttp(err.to_string()))
    }

    /// Suggestion-assisted title resolution, mirroring the encyclopedia
    /// service's "did you mean" behavior.
    fn suggest_title(&self, term: &str) -> Result<String, ApiError> {
        let value = self.get_json(&[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", term),
            ("srlimit", "1"),
            ("srinfo", "suggestion"),
            ("srprop", ""),
        ])?;
        if let Some(suggestion) = value
            .get("query")
            .and_then(|v| v.get("searchinfo"))
            .and_then(|v| v.get("suggestion"))
            .and_then(|v| v.as_str())
        {
            return Ok(suggestion.to_string());
        }
        Ok(first_search_title(&value).unwrap_or_else(|| term.to_string()))
    }

    fn disambiguation_options(&self, title: &str) -> Result<Vec<String>, ApiError> {
        let value = self.get_json(&[
            ("action", "query"),
            ("titles", title),
            ("prop", "links"),
            ("plnamespace", "0"),
            ("pllimit", "10"),
        ])?;
        Ok(value
            .get("query")
            .and_then(|v| v.get("pages"))
            .and_then(|v| v.as_array())
            .and_then(|pages| pages.first())
            .and_then(|page| page.get("links"))
            .and_then(|v| v.as_array())
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| link.get("title").and_then(|v| v.as_str()))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn first_search_title(value: &Value) -> Option<String> {
    value
        .get("query")
        .and_then(|v| v.get("search"))
        .and_then(|v| v.as_array())
        .and_then(|hits| hits.first())
        .and_then(|hit| hit.get("title"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl WikiApi for WikiHttpClient {
    fn lookup(&self, term: &str, auto_suggest: bool) -> Result<PageOutcome, ApiError> {
        let title = if auto_suggest {
            self.suggest_title(term)?
        } else {
            term.to_string()
        };
        let value = self.get_json(&[
            ("action", "query"),
            ("titles", title.as_str()),
            ("redirects", "1"),
            ("prop", "pageprops"),
            ("ppprop", "disambiguation"),
        ])?;
        let Some(page) = value
            .get("query")
            .and_then(|v| v.get("pages"))
            .and_then(|v| v.as_array())
            .and_then(|pages| pages.first())
        else {
            return Ok(PageOutcome::Missing);
        };
        if page.get("missing").and_then(|v| v.as_bool()).unwrap_or(false) {
            return Ok(PageOutcome::Missing);
        }
        let resolved_title = page
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or(title.as_str())
            .to_string();
        let is_disambiguation = page
            .get("pageprops")
            .map(|props| props.get("disambiguation").is_some())
            .unwrap_or(false);
        if is_disambiguation {
            let options = self.disambiguation_options(&resolved_title)?;
            return Ok(PageOutcome::Disambiguation(options));
        }
        Ok(PageOutcome::Resolved(resolved_title))
    }

    fn search(&self, term: &str, limit: usize) -> Result<Vec<String>, ApiError> {
        let limit = limit.to_string();
        let value = self.get_json(&[
            ("action", "query"),
            ("list", "search"),
            ("srsearch", term),
            ("srlimit", limit.as_str()),
            ("srprop", ""),
        ])?;
        Ok(value
            .get("query")
            .and_then(|v| v.get("search"))
            .and_then(|v| v.as_array())
            .map(|hits| {
                hits.iter()
                    .filter_map(|hit| hit.get("title").and_then(|v| v.as_str()))
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn summary(&self, title: &str, sentences: u8) -> Result<Option<String>, ApiError> {
        let sentences = sentences.to_string();
        let value = self.get_json(&[
            ("action", "query"),
            ("titles", title),
            ("redirects", "1"),
            ("prop", "extracts"),
            ("explaintext", "1"),
            ("exsentences", sentences.as_str()),
        ])?;
        Ok(value
            .get("query")
            .and_then(|v| v.get("pages"))
            .and_then(|v| v.as_array())
            .and_then(|pages| pages.first())
            .and_then(|page| page.get("extract"))
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }

    fn images(&self, title: &str) -> Result<Vec<String>, ApiError> {
        let value = self.get_json(&[
            ("action", "query"),
            ("titles", title),
            ("redirects", "1"),
            ("generator", "images"),
            ("gimlimit", "500"),
            ("prop", "imageinfo"),
            ("iiprop", "url"),
        ])?;
        Ok(value
            .get("query")
            .and_then(|v| v.get("pages"))
            .and_then(|v| v.as_array())
            .map(|pages| {
                pages
                    .iter()
                    .filter_map(|page| {
                        page.get("imageinfo")
                            .and_then(|v| v.as_array())
                            .and_then(|infos| infos.first())
                            .and_then(|info| info.get("url"))
                            .and_then(|v| v.as_str())
                    })
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Locates the best illustrative image and a short summary for the given
/// name candidates. Candidates are tried in order (normalized scientific
/// name first); disambiguation options are requeued instead of failing.
pub fn collect_content(
    api: &dyn WikiApi,
    user_name: &str,
    gbif_scientific_name: Option<&str>,
) -> WikiContent {
    let mut content = WikiContent::default();

    let clean_sci = gbif_scientific_name.and_then(clean_scientific_name);
    let sci_keyword = clean_sci.as_deref().map(normalize_keyword);
    let user_keyword = if user_name.is_empty() {
        None
    } else {
        Some(normalize_keyword(user_name))
    };

    let mut queue: VecDeque<String> = VecDeque::new();
    if let Some(sci) = &clean_sci {
        queue.push_back(sci.clone());
    }
    if !user_name.is_empty() {
        let duplicate = clean_sci
            .as_deref()
            .map(|sci| sci.eq_ignore_ascii_case(user_name))
            .unwrap_or(false);
        if !duplicate {
            queue.push_back(user_name.to_string());
        }
    }
    if queue.is_empty() {
        return content;
    }

    let priority_keywords =
        build_priority_keywords(sci_keyword.as_deref(), user_keyword.as_deref());

    let mut processed: HashSet<String> = HashSet::new();
    while let Some(term) = queue.pop_front() {
        if term.is_empty() || processed.contains(&term) {
            continue;
        }
        processed.insert(term.clone());

        tracing::debug!(term = %term, "resolving encyclopedia page");
        let outcome = match api.lookup(&term, true) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(term = %term, error = %err, "page lookup failed");
                continue;
            }
        };

        let title = match outcome {
            PageOutcome::Resolved(title) => Some(title),
            PageOutcome::Missing => resolve_via_search(
                api,
                &term,
                &processed,
                &mut queue,
                content.summary.is_none(),
            ),
            PageOutcome::Disambiguation(options) => {
                if content.summary.is_none() {
                    enqueue_options(&mut queue, &processed, options);
                }
                None
            }
        };
        let Some(title) = title else {
            continue;
        };

        if content.summary.is_none() {
            match api.summary(&title, 2) {
                Ok(Some(text)) => {
                    let mut summary = text;
                    if summary.len() < 100 || summary.to_lowercase().contains("may refer to") {
                        if let Ok(Some(longer)) = api.summary(&title, 3) {
                            if longer.len() > summary.len() {
                                summary = longer;
                            }
                        }
                    }
                    content.summary = Some(summary);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(title = %title, error = %err, "summary fetch failed");
                }
            }
        }

        if content.image_url.is_none() {
            match api.images(&title) {
                Ok(urls) => {
                    content.image_url =
                        pick_best_image(&urls, &priority_keywords, sci_keyword.as_deref());
                }
                Err(err) => {
                    tracing::warn!(title = %title, error = %err, "image listing failed");
                }
            }
        }

        if content.summary.is_some() && content.image_url.is_some() {
            let satisfied_by_scientific = clean_sci.as_deref() == Some(term.as_str());
            let scientific_pending = clean_sci
                .as_deref()
                .map(|sci| !processed.contains(sci))
                .unwrap_or(false);
            if satisfied_by_scientific || !scientific_pending {
                return content;
            }
        }
    }

    content
}

fn resolve_via_search(
    api: &dyn WikiApi,
    term: &str,
    processed: &HashSet<String>,
    queue: &mut VecDeque<String>,
    summary_pending: bool,
) -> Option<String> {
    let hits = match api.search(term, 1) {
        Ok(hits) => hits,
        Err(err) => {
            tracing::warn!(term = %term, error = %err, "fallback search failed");
            return None;
        }
    };
    let hit = hits.into_iter().next()?;
    if processed.contains(&hit) {
        return None;
    }
    match api.lookup(&hit, false) {
        Ok(PageOutcome::Resolved(title)) => Some(title),
        Ok(PageOutcome::Disambiguation(options)) => {
            if summary_pending {
                enqueue_options(queue, processed, options);
            }
            None
        }
        Ok(PageOutcome::Missing) => None,
        Err(err) => {
            tracing::warn!(title = %hit, error = %err, "page lookup via search failed");
            None
        }
    }
}

fn enqueue_options(queue: &mut VecDeque<String>, processed: &HashSet<String>, options: Vec<String>) {
    for option in options.into_iter().take(2) {
        if !processed.contains(&option) && !queue.contains(&option) {
            queue.push_back(option);
        }
    }
}

/// Strips the authorship suffix GBIF appends in parentheses.
pub fn clean_scientific_name(raw: &str) -> Option<String> {
    let cleaned = raw.split('(').next().unwrap_or("").trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

pub fn normalize_keyword(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Keyword list used for image scoring: the normalized names plus their
/// genus tokens, de-duplicated in priority order.
pub fn build_priority_keywords(
    sci_keyword: Option<&str>,
    user_keyword: Option<&str>,
) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    let mut push_unique = |keywords: &mut Vec<String>, candidate: &str| {
        if !candidate.is_empty() && !keywords.iter().any(|k| k == candidate) {
            keywords.push(candidate.to_string());
        }
    };

    if let Some(sci) = sci_keyword {
        push_unique(&mut keywords, sci);
        if let Some((genus, _)) = sci.split_once('_') {
            push_unique(&mut keywords, genus);
        }
    }

    if let Some(user) = user_keyword {
        if sci_keyword != Some(user) {
            push_unique(&mut keywords, user);
        }
        if let Some((user_genus, _)) = user.split_once('_') {
            let shadowed = match sci_keyword {
                Some(sci) => match sci.split_once('_') {
                    Some((sci_genus, _)) => user_genus == sci_genus,
                    None => user_genus == sci,
                },
                None => false,
            };
            if !shadowed {
                push_unique(&mut keywords, user_genus);
            }
        }
    }

    keywords
}

/// Scores one candidate image URL. `None` means the image is ineligible
/// (wrong extension or a blocked keyword); otherwise higher is better.
pub fn score_image(
    url: &str,
    priority_keywords: &[String],
    sci_keyword: Option<&str>,
) -> Option<i32> {
    let url_lower = url.to_lowercase();
    if ![".png", ".jpg", ".jpeg"]
        .iter()
        .any(|ext| url_lower.contains(ext))
    {
        return None;
    }
    if BLOCKED_IMAGE_KEYWORDS
        .iter()
        .any(|keyword| url_lower.contains(keyword))
    {
        return None;
    }

    let filename = url_lower.rsplit('/').next().unwrap_or(url_lower.as_str());
    let mut score = 0;
    for keyword in priority_keywords {
        if url_lower.contains(keyword.as_str()) {
            score += 5;
            if filename.starts_with(keyword.as_str()) {
                score += 3;
            }
            if Some(keyword.as_str()) == sci_keyword && filename.contains(keyword.as_str()) {
                score += 5;
            }
        }
    }
    if url_lower.contains("taxobox") {
        score += 2;
    }
    if url_lower.ends_with(".svg") {
        score -= 1;
    }
    Some(score)
}

/// Highest-scoring eligible image, first wins on ties; protocol-relative
/// URLs are normalized to https.
pub fn pick_best_image(
    urls: &[String],
    priority_keywords: &[String],
    sci_keyword: Option<&str>,
) -> Option<String> {
    let mut best: Option<(&String, i32)> = None;
    for url in urls {
        let Some(score) = score_image(url, priority_keywords, sci_keyword) else {
            continue;
        };
        if best.map(|(_, best_score)| score > best_score).unwrap_or(true) {
            best = Some((url, score));
        }
    }
    best.filter(|(_, score)| *score >= 0)
        .map(|(url, _)| normalize_image_url(url))
}

fn normalize_image_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_name_strips_authorship() {
        assert_eq!(
            clean_scientific_name("Panthera leo (Linnaeus, 1758)").as_deref(),
            Some("Panthera leo")
        );
        assert_eq!(clean_scientific_name("  (1758)"), None);
    }

    #[test]
    fn keyword_normalization() {
        assert_eq!(normalize_keyword("Escherichia Coli"), "escherichia_coli");
    }

    #[test]
    fn genus_tokens_deduplicated() {
        let keywords = build_priority_keywords(Some("panthera_leo"), Some("panthera_tigris"));
        assert_eq!(
            keywords,
            vec!["panthera_leo", "panthera", "panthera_tigris"]
        );
    }

    #[test]
    fn protocol_relative_urls_normalized() {
        assert_eq!(
            normalize_image_url("//upload.example/img.jpg"),
            "https://upload.example/img.jpg"
        );
        assert_eq!(
            normalize_image_url("https://upload.example/img.jpg"),
            "https://upload.example/img.jpg"
        );
    }
}
