use std::collections::BTreeMap;

use serde::Serialize;

use crate::biosample;
use crate::domain::{
    GenomeSummary, GramFilter, GramStain, OxygenRequirement, SearchResultSummary, TaxonDetail,
    TaxonId,
};
use crate::entrez::{EntrezApi, NuccoreSummary, TaxonomySummary, extract_extra_token};
use crate::error::ApiError;
use crate::gbif::GbifClient;
use crate::wiki::{self, WikiApi};

/// Search candidates fetched per query term.
const SEARCH_RETMAX: usize = 30;
/// Candidates fully enriched when a Gram-stain filter is active.
const FILTER_DETAIL_LIMIT: usize = 20;
/// elink can return thousands of nucleotide IDs; only this many are
/// summarized when hunting for a reference genome.
const GENOME_SUMMARY_LIMIT: usize = 20;
/// Fallback genome records kept when no reference/representative title
/// is present.
const GENOME_FALLBACK_LIMIT: usize = 5;
/// Biosample records fetched per taxon.
const BIOSAMPLE_LIMIT: usize = 3;
/// Hard cap on batch detail requests, enforced before any remote call.
pub const BATCH_LIMIT: usize = 20;
/// Candidate TaxIDs summarized per suggestion query.
const SUGGEST_RETMAX: usize = 5;

pub struct App<E, W, G> {
    entrez: E,
    wiki: W,
    gbif: G,
}

/// Derived phenotype facts accumulated across taxonomy comments and
/// biosample records. First confident source wins; later sources never
/// overwrite.
#[derive(Debug, Default)]
struct DerivedFacts {
    gram: Option<GramStain>,
    oxygen: Option<OxygenRequirement>,
}

impl DerivedFacts {
    fn fill_gram(&mut self, candidate: Option<GramStain>) {
        if self.gram.is_none() {
            self.gram = candidate;
        }
    }

    fn fill_oxygen(&mut self, candidate: Option<OxygenRequirement>) {
        if self.oxygen.is_none() {
            self.oxygen = candidate;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BatchDetails {
    pub results: Vec<TaxonDetail>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

/// Merged GBIF classification and encyclopedia content for one searched
/// name. Unresolved fields are omitted from the JSON rendering.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedLookup {
    pub searched_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kingdom: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phylum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_key: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "wikipediaSummary", skip_serializing_if = "Option::is_none")]
    pub wikipedia_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CombinedLookup {
    pub fn found_anything(&self) -> bool {
        self.scientific_name.is_some()
            || self.image_url.is_some()
            || self.wikipedia_summary.is_some()
    }
}

impl<E, W, G> App<E, W, G>
where
    E: EntrezApi,
    W: WikiApi,
    G: GbifClient,
{
    pub fn new(entrez: E, wiki: W, gbif: G) -> Self {
        Self { entrez, wiki, gbif }
    }

    /// Full enrichment for one taxon: taxonomy record, linked genome
    /// summaries, linked biosample records, and the phenotype facts derived
    /// from them. Upstream failures past the taxonomy fetch degrade to empty
    /// sections instead of failing the whole record.
    pub fn fetch_detail(&self, tax_id: &TaxonId) -> Result<TaxonDetail, ApiError> {
        let record = self
            .entrez
            .fetch_taxonomy(tax_id.as_str())?
            .ok_or_else(|| ApiError::TaxonNotFound(tax_id.to_string()))?;

        let mut facts = DerivedFacts::default();
        let mut gram_from_taxonomy = None;
        for comment in &record.comments {
            if facts.gram.is_none() {
                if let Some(stain) = GramStain::from_text(comment) {
                    facts.gram = Some(stain);
                    gram_from_taxonomy = Some(stain);
                }
            }
            facts.fill_oxygen(OxygenRequirement::from_text(comment));
        }

        let genome_info = self.collect_genome_info(tax_id);
        let biosample_info = self.collect_biosample_info(tax_id);

        for sample in &biosample_info {
            facts.fill_oxygen(biosample::mine_oxygen_requirement(sample));
            facts.fill_gram(sample.gram_stain_biosample);
        }

        let primary_isolation_source = primary_isolation_source(&biosample_info);
        let primary_genome_size_bp = genome_info
            .iter()
            .map(|genome| genome.sequence_length.clone())
            .find(|len| len != "N/A")
            .unwrap_or_else(|| "N/A".to_string());

        Ok(TaxonDetail {
            tax_id: tax_id.to_string(),
            scientific_name: record.scientific_name,
            rank: record.rank,
            lineage: record.lineage,
            gram_stain_taxonomy_comment: gram_from_taxonomy,
            genome_info,
            biosample_info,
            gram_stain_derived: facts
                .gram
                .map(|stain| stain.to_string())
                .unwrap_or_else(|| "Not found".to_string()),
            oxygen_requirement_derived: facts
                .oxygen
                .map(|req| req.to_string())
                .unwrap_or_else(|| "Not found".to_string()),
            primary_isolation_source,
            primary_genome_size_bp,
        })
    }

    fn collect_genome_info(&self, tax_id: &TaxonId) -> Vec<GenomeSummary> {
        let ids = match self
            .entrez
            .linked_ids(tax_id.as_str(), "nuccore", "taxonomy_nuccore")
        {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(tax_id = %tax_id, error = %err, "nuccore link lookup failed");
                return Vec::new();
            }
        };
        if ids.is_empty() {
            return Vec::new();
        }

        let capped: Vec<String> = ids.into_iter().take(GENOME_SUMMARY_LIMIT).collect();
        let summaries = match self.entrez.summarize_nuccore(&capped) {
            Ok(summaries) => summaries,
            Err(err) => {
                tracing::warn!(tax_id = %tax_id, error = %err, "nuccore summary failed");
                return Vec::new();
            }
        };

        let preferred = summaries.iter().find(|summary| {
            let title = summary.title.to_lowercase();
            title.contains("reference genome") || title.contains("representative genome")
        });
        let chosen: Vec<&NuccoreSummary> = match preferred {
            Some(summary) => vec![summary],
            None => summaries.iter().take(GENOME_FALLBACK_LIMIT).collect(),
        };

        chosen.into_iter().map(build_genome_summary).collect()
    }

    fn collect_biosample_info(&self, tax_id: &TaxonId) -> Vec<crate::domain::BioSampleRecord> {
        let ids = match self
            .entrez
            .linked_ids(tax_id.as_str(), "biosample", "taxonomy_biosample")
        {
            Ok(ids) => ids,
            Err(err) => {
                tracing::warn!(tax_id = %tax_id, error = %err, "biosample link lookup failed");
                return Vec::new();
            }
        };
        let capped: Vec<String> = ids.into_iter().take(BIOSAMPLE_LIMIT).collect();
        if capped.is_empty() {
            return Vec::new();
        }

        let payload = match self.entrez.fetch_biosample_xml(&capped) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(tax_id = %tax_id, error = %err, "biosample fetch failed");
                return Vec::new();
            }
        };
        match biosample::parse_sample_set(&payload) {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(tax_id = %tax_id, error = %err, "biosample payload unparsable");
                Vec::new()
            }
        }
    }

    /// Name search, optionally narrowed by derived Gram stain. An active
    /// filter forces full enrichment of each candidate, so only the first
    /// candidates are considered.
    pub fn search(
        &self,
        term: &str,
        filter: GramFilter,
    ) -> Result<Vec<SearchResultSummary>, ApiError> {
        let ids = self.entrez.search_taxonomy(term, SEARCH_RETMAX)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        if filter == GramFilter::Any {
            let summaries = self.entrez.summarize_taxonomy(&ids)?;
            return Ok(summaries
                .into_iter()
                .map(|summary| SearchResultSummary {
                    scientific_name: summary.scientific_name,
                    tax_id: summary.tax_id,
                })
                .collect());
        }

        let mut results = Vec::new();
        for raw_id in ids.iter().take(FILTER_DETAIL_LIMIT) {
            let tax_id: TaxonId = match raw_id.parse() {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(raw_id = %raw_id, error = %err, "skipping unusable TaxID");
                    continue;
                }
            };
            let detail = match self.fetch_detail(&tax_id) {
                Ok(detail) => detail,
                Err(err) => {
                    tracing::warn!(tax_id = %tax_id, error = %err, "skipping candidate");
                    continue;
                }
            };
            if filter.matches(detail.derived_gram_stain()) {
                results.push(SearchResultSummary {
                    scientific_name: detail.scientific_name,
                    tax_id: detail.tax_id,
                });
            }
        }
        Ok(results)
    }

    /// Enriches up to `BATCH_LIMIT` taxa. Per-item failures land in the
    /// `errors` map keyed by the requested ID; the batch itself only fails
    /// on invalid input.
    pub fn batch_details(&self, tax_ids: &[String]) -> Result<BatchDetails, ApiError> {
        if tax_ids.is_empty() {
            return Err(ApiError::InvalidRequest(
                "'tax_ids' list must not be empty".to_string(),
            ));
        }
        if tax_ids.len() > BATCH_LIMIT {
            return Err(ApiError::InvalidRequest(format!(
                "at most {BATCH_LIMIT} tax_ids are allowed per request, got {}",
                tax_ids.len()
            )));
        }

        let mut results = Vec::new();
        let mut errors = BTreeMap::new();
        for raw_id in tax_ids {
            let outcome = raw_id
                .parse::<TaxonId>()
                .and_then(|tax_id| self.fetch_detail(&tax_id));
            match outcome {
                Ok(detail) => results.push(detail),
                Err(err) => {
                    tracing::warn!(tax_id = %raw_id, error = %err, "batch item failed");
                    errors.insert(raw_id.clone(), err.to_string());
                }
            }
        }
        Ok(BatchDetails { results, errors })
    }

    /// Suggests a scientific name for a vernacular one via two taxonomy
    /// searches (field-qualified, then bare) and a rank-ranked summary pass.
    pub fn suggest_scientific_name(&self, common_name: &str) -> Result<Option<String>, ApiError> {
        let qualified = format!("{common_name}[Common Name] OR {common_name}[Organism]");
        let mut ids = self.entrez.search_taxonomy(&qualified, SUGGEST_RETMAX)?;
        if ids.is_empty() {
            ids = self.entrez.search_taxonomy(common_name, SUGGEST_RETMAX)?;
        }
        if ids.is_empty() {
            return Ok(None);
        }
        let summaries = self.entrez.summarize_taxonomy(&ids)?;
        Ok(pick_suggestion(&summaries))
    }

    /// Legacy combined lookup: GBIF backbone classification merged with
    /// encyclopedia media/summary. Partial results still resolve; the
    /// `message` field flags a degraded classification.
    pub fn lookup(&self, name: &str) -> CombinedLookup {
        let mut out = CombinedLookup {
            searched_name: name.to_string(),
            ..CombinedLookup::default()
        };

        let mut gbif_scientific: Option<String> = None;
        match self.gbif.match_name(name) {
            Ok(matched) if matched.is_confident() => {
                gbif_scientific = matched.scientific_name.clone();
                out.scientific_name = matched.scientific_name;
                out.kingdom = matched.kingdom;
                out.phylum = matched.phylum;
                out.class = matched.class;
                out.order = matched.order;
                out.family = matched.family;
                out.genus = matched.genus;
                // The species epithet is only trustworthy when GBIF also
                // resolved a species-level key.
                out.species = if matched.species_key.is_some() {
                    matched.species
                } else {
                    None
                };
                out.usage_key = matched.usage_key;
                out.confidence = matched.confidence;
                out.match_type = matched.match_type;
                out.status = matched.status;
                out.rank = matched.rank;
            }
            Ok(matched) => {
                tracing::info!(
                    name = %name,
                    match_type = matched.match_type.as_deref().unwrap_or("NONE"),
                    confidence = matched.confidence.unwrap_or(0),
                    "no confident backbone match"
                );
            }
            Err(err) => {
                tracing::warn!(name = %name, error = %err, "backbone match failed");
                out.message = Some(
                    "Taxonomic classification is temporarily unavailable.".to_string(),
                );
            }
        }

        let content = wiki::collect_content(&self.wiki, name, gbif_scientific.as_deref());
        out.image_url = content.image_url;
        out.wikipedia_summary = content.summary;

        if out.scientific_name.is_none()
            && out.message.is_none()
            && (out.image_url.is_some() || out.wikipedia_summary.is_some())
        {
            out.message = Some(
                "No confident taxonomic match was found; encyclopedia content is shown for the searched name."
                    .to_string(),
            );
        }
        out
    }
}

fn build_genome_summary(summary: &NuccoreSummary) -> GenomeSummary {
    let sequence_length = summary
        .sequence_length
        .map(|len| len.to_string())
        .or_else(|| {
            summary
                .extra
                .as_deref()
                .and_then(|extra| extract_extra_token(extra, "SLen"))
        })
        .unwrap_or_else(|| "N/A".to_string());
    let molecule_type = summary
        .topology
        .clone()
        .or_else(|| {
            summary
                .extra
                .as_deref()
                .and_then(|extra| extract_extra_token(extra, "Mol"))
        })
        .unwrap_or_else(|| "N/A".to_string());
    GenomeSummary {
        nuccore_id: summary.uid.clone(),
        title: summary.title.clone(),
        sequence_length,
        molecule_type,
        definition: summary.definition.clone().unwrap_or_default(),
    }
}

/// Attribute names accepted as a primary isolation source. Attribute order
/// decides between them: the first matching attribute across samples wins,
/// regardless of which of these names it carries.
const ISOLATION_SOURCE_NAMES: &[&str] = &["isolation source", "host", "geo_loc_name"];

fn primary_isolation_source(samples: &[crate::domain::BioSampleRecord]) -> String {
    for sample in samples {
        for attr in &sample.attributes {
            if ISOLATION_SOURCE_NAMES.contains(&attr.name.to_lowercase().as_str())
                && !attr.value.trim().is_empty()
            {
                return attr.value.clone();
            }
        }
    }
    samples
        .first()
        .and_then(|sample| sample.attributes.first())
        .map(|attr| attr.value.clone())
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "N/A".to_string())
}

fn pick_suggestion(summaries: &[TaxonomySummary]) -> Option<String> {
    let mut species = None;
    let mut subspecies = None;
    let mut genus = None;
    let mut family = None;
    let mut other = None;

    for summary in summaries {
        let name = summary.scientific_name.trim();
        if name.is_empty() || name == "N/A" {
            continue;
        }
        let rank = summary
            .rank
            .as_deref()
            .map(|rank| rank.to_lowercase())
            .unwrap_or_default();
        let slot = match rank.as_str() {
            "species" => &mut species,
            "subspecies" => &mut subspecies,
            "genus" => &mut genus,
            "family" => &mut family,
            _ => &mut other,
        };
        if slot.is_none() {
            *slot = Some(name.to_string());
        }
    }

    species
        .or_else(|| subspecies.map(|name| trim_to_binomial(&name)))
        .or(genus)
        .or(family)
        .or(other)
}

/// Subspecies names are reported as the plain binomial.
fn trim_to_binomial(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(tax_id: &str, name: &str, rank: Option<&str>) -> TaxonomySummary {
        TaxonomySummary {
            tax_id: tax_id.to_string(),
            scientific_name: name.to_string(),
            rank: rank.map(|r| r.to_string()),
        }
    }

    #[test]
    fn suggestion_prefers_species_rank() {
        let summaries = vec![
            summary("1", "Felidae", Some("family")),
            summary("2", "Panthera leo", Some("species")),
            summary("3", "Panthera", Some("genus")),
        ];
        assert_eq!(pick_suggestion(&summaries).as_deref(), Some("Panthera leo"));
    }

    #[test]
    fn subspecies_suggestion_trimmed_to_binomial() {
        let summaries = vec![summary(
            "1",
            "Canis lupus familiaris",
            Some("subspecies"),
        )];
        assert_eq!(pick_suggestion(&summaries).as_deref(), Some("Canis lupus"));
    }

    #[test]
    fn binomial_trim_keeps_short_names() {
        assert_eq!(trim_to_binomial("Panthera"), "Panthera");
    }
}
