use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

static GRAM_POSITIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)gram[\s-]?positive").unwrap());
static GRAM_NEGATIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)gram[\s-]?negative").unwrap());

/// Opaque taxonomy-database identifier, supplied by the caller or discovered
/// via search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxonId(String);

impl TaxonId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TaxonId {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_string();
        if normalized.is_empty() || normalized.chars().any(char::is_whitespace) {
            return Err(ApiError::InvalidRequest(format!(
                "invalid tax_id: {value:?}"
            )));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GramStain {
    #[serde(rename = "Gram-positive")]
    Positive,
    #[serde(rename = "Gram-negative")]
    Negative,
}

impl GramStain {
    /// Best-effort scan of free text for a Gram-stain signal, tolerant of
    /// hyphen or space between the words and of letter case.
    pub fn from_text(text: &str) -> Option<Self> {
        if GRAM_POSITIVE.is_match(text) {
            Some(GramStain::Positive)
        } else if GRAM_NEGATIVE.is_match(text) {
            Some(GramStain::Negative)
        } else {
            None
        }
    }

    /// Interpretation of the value of an attribute whose *name* already
    /// mentions "gram": a bare "positive"/"negative" counts.
    pub fn from_attribute_value(value: &str) -> Option<Self> {
        let lower = value.to_lowercase();
        if lower.contains("positive") {
            Some(GramStain::Positive)
        } else if lower.contains("negative") {
            Some(GramStain::Negative)
        } else {
            None
        }
    }
}

impl fmt::Display for GramStain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GramStain::Positive => write!(f, "Gram-positive"),
            GramStain::Negative => write!(f, "Gram-negative"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GramFilter {
    Any,
    Positive,
    Negative,
}

impl GramFilter {
    pub fn matches(&self, derived: Option<GramStain>) -> bool {
        match self {
            GramFilter::Any => true,
            GramFilter::Positive => derived == Some(GramStain::Positive),
            GramFilter::Negative => derived == Some(GramStain::Negative),
        }
    }
}

impl FromStr for GramFilter {
    type Err = ApiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "any" => Ok(GramFilter::Any),
            "positive" => Ok(GramFilter::Positive),
            "negative" => Ok(GramFilter::Negative),
            other => Err(ApiError::InvalidRequest(format!(
                "invalid 'gram_filter' value {other:?}: must be 'any', 'positive', or 'negative'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OxygenRequirement {
    Aerobic,
    Anaerobic,
    Facultative,
    Microaerophilic,
}

impl OxygenRequirement {
    /// Maps a free-text attribute value onto a requirement category. The
    /// most specific token is checked first so that "anaerobic" is never
    /// misread as aerobic.
    pub fn from_text(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        if lower.contains("microaerophilic") {
            Some(OxygenRequirement::Microaerophilic)
        } else if lower.contains("facultative") {
            Some(OxygenRequirement::Facultative)
        } else if lower.contains("anaerobic") {
            Some(OxygenRequirement::Anaerobic)
        } else if lower.contains("aerobic") {
            Some(OxygenRequirement::Aerobic)
        } else {
            None
        }
    }
}

impl fmt::Display for OxygenRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OxygenRequirement::Aerobic => write!(f, "Aerobic"),
            OxygenRequirement::Anaerobic => write!(f, "Anaerobic"),
            OxygenRequirement::Facultative => write!(f, "Facultative"),
            OxygenRequirement::Microaerophilic => write!(f, "Microaerophilic"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LineageEntry {
    pub rank: Option<String>,
    pub scientific_name: String,
}

/// Linked nucleotide-database summary, at most one reference/representative
/// record preferred over up to five fallback records.
#[derive(Debug, Clone, Serialize)]
pub struct GenomeSummary {
    pub nuccore_id: String,
    pub title: String,
    pub sequence_length: String,
    pub molecule_type: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleAttribute {
    pub name: String,
    pub value: String,
}

/// One parsed biosample record. Attribute order is preserved exactly as
/// returned by the upstream: first-match heuristics depend on it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BioSampleRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub attributes: Vec<SampleAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gram_stain_biosample: Option<GramStain>,
}

/// Aggregate detail record for one taxon. Created fresh per request and
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TaxonDetail {
    pub tax_id: String,
    pub scientific_name: String,
    pub rank: String,
    pub lineage: Vec<LineageEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gram_stain_taxonomy_comment: Option<GramStain>,
    pub genome_info: Vec<GenomeSummary>,
    pub biosample_info: Vec<BioSampleRecord>,
    pub gram_stain_derived: String,
    pub oxygen_requirement_derived: String,
    pub primary_isolation_source: String,
    pub primary_genome_size_bp: String,
}

impl TaxonDetail {
    pub fn derived_gram_stain(&self) -> Option<GramStain> {
        GramStain::from_text(&self.gram_stain_derived)
    }
}

/// Lightweight projection used by the search/filter endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResultSummary {
    pub scientific_name: String,
    pub tax_id: String,
}

/// Illustrative encyclopedia content, recomputed per request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WikiContent {
    #[serde(rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "summary", skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}
