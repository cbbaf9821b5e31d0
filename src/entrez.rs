use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ResolvedConfig;
use crate::domain::LineageEntry;
use crate::error::ApiError;

/// Pacing and retry parameters for Entrez calls. The upstream rate limit
/// requires a delay before every call, not just before retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(340),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Fixed minimum pacing on the first attempt, escalating linearly on
    /// retries: `base * (1 + 2 * attempt_index)`.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        self.base_delay * (1 + 2 * attempt as u32)
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping before every
/// attempt including the first. Only transient failures (truncated reads,
/// structured protocol errors) consume further attempts; anything else is
/// returned immediately.
pub fn with_retry<T, F>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, ApiError>
where
    F: FnMut() -> Result<T, ApiError>,
{
    let mut last_error = None;
    for attempt in 0..policy.max_attempts {
        thread::sleep(policy.delay_for(attempt));
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "transient failure during {what}, retrying"
                );
                last_error = Some(err);
            }
            Err(err) => {
                tracing::error!(error = %err, "non-retryable failure during {what}");
                return Err(err);
            }
        }
    }
    tracing::error!(
        max_attempts = policy.max_attempts,
        "all attempts failed for {what}"
    );
    Err(last_error
        .unwrap_or_else(|| ApiError::EntrezHttp(format!("no attempts executed for {what}"))))
}

/// Taxonomy record as returned by an efetch against the taxonomy database.
#[derive(Debug, Clone)]
pub struct TaxonomyRecord {
    pub scientific_name: String,
    pub rank: String,
    pub lineage: Vec<LineageEntry>,
    /// "Other names" annotations whose class is "comment"; these carry the
    /// free-text phenotype notes mined for Gram stain and oxygen keywords.
    pub comments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TaxonomySummary {
    pub tax_id: String,
    pub scientific_name: String,
    pub rank: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NuccoreSummary {
    pub uid: String,
    pub title: String,
    pub sequence_length: Option<u64>,
    pub topology: Option<String>,
    pub definition: Option<String>,
    /// Encoded auxiliary string, mined for `SLen=`/`Mol=` tokens when the
    /// dedicated fields are absent.
    pub extra: Option<String>,
}

pub trait EntrezApi: Send + Sync {
    fn search_taxonomy(&self, term: &str, retmax: usize) -> Result<Vec<String>, ApiError>;
    fn summarize_taxonomy(&self, ids: &[String]) -> Result<Vec<TaxonomySummary>, ApiError>;
    fn fetch_taxonomy(&self, tax_id: &str) -> Result<Option<TaxonomyRecord>, ApiError>;
    fn linked_ids(&self, tax_id: &str, db: &str, linkname: &str) -> Result<Vec<String>, ApiError>;
    fn summarize_nuccore(&self, ids: &[String]) -> Result<Vec<NuccoreSummary>, ApiError>;
    fn fetch_biosample_xml(&self, ids: &[String]) -> Result<String, ApiError>;
}

#[derive(Clone)]
pub struct EntrezHttpClient {
    client: Client,
    base_url: String,
    tool: String,
    email: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl EntrezHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, ApiError> {
        if config.contact_email.trim().is_empty() {
            return Err(ApiError::ConfigValue(
                "Entrez contact email is required (set contact_email or NCBI_CONTACT_EMAIL)"
                    .to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("taxon-gateway/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ApiError::EntrezHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| ApiError::EntrezHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.eutils_base_url.clone(),
            tool: config.tool.clone(),
            email: config.contact_email.trim().to_string(),
            api_key: config.ncbi_api_key.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn request(&self, endpoint: &str, params: &[(&str, &str)]) -> reqwest::blocking::RequestBuilder {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut request = self
            .client
            .get(url)
            .query(params)
            .query(&[("tool", self.tool.as_str()), ("email", self.email.as_str())]);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("api_key", api_key.as_str())]);
        }
        request
    }

    fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let response = self
            .request(endpoint, params)
            .send()
            .map_err(classify_transport_error)?;
        let response = handle_status(response)?;
        let value: Value = response
            .json()
            .map_err(|err| ApiError::EntrezTruncated(err.to_string()))?;
        if let Some(message) = protocol_error(&value) {
            return Err(ApiError::EntrezProtocol(message));
        }
        Ok(value)
    }

    fn get_text(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, ApiError> {
        let response = self
            .request(endpoint, params)
            .send()
            .map_err(classify_transport_error)?;
        let response = handle_status(response)?;
        response
            .text()
            .map_err(|err| ApiError::EntrezTruncated(err.to_string()))
    }
}

impl EntrezApi for EntrezHttpClient {
    fn search_taxonomy(&self, term: &str, retmax: usize) -> Result<Vec<String>, ApiError> {
        let retmax = retmax.to_string();
        let value = with_retry(&self.retry, &format!("esearch for {term:?}"), || {
            self.get_json(
                "esearch.fcgi",
                &[
                    ("db", "taxonomy"),
                    ("term", term),
                    ("retmax", retmax.as_str()),
                    ("sort", "relevance"),
                    ("retmode", "json"),
                ],
            )
        })?;
        Ok(extract_id_list(&value))
    }

    fn summarize_taxonomy(&self, ids: &[String]) -> Result<Vec<TaxonomySummary>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        let what = format!("esummary taxonomy for {} TaxIDs", ids.len());
        let value = with_retry(&self.retry, &what, || {
            self.get_json(
                "esummary.fcgi",
                &[
                    ("db", "taxonomy"),
                    ("id", joined.as_str()),
                    ("retmode", "json"),
                    ("version", "2.0"),
                ],
            )
        })?;
        Ok(extract_taxonomy_summaries(&value))
    }

    fn fetch_taxonomy(&self, tax_id: &str) -> Result<Option<TaxonomyRecord>, ApiError> {
        let what = format!("efetch taxonomy for TaxID {tax_id}");
        let records = with_retry(&self.retry, &what, || {
            let xml = self.get_text(
                "efetch.fcgi",
                &[("db", "taxonomy"), ("id", tax_id), ("retmode", "xml")],
            )?;
            parse_taxa_set(&xml)
        })?;
        Ok(records.into_iter().next())
    }

    fn linked_ids(&self, tax_id: &str, db: &str, linkname: &str) -> Result<Vec<String>, ApiError> {
        let what = format!("elink {db} for TaxID {tax_id}");
        let value = with_retry(&self.retry, &what, || {
            self.get_json(
                "elink.fcgi",
                &[
                    ("dbfrom", "taxonomy"),
                    ("db", db),
                    ("id", tax_id),
                    ("linkname", linkname),
                    ("retmode", "json"),
                ],
            )
        })?;
        Ok(extract_linked_ids(&value))
    }

    fn summarize_nuccore(&self, ids: &[String]) -> Result<Vec<NuccoreSummary>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join(",");
        let what = format!("esummary nuccore for {} IDs", ids.len());
        let value = with_retry(&self.retry, &what, || {
            self.get_json(
                "esummary.fcgi",
                &[
                    ("db", "nuccore"),
                    ("id", joined.as_str()),
                    ("retmode", "json"),
                    ("version", "2.0"),
                ],
            )
        })?;
        Ok(extract_nuccore_summaries(&value))
    }

    fn fetch_biosample_xml(&self, ids: &[String]) -> Result<String, ApiError> {
        if ids.is_empty() {
            return Ok(String::new());
        }
        let joined = ids.join(",");
        let what = format!("efetch biosample for {} IDs", ids.len());
        with_retry(&self.retry, &what, || {
            self.get_text(
                "efetch.fcgi",
                &[("db", "biosample"), ("id", joined.as_str()), ("retmode", "xml")],
            )
        })
    }
}

fn classify_transport_error(err: reqwest::Error) -> ApiError {
    if err.is_body() || err.is_decode() {
        ApiError::EntrezTruncated(err.to_string())
    } else {
        ApiError::EntrezHttp(err.to_string())
    }
}

fn handle_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, ApiError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "Entrez request failed".to_string());
    if matches!(status, 429 | 500 | 502 | 503 | 504) {
        Err(ApiError::EntrezProtocol(format!("status {status}: {message}")))
    } else {
        Err(ApiError::EntrezHttp(format!("status {status}: {message}")))
    }
}

/// Structured error envelopes that arrive with a 200 status.
fn protocol_error(value: &Value) -> Option<String> {
    if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
        return Some(message.to_string());
    }
    value
        .get("esearchresult")
        .and_then(|v| v.get("ERROR"))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn extract_id_list(value: &Value) -> Vec<String> {
    value
        .get("esearchresult")
        .and_then(|v| v.get("idlist"))
        .and_then(|v| v.as_array())
        .map(|ids| ids.iter().filter_map(value_to_string).collect())
        .unwrap_or_default()
}

pub fn extract_taxonomy_summaries(value: &Value) -> Vec<TaxonomySummary> {
    let Some(result) = value.get("result") else {
        return Vec::new();
    };
    let uids = result
        .get("uids")
        .and_then(|v| v.as_array())
        .map(|uids| uids.iter().filter_map(value_to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    uids.into_iter()
        .filter_map(|uid| {
            let record = result.get(uid.as_str())?;
            let scientific_name = record
                .get("scientificname")
                .and_then(|v| v.as_str())
                .unwrap_or("N/A")
                .to_string();
            let tax_id = record
                .get("taxid")
                .and_then(value_to_string)
                .unwrap_or_else(|| uid.clone());
            let rank = record
                .get("rank")
                .and_then(|v| v.as_str())
                .filter(|rank| !rank.is_empty())
                .map(|rank| rank.to_string());
            Some(TaxonomySummary {
                tax_id,
                scientific_name,
                rank,
            })
        })
        .collect()
}

/// First link set, first link database: the link queries here always name a
/// single linkname, so anything beyond that is upstream noise.
pub fn extract_linked_ids(value: &Value) -> Vec<String> {
    value
        .get("linksets")
        .and_then(|v| v.as_array())
        .and_then(|sets| sets.first())
        .and_then(|set| set.get("linksetdbs"))
        .and_then(|v| v.as_array())
        .and_then(|dbs| dbs.first())
        .and_then(|db| db.get("links"))
        .and_then(|v| v.as_array())
        .map(|links| links.iter().filter_map(value_to_string).collect())
        .unwrap_or_default()
}

pub fn extract_nuccore_summaries(value: &Value) -> Vec<NuccoreSummary> {
    let Some(result) = value.get("result") else {
        return Vec::new();
    };
    let uids = result
        .get("uids")
        .and_then(|v| v.as_array())
        .map(|uids| uids.iter().filter_map(value_to_string).collect::<Vec<_>>())
        .unwrap_or_default();
    uids.into_iter()
        .filter_map(|uid| {
            let record = result.get(uid.as_str())?;
            Some(NuccoreSummary {
                title: record
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string(),
                sequence_length: record.get("slen").and_then(|v| v.as_u64()),
                topology: record
                    .get("topology")
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string()),
                definition: record
                    .get("definition")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                extra: record
                    .get("extra")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                uid,
            })
        })
        .collect()
}

/// Picks a `Key=value` token out of the encoded "extra" summary field.
pub fn extract_extra_token(extra: &str, key: &str) -> Option<String> {
    let prefix = format!("{key}=");
    extra
        .split_whitespace()
        .find_map(|part| part.strip_prefix(prefix.as_str()))
        .map(|rest| rest.to_string())
}

#[derive(Debug, Deserialize)]
struct TaxaSetXml {
    #[serde(rename = "Taxon", default)]
    taxa: Vec<TaxonXml>,
}

#[derive(Debug, Deserialize)]
struct TaxonXml {
    #[serde(rename = "ScientificName", default)]
    scientific_name: Option<String>,
    #[serde(rename = "Rank", default)]
    rank: Option<String>,
    #[serde(rename = "OtherNames", default)]
    other_names: Option<OtherNamesXml>,
    #[serde(rename = "LineageEx", default)]
    lineage_ex: Option<LineageExXml>,
}

#[derive(Debug, Default, Deserialize)]
struct OtherNamesXml {
    #[serde(rename = "Name", default)]
    names: Vec<NameXml>,
}

#[derive(Debug, Deserialize)]
struct NameXml {
    #[serde(rename = "ClassCDE", default)]
    class_cde: String,
    #[serde(rename = "DispName", default)]
    disp_name: String,
}

#[derive(Debug, Default, Deserialize)]
struct LineageExXml {
    #[serde(rename = "Taxon", default)]
    taxa: Vec<LineageTaxonXml>,
}

#[derive(Debug, Deserialize)]
struct LineageTaxonXml {
    #[serde(rename = "ScientificName", default)]
    scientific_name: Option<String>,
    #[serde(rename = "Rank", default)]
    rank: Option<String>,
}

/// Parses an efetch taxonomy payload. Lineage order is preserved exactly as
/// received (root to leaf); entries without a scientific name are dropped.
pub fn parse_taxa_set(xml: &str) -> Result<Vec<TaxonomyRecord>, ApiError> {
    let parsed: TaxaSetXml =
        quick_xml::de::from_str(xml).map_err(|err| ApiError::XmlParse(err.to_string()))?;
    let records = parsed
        .taxa
        .into_iter()
        .map(|taxon| {
            let lineage = taxon
                .lineage_ex
                .unwrap_or_default()
                .taxa
                .into_iter()
                .filter_map(|entry| {
                    entry.scientific_name.map(|scientific_name| LineageEntry {
                        rank: entry.rank,
                        scientific_name,
                    })
                })
                .collect();
            let comments = taxon
                .other_names
                .unwrap_or_default()
                .names
                .into_iter()
                .filter(|name| name.class_cde == "comment")
                .map(|name| name.disp_name)
                .collect();
            TaxonomyRecord {
                scientific_name: taxon
                    .scientific_name
                    .unwrap_or_else(|| "N/A".to_string()),
                rank: taxon.rank.unwrap_or_else(|| "N/A".to_string()),
                lineage,
                comments,
            }
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_token_parsing() {
        let extra = "gi|545778205|gb|U00096.3| SLen=4641652 Mol=dna";
        assert_eq!(
            extract_extra_token(extra, "SLen").as_deref(),
            Some("4641652")
        );
        assert_eq!(extract_extra_token(extra, "Mol").as_deref(), Some("dna"));
        assert_eq!(extract_extra_token(extra, "Topology"), None);
    }

    #[test]
    fn delay_escalates_linearly() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(300));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
    }
}
