use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::config::ResolvedConfig;
use crate::error::ApiError;

/// Name-match response from the GBIF backbone taxonomy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GbifMatch {
    #[serde(default)]
    pub match_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<i64>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub kingdom: Option<String>,
    #[serde(default)]
    pub phylum: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub order: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub genus: Option<String>,
    #[serde(default)]
    pub species: Option<String>,
    #[serde(default)]
    pub species_key: Option<i64>,
    #[serde(default)]
    pub usage_key: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub rank: Option<String>,
}

impl GbifMatch {
    /// Matches below this confidence, or with no match at all, are treated
    /// as misses by the combined lookup.
    pub fn is_confident(&self) -> bool {
        self.match_type.as_deref().unwrap_or("NONE") != "NONE"
            && self.confidence.unwrap_or(0) >= 30
    }
}

pub trait GbifClient: Send + Sync {
    fn match_name(&self, name: &str) -> Result<GbifMatch, ApiError>;
}

#[derive(Clone)]
pub struct GbifHttpClient {
    client: Client,
    base_url: String,
}

impl GbifHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("taxon-gateway/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ApiError::GbifHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| ApiError::GbifHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.gbif_base_url.clone(),
        })
    }
}

impl GbifClient for GbifHttpClient {
    fn match_name(&self, name: &str) -> Result<GbifMatch, ApiError> {
        let url = format!("{}/species/match", self.base_url);
        let response = self
            .client
            .get(url)
            .query(&[("name", name), ("verbose", "true")])
            .send()
            .map_err(|err| ApiError::GbifHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "GBIF request failed".to_string());
            return Err(ApiError::GbifStatus { status, message });
        }
        response
            .json()
            .map_err(|err| ApiError::GbifHttp(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_threshold() {
        let miss = GbifMatch {
            match_type: Some("NONE".to_string()),
            ..GbifMatch::default()
        };
        assert!(!miss.is_confident());

        let weak = GbifMatch {
            match_type: Some("FUZZY".to_string()),
            confidence: Some(20),
            ..GbifMatch::default()
        };
        assert!(!weak.is_confident());

        let hit = GbifMatch {
            match_type: Some("EXACT".to_string()),
            confidence: Some(97),
            scientific_name: Some("Panthera leo (Linnaeus, 1758)".to_string()),
            ..GbifMatch::default()
        };
        assert!(hit.is_confident());
    }
}
