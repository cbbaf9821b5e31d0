use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("taxonomic details not found for TaxID {0}")]
    TaxonNotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    ConfigValue(String),

    #[error("Entrez request failed: {0}")]
    EntrezHttp(String),

    #[error("Entrez response truncated: {0}")]
    EntrezTruncated(String),

    #[error("Entrez protocol error: {0}")]
    EntrezProtocol(String),

    #[error("failed to parse Entrez XML: {0}")]
    XmlParse(String),

    #[error("GBIF request failed: {0}")]
    GbifHttp(String),

    #[error("GBIF returned status {status}: {message}")]
    GbifStatus { status: u16, message: String },

    #[error("Wikipedia request failed: {0}")]
    WikiHttp(String),

    #[error("Wikipedia returned status {status}: {message}")]
    WikiStatus { status: u16, message: String },

    #[error("server error: {0}")]
    Server(String),
}

impl ApiError {
    /// Failure classes the retry wrapper is allowed to absorb: a truncated
    /// transport read or a structured protocol error from the upstream.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::EntrezTruncated(_) | ApiError::EntrezProtocol(_)
        )
    }
}
