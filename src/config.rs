use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
pub const DEFAULT_GBIF_BASE_URL: &str = "https://api.gbif.org/v1";
pub const DEFAULT_WIKI_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// On-disk configuration (`taxon-gateway.json`). Every field is optional;
/// secrets and contact identity may instead come from the environment.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub ncbi_api_key: Option<String>,
    #[serde(default)]
    pub eutils_base_url: Option<String>,
    #[serde(default)]
    pub gbif_base_url: Option<String>,
    #[serde(default)]
    pub wiki_api_url: Option<String>,
    #[serde(default)]
    pub retry_max_attempts: Option<usize>,
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub host: String,
    pub port: u16,
    /// Upstream contact identity sent with every Entrez call. Required
    /// before the boundary layer starts accepting requests.
    pub contact_email: String,
    pub tool: String,
    pub ncbi_api_key: Option<String>,
    pub eutils_base_url: String,
    pub gbif_base_url: String,
    pub wiki_api_url: String,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the optional JSON config file, then lets environment variables
    /// (`NCBI_CONTACT_EMAIL`, `NCBI_API_KEY`) take precedence. An explicit
    /// path must exist; the default path is allowed to be absent.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, ApiError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from("taxon-gateway.json"),
        };

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| ApiError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| ApiError::ConfigParse(err.to_string()))?
        } else if path.is_some() {
            return Err(ApiError::ConfigRead(config_path));
        } else {
            Config::default()
        };

        let mut resolved = Self::resolve_config(config)?;
        if let Ok(email) = std::env::var("NCBI_CONTACT_EMAIL") {
            if !email.trim().is_empty() {
                resolved.contact_email = email.trim().to_string();
            }
        }
        if let Ok(api_key) = std::env::var("NCBI_API_KEY") {
            if !api_key.trim().is_empty() {
                resolved.ncbi_api_key = Some(api_key.trim().to_string());
            }
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, ApiError> {
        if let Some(port) = config.port {
            if port == 0 {
                return Err(ApiError::ConfigValue("port must be non-zero".to_string()));
            }
        }
        Ok(ResolvedConfig {
            host: config.host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port: config.port.unwrap_or(5004),
            contact_email: config.contact_email.unwrap_or_default(),
            tool: config.tool.unwrap_or_else(|| "taxon-gateway".to_string()),
            ncbi_api_key: config.ncbi_api_key,
            eutils_base_url: config
                .eutils_base_url
                .unwrap_or_else(|| DEFAULT_EUTILS_BASE_URL.to_string()),
            gbif_base_url: config
                .gbif_base_url
                .unwrap_or_else(|| DEFAULT_GBIF_BASE_URL.to_string()),
            wiki_api_url: config
                .wiki_api_url
                .unwrap_or_else(|| DEFAULT_WIKI_API_URL.to_string()),
            retry_max_attempts: config.retry_max_attempts.unwrap_or(3),
            retry_base_delay_ms: config.retry_base_delay_ms.unwrap_or(340),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_config_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.port, 5004);
        assert_eq!(resolved.tool, "taxon-gateway");
        assert_eq!(resolved.eutils_base_url, DEFAULT_EUTILS_BASE_URL);
        assert_eq!(resolved.retry_max_attempts, 3);
        assert_eq!(resolved.retry_base_delay_ms, 340);
    }

    #[test]
    fn resolve_config_rejects_zero_port() {
        let config = Config {
            port: Some(0),
            ..Config::default()
        };
        assert!(ConfigLoader::resolve_config(config).is_err());
    }
}
