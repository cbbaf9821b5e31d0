use assert_matches::assert_matches;

use taxon_gateway::config::{Config, ConfigLoader, DEFAULT_WIKI_API_URL};
use taxon_gateway::error::ApiError;

#[test]
fn explicit_config_path_must_exist() {
    let err = ConfigLoader::resolve(Some("/nonexistent/taxon-gateway.json")).unwrap_err();
    assert_matches!(err, ApiError::ConfigRead(_));
}

#[test]
fn file_values_override_defaults() {
    let config: Config = serde_json::from_str(
        r#"{
            "port": 8080,
            "contact_email": "ops@example.org",
            "retry_max_attempts": 5
        }"#,
    )
    .unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.port, 8080);
    assert_eq!(resolved.contact_email, "ops@example.org");
    assert_eq!(resolved.retry_max_attempts, 5);
    assert_eq!(resolved.wiki_api_url, DEFAULT_WIKI_API_URL);
}

#[test]
fn unknown_fields_are_rejected_gracefully() {
    // extra keys are ignored by serde's default behavior
    let config: Config =
        serde_json::from_str(r#"{"port": 9000, "comment": "scratch"}"#).unwrap();
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.port, 9000);
}
