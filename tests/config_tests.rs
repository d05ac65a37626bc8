//! Configuration loading tests.

use streamscout::config::{ConfigError, ScoutConfig};
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("scout_config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{
            "operational_parameters": {
                "aggregator_urls": ["https://index.example/wiki"],
                "seed_queries": ["nfl streams"]
            },
            "crawler_settings": { "max_crawl_depth": 2 }
        }"#,
    );

    let config = ScoutConfig::load(&path).unwrap();
    assert_eq!(
        config.operational_parameters.aggregator_urls,
        vec!["https://index.example/wiki"]
    );
    assert_eq!(config.crawler_settings.max_crawl_depth, 2);
    // Untouched sections keep their defaults.
    assert_eq!(config.crawler_settings.ai_confidence_threshold, 0.7);
    assert_eq!(config.discovery_settings.verification_confidence_threshold, 50);
    assert_eq!(config.maintenance_settings.max_failed_attempts, 3);
}

#[test]
fn malformed_json_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "{ not json");
    assert!(matches!(
        ScoutConfig::load(&path),
        Err(ConfigError::Parse(_))
    ));
}

#[test]
fn invalid_field_is_named_in_the_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"{ "crawler_settings": { "relevancy_threshold": 7.5 } }"#,
    );

    let err = ScoutConfig::load(&path).unwrap_err();
    assert!(
        err.to_string().contains("crawler_settings.relevancy_threshold"),
        "error was: {err}"
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("does_not_exist.json");
    assert!(matches!(ScoutConfig::load(&path), Err(ConfigError::Io { .. })));
}

#[test]
fn derived_paths_follow_data_dir() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, r#"{ "data_dir": "/var/lib/scout" }"#);

    let config = ScoutConfig::load(&path).unwrap();
    assert_eq!(config.db_path(), std::path::Path::new("/var/lib/scout/sites.db"));
    assert_eq!(
        config.reports_dir(),
        std::path::Path::new("/var/lib/scout/reports")
    );
    assert_eq!(
        config.model_path(),
        std::path::Path::new("/var/lib/scout/scout_model.json")
    );
}
