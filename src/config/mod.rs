//! Configuration loading and validation.
//!
//! A malformed configuration is fatal at startup; the error names the first
//! offending field. Everything else in the engine receives the validated
//! [`ScoutConfig`] by reference — there is no ambient global.

pub mod types;

pub use types::{
    ClassifierSettings, CrawlerSettings, DiscoverySettings, LlmSettings, MaintenanceSettings,
    OperationalParameters, ScoutConfig,
};

use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl ScoutConfig {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        info!("configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Check field ranges. Called by [`load`](Self::load); separate so tests
    /// and in-memory configs can reuse it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| ConfigError::Invalid { field, reason };

        let ai = self.crawler_settings.ai_confidence_threshold;
        if !(0.0..=1.0).contains(&ai) {
            return Err(invalid(
                "crawler_settings.ai_confidence_threshold",
                format!("must be within [0, 1], got {ai}"),
            ));
        }

        let relevancy = self.crawler_settings.relevancy_threshold;
        if !(0.0..=1.0).contains(&relevancy) {
            return Err(invalid(
                "crawler_settings.relevancy_threshold",
                format!("must be within [0, 1], got {relevancy}"),
            ));
        }

        if self.discovery_settings.verification_confidence_threshold > 100 {
            return Err(invalid(
                "discovery_settings.verification_confidence_threshold",
                "must be within [0, 100]".to_string(),
            ));
        }

        if self.discovery_settings.request_timeout == 0 {
            return Err(invalid(
                "discovery_settings.request_timeout",
                "must be at least 1 second".to_string(),
            ));
        }

        if self.crawler_settings.max_crawl_depth == 0 {
            return Err(invalid(
                "crawler_settings.max_crawl_depth",
                "must be at least 1".to_string(),
            ));
        }

        if self.crawler_settings.max_concurrent_pages == 0 {
            return Err(invalid(
                "crawler_settings.max_concurrent_pages",
                "must be at least 1".to_string(),
            ));
        }

        for (index, tld) in self.operational_parameters.permutation_tlds.iter().enumerate() {
            if !tld.starts_with('.') || tld.len() < 2 {
                return Err(invalid(
                    "operational_parameters.permutation_tlds",
                    format!("entry {index} ({tld:?}) must be a TLD with a leading dot"),
                ));
            }
        }

        if self.maintenance_settings.max_failed_attempts == 0 {
            return Err(invalid(
                "maintenance_settings.max_failed_attempts",
                "must be at least 1".to_string(),
            ));
        }

        if self.llm_settings.api_key_env.trim().is_empty() {
            return Err(invalid(
                "llm_settings.api_key_env",
                "must name an environment variable".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ScoutConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn out_of_range_threshold_names_field() {
        let mut config = ScoutConfig::default();
        config.crawler_settings.ai_confidence_threshold = 1.5;

        let err = config.validate().unwrap_err();
        assert!(
            err.to_string()
                .contains("crawler_settings.ai_confidence_threshold")
        );
    }

    #[test]
    fn tld_without_leading_dot_is_rejected() {
        let mut config = ScoutConfig::default();
        config.operational_parameters.permutation_tlds = vec!["app".to_string()];

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("permutation_tlds"));
    }
}
