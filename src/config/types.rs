//! Configuration types for the discovery engine.
//!
//! The configuration is one JSON document read at startup. Every field has a
//! default so operators only write the sections they want to change; the
//! planner overrides `seed_queries` per cycle.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process-wide configuration, deserialized once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoutConfig {
    /// Root directory for the catalog database, reports and the classifier
    /// artifact.
    pub data_dir: PathBuf,
    pub operational_parameters: OperationalParameters,
    pub discovery_settings: DiscoverySettings,
    pub crawler_settings: CrawlerSettings,
    pub maintenance_settings: MaintenanceSettings,
    pub llm_settings: LlmSettings,
    pub classifier_settings: ClassifierSettings,
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./scout_data"),
            operational_parameters: OperationalParameters::default(),
            discovery_settings: DiscoverySettings::default(),
            crawler_settings: CrawlerSettings::default(),
            maintenance_settings: MaintenanceSettings::default(),
            llm_settings: LlmSettings::default(),
            classifier_settings: ClassifierSettings::default(),
        }
    }
}

impl ScoutConfig {
    /// Path of the SQLite catalog database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sites.db")
    }

    /// Directory where after-action reports are persisted.
    #[must_use]
    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    /// Path of the serialized classifier artifact.
    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.classifier_settings
            .model_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("scout_model.json"))
    }
}

/// Discovery inputs: curated index pages, domain permutation sets and the
/// seed queries the planner rewrites every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationalParameters {
    pub aggregator_urls: Vec<String>,
    pub permutation_bases: Vec<String>,
    pub permutation_tlds: Vec<String>,
    pub seed_queries: Vec<String>,
}

impl Default for OperationalParameters {
    fn default() -> Self {
        Self {
            aggregator_urls: Vec::new(),
            permutation_bases: vec![
                "streameast".to_string(),
                "sportssurge".to_string(),
                "freestreams".to_string(),
                "watchseries".to_string(),
            ],
            permutation_tlds: vec![
                ".app".to_string(),
                ".io".to_string(),
                ".live".to_string(),
                ".gg".to_string(),
                ".net".to_string(),
                ".org".to_string(),
                ".tv".to_string(),
                ".me".to_string(),
                ".co".to_string(),
                ".cc".to_string(),
            ],
            seed_queries: vec![
                "watch sports online free".to_string(),
                "live streaming sites".to_string(),
                "nfl live stream".to_string(),
                "free sports streaming".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// Bound on concurrent verification probes during hunts and sweeps.
    pub max_concurrent_verifications: usize,
    /// Static fetch timeout in seconds.
    pub request_timeout: u64,
    /// Composite confidence a site needs for admission, 0-100.
    pub verification_confidence_threshold: u8,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            max_concurrent_verifications: 10,
            request_timeout: 5,
            verification_confidence_threshold: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Classifier probability needed to enter the verification stage.
    pub ai_confidence_threshold: f64,
    pub max_crawl_depth: u8,
    /// Minimum relevance score for following a link.
    pub relevancy_threshold: f64,
    /// Re-enqueue admitted sites at depth 0, once per cycle each.
    pub enable_autonomous_feedback: bool,
    /// When true, an analyzer negative vetoes admission. Default: the
    /// analyzer verdict is enrichment only.
    pub strict_cognitive_gate: bool,
    /// Anchors considered per page for frontier growth.
    pub max_links_per_page: usize,
    /// Concurrent page workers.
    pub max_concurrent_pages: usize,
    /// Concurrent fetches per host.
    pub max_concurrent_per_host: usize,
    /// Buffered catalog writes beyond this count abort the cycle.
    pub pending_write_high_water: usize,
    /// Pages fetched before the cycle stops on its own.
    pub page_budget: usize,
    /// Wall-clock budget for one crawl, in seconds.
    pub cycle_timeout_secs: u64,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            ai_confidence_threshold: 0.7,
            max_crawl_depth: 3,
            relevancy_threshold: 0.6,
            enable_autonomous_feedback: true,
            strict_cognitive_gate: false,
            max_links_per_page: 10,
            max_concurrent_pages: 5,
            max_concurrent_per_host: 2,
            pending_write_high_water: 128,
            page_budget: 200,
            cycle_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSettings {
    /// Active rows older than this many hours get re-verified by the sweep.
    pub deactivation_hours: i64,
    /// Consecutive failed re-verifications before a quarantined row is
    /// deactivated for good.
    pub max_failed_attempts: u32,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            deactivation_hours: 24,
            max_failed_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Chat-completion endpoint, e.g. `https://api.example.com/v1/chat/completions`.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the bearer token.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Request timeout in seconds.
    pub timeout: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1/chat/completions".to_string(),
            model: "local-model".to_string(),
            api_key_env: "SCOUT_LLM_API_KEY".to_string(),
            max_tokens: 700,
            temperature: 0.2,
            timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Override for the classifier artifact location.
    pub model_path: Option<PathBuf>,
}
