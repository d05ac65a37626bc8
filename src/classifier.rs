//! Statistical page classifier.
//!
//! Loads a serialized model artifact produced by the external training
//! pipeline and scores feature vectors. The engine never trains; it only
//! evaluates. A missing or incompatible artifact disables this stage — the
//! crawler treats that as a gate failure on every page, not as a crash.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::features::{FEATURE_NAMES, FeatureVector};

/// Serialized artifact layout: the training pipeline writes this file, the
/// engine opens it read-only at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub version: String,
    pub feature_names: Vec<String>,
    pub model: LinearModel,
    #[serde(default)]
    pub performance_metrics: Value,
}

/// Linear scorer applied through a sigmoid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl ConfidenceTier {
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.9 {
            Self::VeryHigh
        } else if probability >= 0.7 {
            Self::High
        } else if probability >= 0.5 {
            Self::Medium
        } else if probability >= 0.3 {
            Self::Low
        } else {
            Self::VeryLow
        }
    }
}

/// Verdict for one page.
#[derive(Debug, Clone)]
pub struct Classification {
    /// False when no usable model artifact is loaded.
    pub available: bool,
    pub is_positive: bool,
    pub probability: f64,
    pub tier: ConfidenceTier,
    /// Names of the features that carried the decision.
    pub key_features: Vec<String>,
    pub error: Option<String>,
}

impl Classification {
    fn unavailable(reason: &str) -> Self {
        Self {
            available: false,
            is_positive: false,
            probability: 0.0,
            tier: ConfidenceTier::VeryLow,
            key_features: Vec::new(),
            error: Some(reason.to_string()),
        }
    }
}

pub struct SiteClassifier {
    artifact: Option<ClassifierArtifact>,
}

impl SiteClassifier {
    /// Load the artifact if present and schema-compatible.
    ///
    /// Any problem (missing file, bad JSON, feature-schema drift) leaves the
    /// classifier in the degraded `unavailable` state rather than failing
    /// startup.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    "no classifier artifact at {} ({e}); statistical stage disabled",
                    path.display()
                );
                return Self { artifact: None };
            }
        };

        let artifact: ClassifierArtifact = match serde_json::from_str(&raw) {
            Ok(artifact) => artifact,
            Err(e) => {
                warn!("classifier artifact is malformed: {e}; statistical stage disabled");
                return Self { artifact: None };
            }
        };

        if artifact.feature_names.as_slice() != FEATURE_NAMES.as_slice() {
            warn!(
                "classifier artifact feature schema does not match extractor \
                 ({} vs {} features); retrain required, statistical stage disabled",
                artifact.feature_names.len(),
                FEATURE_NAMES.len()
            );
            return Self { artifact: None };
        }

        if artifact.model.weights.len() != artifact.feature_names.len() {
            warn!("classifier artifact weight count does not match features; stage disabled");
            return Self { artifact: None };
        }

        info!(
            "classifier model loaded (version {}, {} features)",
            artifact.version,
            artifact.feature_names.len()
        );
        Self {
            artifact: Some(artifact),
        }
    }

    /// Build directly from an artifact. Used by tests.
    #[must_use]
    pub fn from_artifact(artifact: ClassifierArtifact) -> Self {
        Self {
            artifact: Some(artifact),
        }
    }

    #[must_use]
    pub fn unavailable() -> Self {
        Self { artifact: None }
    }

    #[must_use]
    pub fn available(&self) -> bool {
        self.artifact.is_some()
    }

    /// Score a feature vector.
    #[must_use]
    pub fn classify(&self, features: &FeatureVector) -> Classification {
        let Some(artifact) = &self.artifact else {
            return Classification::unavailable("no model");
        };

        let score: f64 = artifact
            .model
            .weights
            .iter()
            .zip(features.values())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + artifact.model.bias;
        let probability = sigmoid(score);

        let result = Classification {
            available: true,
            is_positive: probability >= 0.5,
            probability,
            tier: ConfidenceTier::from_probability(probability),
            key_features: key_features(features),
            error: None,
        };
        debug!(
            "classified page: probability={:.3} tier={:?}",
            result.probability, result.tier
        );
        result
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Features worth surfacing in verdict logs, mirroring what the training
/// pipeline treats as the dominant signals.
fn key_features(features: &FeatureVector) -> Vec<String> {
    let mut key = Vec::new();
    let flag = |name: &str| features.get(name).unwrap_or(0.0) > 0.0;

    if flag("has_video_tag") {
        key.push("video_elements".to_string());
    }
    if features.get("iframe_count").unwrap_or(0.0) > 0.0 {
        key.push("iframes".to_string());
    }
    if flag("has_streaming_js") {
        key.push("streaming_technology".to_string());
    }
    if features.get("total_sports_keyword_density").unwrap_or(0.0) > 0.01 {
        key.push("sports_content_density".to_string());
    }
    if flag("url_has_sports_keyword") {
        key.push("sports_in_url".to_string());
    }
    if flag("url_has_stream_keyword") {
        key.push("streaming_in_url".to_string());
    }
    key
}
