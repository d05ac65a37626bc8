//! After-action reporting: the analysis stage of the cognitive loop.
//!
//! The agent reads two sources — the cycle's log stream (matched against the
//! contractual substrings) and the catalog — and produces a structured
//! report organized as observation -> insight -> recommendation. It only
//! reports; it never acts. Reports are persisted as timestamped JSON files
//! and the latest one feeds the next planning run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogError, SiteStatus};
use crate::crawler::CrawlSummary;

/// Log substrings the reporting contract depends on. Changing any of these
/// strings is a compatibility break with the crawler's log output.
const MARK_PAGE_CRAWLED: &str = "New page being crawled";
const MARK_CLASSIFIER_VERDICT: &str = "classifier's verdict";
const MARK_POSITIVE: &str = "(POSITIVE)";
const MARK_NEGATIVE: &str = "(NEGATIVE)";
const MARK_VERIFICATION: &str = "V2 verification";
const MARK_DB_WRITE: &str = "successfully written to database";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MissionSummary {
    pub duration_seconds: u64,
    pub pages_crawled: u64,
    pub links_evaluated: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiscoveryResults {
    pub new_sites_found: u64,
    pub sites_quarantined: u64,
    pub total_active_sites: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PerformanceAnalysis {
    pub classifier_success_rate: f64,
    pub verifier_success_rate: f64,
    pub most_effective_source: String,
    pub avg_sites_per_query: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CognitiveReasoning {
    pub observations: Vec<String>,
    pub insights: Vec<String>,
    pub primary_recommendation: String,
    pub secondary_recommendations: Vec<String>,
    pub reasoning_confidence: u8,
}

/// The structured cycle summary consumed by the next planning run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AfterActionReport {
    pub report_type: String,
    pub timestamp: DateTime<Utc>,
    pub mission_summary: MissionSummary,
    pub discovery_results: DiscoveryResults,
    pub performance_analysis: PerformanceAnalysis,
    pub cognitive_reasoning_process: CognitiveReasoning,
}

impl Default for AfterActionReport {
    fn default() -> Self {
        Self {
            report_type: "after_action".to_string(),
            timestamp: Utc::now(),
            mission_summary: MissionSummary::default(),
            discovery_results: DiscoveryResults::default(),
            performance_analysis: PerformanceAnalysis::default(),
            cognitive_reasoning_process: CognitiveReasoning::default(),
        }
    }
}

pub struct ReportingAgent {
    catalog: Catalog,
    reports_dir: PathBuf,
}

impl ReportingAgent {
    #[must_use]
    pub fn new(catalog: Catalog, reports_dir: PathBuf) -> Self {
        Self {
            catalog,
            reports_dir,
        }
    }

    /// Build the report for a finished cycle.
    ///
    /// `log_text` is the cycle's captured log stream; `crawl` supplies the
    /// figures the log cannot (duration, exact link counts);
    /// `seed_query_count` comes from the executed mission plan.
    pub async fn generate(
        &self,
        log_text: &str,
        crawl: &CrawlSummary,
        seed_query_count: usize,
    ) -> Result<AfterActionReport, ReportError> {
        let count = |needle: &str| log_text.matches(needle).count() as u64;

        let verdicts = count(MARK_CLASSIFIER_VERDICT);
        let positives = count(MARK_POSITIVE);
        let verifications = count(MARK_VERIFICATION);
        let db_writes = count(MARK_DB_WRITE);
        let pages_from_log = count(MARK_PAGE_CRAWLED);
        let _negatives = count(MARK_NEGATIVE);

        let classifier_success_rate = if verdicts > 0 {
            positives as f64 / verdicts as f64
        } else {
            0.0
        };
        let verifier_success_rate = if verifications > 0 {
            db_writes as f64 / verifications as f64
        } else {
            0.0
        };

        let new_sites_found = self
            .catalog
            .count_added_since(Utc::now() - chrono::Duration::hours(1))
            .await?;
        let sites_quarantined = self.catalog.count_by_status(SiteStatus::Quarantined).await?;
        let total_active_sites = self.catalog.count_by_status(SiteStatus::Active).await?;
        let most_effective_source = self
            .catalog
            .source_breakdown()
            .await?
            .into_iter()
            .next()
            .map(|(source, _)| source)
            .unwrap_or_else(|| "unknown".to_string());

        let avg_sites_per_query = new_sites_found as f64 / seed_query_count.max(1) as f64;

        let mission_summary = MissionSummary {
            duration_seconds: crawl.duration.as_secs(),
            pages_crawled: pages_from_log.max(crawl.pages_crawled as u64),
            links_evaluated: crawl.links_evaluated as u64,
        };
        let discovery_results = DiscoveryResults {
            new_sites_found,
            sites_quarantined,
            total_active_sites,
        };
        let performance_analysis = PerformanceAnalysis {
            classifier_success_rate,
            verifier_success_rate,
            most_effective_source,
            avg_sites_per_query,
        };

        let cognitive_reasoning_process =
            reason_about(&mission_summary, &discovery_results, &performance_analysis);

        info!(
            "after-action report generated: {} new sites, primary recommendation: {}",
            new_sites_found, cognitive_reasoning_process.primary_recommendation
        );

        Ok(AfterActionReport {
            report_type: "after_action".to_string(),
            timestamp: Utc::now(),
            mission_summary,
            discovery_results,
            performance_analysis,
            cognitive_reasoning_process,
        })
    }

    /// Persist a report to a timestamped file and return its path.
    pub fn persist(&self, report: &AfterActionReport) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.reports_dir)?;

        let filename = format!(
            "after_action_report_{}.json",
            report.timestamp.format("%Y%m%d_%H%M%S")
        );
        let path = self.reports_dir.join(filename);
        std::fs::write(&path, serde_json::to_string_pretty(report)?)?;

        info!("after-action report saved to {}", path.display());
        Ok(path)
    }

    /// Most recently written report, by file modification time.
    pub fn latest(&self) -> Result<Option<AfterActionReport>, ReportError> {
        let Ok(entries) = std::fs::read_dir(&self.reports_dir) else {
            return Ok(None);
        };

        let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_report = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| {
                    name.starts_with("after_action_report_") && name.ends_with(".json")
                });
            if !is_report {
                continue;
            }

            let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
                continue;
            };
            if newest.as_ref().is_none_or(|(time, _)| modified > *time) {
                newest = Some((modified, path));
            }
        }

        let Some((_, path)) = newest else {
            return Ok(None);
        };
        match serde_json::from_str(&std::fs::read_to_string(&path)?) {
            Ok(report) => Ok(Some(report)),
            Err(e) => {
                warn!("latest report {} is unreadable: {e}", path.display());
                Ok(None)
            }
        }
    }
}

/// Observation -> insight -> recommendation synthesis. Pure heuristics over
/// the cycle's numbers; thresholds mirror what operators react to.
fn reason_about(
    mission: &MissionSummary,
    discovery: &DiscoveryResults,
    performance: &PerformanceAnalysis,
) -> CognitiveReasoning {
    let observations = vec![
        format!(
            "Crawled {} pages and evaluated {} links in {} seconds.",
            mission.pages_crawled, mission.links_evaluated, mission.duration_seconds
        ),
        format!(
            "Discovered {} new sites; {} active, {} quarantined in the catalog.",
            discovery.new_sites_found, discovery.total_active_sites, discovery.sites_quarantined
        ),
        format!(
            "Classifier positive rate {:.2}, verifier success rate {:.2}, best source: {}.",
            performance.classifier_success_rate,
            performance.verifier_success_rate,
            performance.most_effective_source
        ),
    ];

    let performance_insight = if performance.classifier_success_rate > 0.8
        && performance.verifier_success_rate > 0.7
    {
        "Excellent pipeline performance across classification and verification."
    } else if performance.classifier_success_rate < 0.3 && mission.pages_crawled > 0 {
        "Classifier stage underperforming; the model likely needs retraining."
    } else if performance.verifier_success_rate < 0.4 && mission.pages_crawled > 0 {
        "Verification stage is the bottleneck; technical probes need attention."
    } else {
        "Moderate pipeline performance; incremental tuning recommended."
    };

    let discovery_insight = if discovery.new_sites_found == 0 {
        "Zero discovery rate indicates the current strategy is ineffective; a pivot is required."
    } else if discovery.new_sites_found > 10 {
        "High discovery rate suggests the strategy is working; scale it."
    } else if performance.avg_sites_per_query > 2.0 {
        "High per-query efficiency; the query targeting is strong."
    } else {
        "Moderate discovery; refine query targeting."
    };

    let insights = vec![
        performance_insight.to_string(),
        discovery_insight.to_string(),
    ];

    let primary_recommendation = if discovery.new_sites_found == 0 {
        "Execute a strategic pivot; the current approach found nothing."
    } else if discovery.new_sites_found > 10 && performance.classifier_success_rate > 0.8 {
        "Scale the current strategy; all stages are performing well."
    } else if performance.classifier_success_rate < 0.3 && mission.pages_crawled > 0 {
        "Prioritize classifier retraining; classification is the primary bottleneck."
    } else {
        "Continue the current approach with tactical refinements."
    }
    .to_string();

    let mut secondary_recommendations = Vec::new();
    if performance_insight.contains("retraining") {
        secondary_recommendations.push("Schedule a classifier retraining run.".to_string());
    }
    if discovery_insight.contains("scale") || discovery_insight.contains("strong") {
        secondary_recommendations
            .push("Expand the successful query patterns to adjacent sports.".to_string());
    }
    if discovery.sites_quarantined > discovery.total_active_sites && discovery.sites_quarantined > 0
    {
        secondary_recommendations
            .push("Quarantine outweighs the active set; audit verification thresholds.".to_string());
    }
    if secondary_recommendations.is_empty() {
        secondary_recommendations.push("Monitor performance and iterate incrementally.".to_string());
    }
    secondary_recommendations.truncate(3);

    let mut confidence: i32 = 80;
    if mission.pages_crawled == 0 {
        confidence -= 30;
    }
    if performance.classifier_success_rate > 0.8 {
        confidence += 5;
    }
    if discovery.new_sites_found > 10 {
        confidence += 5;
    }

    CognitiveReasoning {
        observations,
        insights,
        primary_recommendation,
        secondary_recommendations,
        reasoning_confidence: u8::try_from(confidence.clamp(0, 100)).unwrap_or(0),
    }
}

/// Path helper used by the engine when wiring the agent.
#[must_use]
pub fn reports_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("reports")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_discovery_yields_pivot_recommendation() {
        let reasoning = reason_about(
            &MissionSummary {
                duration_seconds: 60,
                pages_crawled: 12,
                links_evaluated: 40,
            },
            &DiscoveryResults::default(),
            &PerformanceAnalysis::default(),
        );

        assert!(reasoning.primary_recommendation.to_lowercase().contains("pivot"));
        assert!(!reasoning.observations.is_empty());
        assert!(!reasoning.secondary_recommendations.is_empty());
    }

    #[test]
    fn strong_cycle_yields_scale_recommendation() {
        let reasoning = reason_about(
            &MissionSummary {
                duration_seconds: 300,
                pages_crawled: 80,
                links_evaluated: 500,
            },
            &DiscoveryResults {
                new_sites_found: 14,
                sites_quarantined: 1,
                total_active_sites: 40,
            },
            &PerformanceAnalysis {
                classifier_success_rate: 0.9,
                verifier_success_rate: 0.8,
                most_effective_source: "search_engine".to_string(),
                avg_sites_per_query: 2.8,
            },
        );

        assert!(reasoning.primary_recommendation.to_lowercase().contains("scale"));
        assert!(reasoning.reasoning_confidence >= 80);
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = AfterActionReport::default();
        let json = serde_json::to_string(&report).unwrap();
        let parsed: AfterActionReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.report_type, "after_action");
    }
}
