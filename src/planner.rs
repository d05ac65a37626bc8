//! Mission planning: the strategy stage of the cognitive loop.
//!
//! The planner turns the previous after-action report (or, on the first run,
//! a fixed objective) into the seed queries for the upcoming cycle. The
//! language model proposes the plan; everything it returns is validated at
//! the boundary, and anything invalid falls back to a deterministic plan so
//! the crawler never sees a malformed mission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LlmSettings;
use crate::llm::{ChatClient, extract_json_object};
use crate::reporting::AfterActionReport;

const GENESIS_OBJECTIVE: &str = "Your mission is to discover and maintain a catalog of active \
     sports streaming websites. Focus on reliable, functional sites that provide live sports \
     content.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    Genesis,
    Adaptive,
    Fallback,
}

/// Structured strategy rationale carried with each plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanReasoning {
    pub initial_analysis: String,
    pub strategic_goal: String,
    pub tactical_plan: String,
    pub conclusion: String,
}

impl Default for PlanReasoning {
    fn default() -> Self {
        let unknown = || "Unknown".to_string();
        Self {
            initial_analysis: unknown(),
            strategic_goal: unknown(),
            tactical_plan: unknown(),
            conclusion: unknown(),
        }
    }
}

/// One cycle's mission, consumed by the crawler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionPlan {
    pub mission_type: MissionType,
    pub timestamp: DateTime<Utc>,
    pub seed_queries: Vec<String>,
    pub reasoning_trace: PlanReasoning,
    /// Planner's own confidence in the strategy, 0-100.
    pub confidence: u8,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adaptations_made: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expected_improvements: Vec<String>,
}

/// Shape accepted from the model, everything defaulted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    seed_queries: Vec<String>,
    reasoning_trace: PlanReasoning,
    confidence: i64,
    adaptations_made: Vec<String>,
    expected_improvements: Vec<String>,
}

pub struct PlannerAgent {
    client: Option<ChatClient>,
}

impl PlannerAgent {
    /// Build the planner. Missing credentials leave only the deterministic
    /// fallback plans available.
    #[must_use]
    pub fn new(settings: &LlmSettings) -> Self {
        match ChatClient::from_settings(settings) {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                warn!("planner degraded to deterministic fallbacks: {e}");
                Self { client: None }
            }
        }
    }

    /// Produce the mission plan for the upcoming cycle.
    pub async fn generate(&self, previous: Option<&AfterActionReport>) -> MissionPlan {
        let plan = match previous {
            None => {
                info!("planner executing genesis run");
                self.generate_genesis().await
            }
            Some(report) => {
                info!("planner executing adaptive run");
                self.generate_adaptive(report).await
            }
        };

        info!(
            "mission plan ready ({:?}, {} seed queries, confidence {})",
            plan.mission_type,
            plan.seed_queries.len(),
            plan.confidence
        );
        plan
    }

    async fn generate_genesis(&self) -> MissionPlan {
        let Some(client) = &self.client else {
            return fallback_genesis();
        };

        let prompt = format!(
            r#"{GENESIS_OBJECTIVE}

Design the opening discovery strategy. Consider popular leagues (NFL, NBA, MLB, soccer, hockey),
community-driven phrasing, and technical streaming vocabulary.

Respond with ONLY a JSON object in exactly this shape:
{{
  "seed_queries": ["query1", "query2", "query3", "query4", "query5"],
  "reasoning_trace": {{
    "initial_analysis": "...",
    "strategic_goal": "...",
    "tactical_plan": "...",
    "conclusion": "..."
  }},
  "confidence": 80
}}"#
        );

        match client.chat(PLANNER_ROLE, &prompt).await {
            Ok(reply) => match parse_plan(&reply, MissionType::Genesis) {
                Some(plan) => plan,
                None => {
                    warn!("genesis plan failed validation, using fallback");
                    fallback_genesis()
                }
            },
            Err(e) => {
                warn!("genesis planning request failed: {e}, using fallback");
                fallback_genesis()
            }
        }
    }

    async fn generate_adaptive(&self, report: &AfterActionReport) -> MissionPlan {
        let Some(client) = &self.client else {
            return fallback_adaptive(report);
        };

        let serialized = serde_json::to_string_pretty(report)
            .unwrap_or_else(|_| "<report serialization failed>".to_string());
        let prompt = format!(
            r#"Here is the after-action report of the previous discovery mission:

{serialized}

Evolve the strategy: amplify what worked, pivot away from what did not. Name the concrete
changes you are making and what you expect them to improve.

Respond with ONLY a JSON object in exactly this shape:
{{
  "seed_queries": ["query1", "query2", "query3", "query4", "query5"],
  "reasoning_trace": {{
    "initial_analysis": "...",
    "strategic_goal": "...",
    "tactical_plan": "...",
    "conclusion": "..."
  }},
  "confidence": 75,
  "adaptations_made": ["..."],
  "expected_improvements": ["..."]
}}"#
        );

        match client.chat(PLANNER_ROLE, &prompt).await {
            Ok(reply) => match parse_plan(&reply, MissionType::Adaptive) {
                Some(plan) => plan,
                None => {
                    warn!("adaptive plan failed validation, using fallback");
                    fallback_adaptive(report)
                }
            },
            Err(e) => {
                warn!("adaptive planning request failed: {e}, using fallback");
                fallback_adaptive(report)
            }
        }
    }
}

const PLANNER_ROLE: &str = "You are an expert autonomous planning AI for web discovery missions. \
     You respond ONLY with a single valid JSON object.";

/// Parse and validate a model-proposed plan. `None` means the fallback must
/// be used; an invalid plan never reaches the crawler.
fn parse_plan(reply: &str, mission_type: MissionType) -> Option<MissionPlan> {
    let raw: RawPlan = serde_json::from_str(reply)
        .ok()
        .or_else(|| extract_json_object(reply).and_then(|json| serde_json::from_str(json).ok()))?;

    let seed_queries: Vec<String> = raw
        .seed_queries
        .into_iter()
        .map(|query| query.trim().to_string())
        .filter(|query| !query.is_empty())
        .collect();
    if seed_queries.is_empty() {
        return None;
    }

    Some(MissionPlan {
        mission_type,
        timestamp: Utc::now(),
        seed_queries,
        reasoning_trace: raw.reasoning_trace,
        confidence: u8::try_from(raw.confidence.clamp(0, 100)).unwrap_or(0),
        adaptations_made: raw.adaptations_made,
        expected_improvements: raw.expected_improvements,
    })
}

/// Deterministic genesis plan for when the model is unavailable.
#[must_use]
pub fn fallback_genesis() -> MissionPlan {
    MissionPlan {
        mission_type: MissionType::Fallback,
        timestamp: Utc::now(),
        seed_queries: vec![
            "watch NFL live free streaming".to_string(),
            "soccer stream free online".to_string(),
            "NBA live stream reddit".to_string(),
            "MLB streaming sites free".to_string(),
            "live sports streaming free".to_string(),
        ],
        reasoning_trace: PlanReasoning {
            initial_analysis: "No prior mission data available.".to_string(),
            strategic_goal: "Establish baseline coverage of the major US and European sports."
                .to_string(),
            tactical_plan: "Query each major league with community-focused streaming terms."
                .to_string(),
            conclusion: "Fixed genesis query set covering the core sports verticals.".to_string(),
        },
        confidence: 50,
        adaptations_made: Vec::new(),
        expected_improvements: Vec::new(),
    }
}

/// Deterministic adaptive plan: continue on success, pivot on a dry run.
#[must_use]
pub fn fallback_adaptive(report: &AfterActionReport) -> MissionPlan {
    let new_sites = report.discovery_results.new_sites_found;

    let (queries, strategy) = if new_sites > 0 {
        (
            vec![
                "live sports stream free online".to_string(),
                "watch sports streaming free".to_string(),
                "sports stream websites free".to_string(),
                "streaming sports live free".to_string(),
                "free sports streaming sites".to_string(),
            ],
            "Continue the successful discovery pattern from the previous run.",
        )
    } else {
        (
            vec![
                "sports streaming reddit communities".to_string(),
                "live sports broadcasting free".to_string(),
                "stream sports online free".to_string(),
                "sports stream aggregator sites".to_string(),
                "free live sports streaming".to_string(),
            ],
            "Pivot the query set after a run with no discoveries.",
        )
    };

    MissionPlan {
        mission_type: MissionType::Fallback,
        timestamp: Utc::now(),
        seed_queries: queries,
        reasoning_trace: PlanReasoning {
            initial_analysis: format!("Previous run found {new_sites} new sites."),
            strategic_goal: strategy.to_string(),
            tactical_plan: "Deterministic query rotation, no model available.".to_string(),
            conclusion: strategy.to_string(),
        },
        confidence: 40,
        adaptations_made: vec![format!(
            "Switched to the {} query set based on {new_sites} discoveries",
            if new_sites > 0 { "continue" } else { "pivot" }
        )],
        expected_improvements: Vec::new(),
    }
}
