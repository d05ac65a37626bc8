//! Cognitive content analysis through the language model.
//!
//! Final funnel stage before admission: the page text goes to the chat
//! endpoint with a prompt that forces a chain-of-thought-with-self-critique
//! structure, and the reply is parsed back into a [`CognitiveVerdict`]. The
//! analyzer never throws at the caller — unreachable endpoints, missing
//! credentials and unparseable replies all produce a default-negative
//! verdict tagged with what went wrong.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LlmSettings;
use crate::llm::ChatClient;

/// Page text beyond this many characters is truncated before prompting.
pub const MAX_CONTENT_CHARS: usize = 2000;

fn unknown() -> String {
    "Unknown".to_string()
}

/// The four-step reasoning structure the prompt demands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningTrace {
    pub initial_analysis: String,
    pub hypothesis: String,
    pub self_critique: String,
    pub conclusion: String,
}

impl Default for ReasoningTrace {
    fn default() -> Self {
        Self {
            initial_analysis: unknown(),
            hypothesis: unknown(),
            self_critique: unknown(),
            conclusion: unknown(),
        }
    }
}

/// Structured analyzer verdict. Missing fields in the model reply are filled
/// with sentinel values rather than rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CognitiveVerdict {
    pub service_name: String,
    pub is_sports_streaming_site: bool,
    pub full_reasoning_process: ReasoningTrace,
    pub final_confidence_score: u8,
    /// Set when the reply could not be parsed as the required JSON shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
    /// Set when the analyzer itself was degraded (no credentials, transport
    /// failure, upstream error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for CognitiveVerdict {
    fn default() -> Self {
        Self {
            service_name: unknown(),
            is_sports_streaming_site: false,
            full_reasoning_process: ReasoningTrace::default(),
            final_confidence_score: 0,
            parse_error: None,
            error: None,
        }
    }
}

impl CognitiveVerdict {
    fn degraded(reason: String) -> Self {
        Self {
            error: Some(reason),
            ..Self::default()
        }
    }

    /// Cognitive category for the catalog: only positive verdicts carry one.
    #[must_use]
    pub fn category(&self) -> Option<String> {
        self.is_sports_streaming_site
            .then(|| "Sports Streaming".to_string())
    }

    /// True when the verdict came from a live, parseable analyzer response.
    #[must_use]
    pub fn is_authoritative(&self) -> bool {
        self.error.is_none() && self.parse_error.is_none()
    }
}

/// Shape accepted from the model. Everything is defaulted so a reply missing
/// fields still deserializes; scores outside 0..=100 are clamped afterwards.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct RawVerdict {
    service_name: Option<String>,
    is_sports_streaming_site: bool,
    full_reasoning_process: ReasoningTrace,
    final_confidence_score: i64,
}

pub struct CognitiveAnalyst {
    client: Option<ChatClient>,
}

impl CognitiveAnalyst {
    /// Build the analyzer. Missing credentials degrade it instead of failing.
    #[must_use]
    pub fn new(settings: &LlmSettings) -> Self {
        match ChatClient::from_settings(settings) {
            Ok(client) => Self {
                client: Some(client),
            },
            Err(e) => {
                warn!("cognitive analyzer degraded: {e}");
                Self { client: None }
            }
        }
    }

    #[must_use]
    pub fn available(&self) -> bool {
        self.client.is_some()
    }

    /// Analyze one page. Always returns a verdict.
    pub async fn analyze(&self, content: &str, url: &str) -> CognitiveVerdict {
        let Some(client) = &self.client else {
            return CognitiveVerdict::degraded("analyzer unavailable: no credentials".to_string());
        };

        let truncated: String = content.chars().take(MAX_CONTENT_CHARS).collect();
        let prompt = build_prompt(&truncated, url);

        let reply = match client.chat(SYSTEM_ROLE, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("cognitive analysis request failed for {url}: {e}");
                return CognitiveVerdict::degraded(e.to_string());
            }
        };

        let verdict = parse_reply(&reply);
        info!(
            "cognitive analysis for {url}: streaming={} confidence={}",
            verdict.is_sports_streaming_site, verdict.final_confidence_score
        );
        verdict
    }
}

const SYSTEM_ROLE: &str = "You are an expert web content analyst. You reason step by step, \
     challenge your own hypothesis, and respond ONLY with a single valid JSON object.";

fn build_prompt(content: &str, url: &str) -> String {
    format!(
        r#"Analyze the following website text and decide whether the site is a live sports streaming portal.

Think through the decision in four explicit steps and include all four in your answer:
1. initial_analysis - what the text appears to be
2. hypothesis - your working conclusion
3. self_critique - the strongest argument against your hypothesis
4. conclusion - your final judgement after the critique

Respond with ONLY a JSON object in exactly this shape:
{{
  "service_name": "name of the service or Unknown",
  "is_sports_streaming_site": true,
  "full_reasoning_process": {{
    "initial_analysis": "...",
    "hypothesis": "...",
    "self_critique": "...",
    "conclusion": "..."
  }},
  "final_confidence_score": 85
}}

URL: {url}

Content:
{content}"#
    )
}

/// Two-stage parse: direct JSON first, then the outermost brace-delimited
/// substring. Both failing yields the default-negative verdict with
/// `parse_error` set.
fn parse_reply(reply: &str) -> CognitiveVerdict {
    let raw = match serde_json::from_str::<RawVerdict>(reply) {
        Ok(raw) => raw,
        Err(direct_err) => {
            let extracted = crate::llm::extract_json_object(reply)
                .and_then(|candidate| serde_json::from_str::<RawVerdict>(candidate).ok());
            match extracted {
                Some(raw) => raw,
                None => {
                    warn!("could not parse analyzer reply as JSON: {direct_err}");
                    return CognitiveVerdict {
                        parse_error: Some(direct_err.to_string()),
                        ..CognitiveVerdict::default()
                    };
                }
            }
        }
    };

    CognitiveVerdict {
        service_name: raw
            .service_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(unknown),
        is_sports_streaming_site: raw.is_sports_streaming_site,
        full_reasoning_process: raw.full_reasoning_process,
        final_confidence_score: u8::try_from(raw.final_confidence_score.clamp(0, 100))
            .unwrap_or(0),
        parse_error: None,
        error: None,
    }
}
