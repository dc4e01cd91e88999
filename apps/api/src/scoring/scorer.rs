use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::prompts::{SCORING_PROMPT_TEMPLATE, SCORING_SYSTEM};
use super::{Recommendation, ScoreResult};
use crate::llm_client::prompts::fill_placeholders;
use crate::llm_client::{strip_json_fences, LanguageModel};
use crate::models::posting::JobPosting;

static BARE_SCORE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""?score"?\s*:\s*(\d+)"#).expect("score regex should compile")
});

const UNPARSEABLE_REASONING: &str = "Failed to parse AI response";

/// Scores a posting against the candidate's resume.
///
/// Never fails: an unreachable model yields a zero score with the fault in the
/// reasoning, so the caller can record a score skip.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, posting: &JobPosting, resume_text: &str) -> ScoreResult;
}

pub struct LlmRelevanceScorer {
    model: Arc<dyn LanguageModel>,
    threshold: u8,
}

impl LlmRelevanceScorer {
    pub fn new(model: Arc<dyn LanguageModel>, threshold: u8) -> Self {
        Self {
            model,
            threshold: threshold.min(100),
        }
    }

    fn build_prompt(&self, posting: &JobPosting, resume_text: &str) -> String {
        let threshold = self.threshold.to_string();
        fill_placeholders(
            SCORING_PROMPT_TEMPLATE,
            &[
                ("{title}", or_na(&posting.title)),
                ("{company}", or_na(&posting.company)),
                ("{location}", or_na(&posting.location)),
                ("{threshold}", threshold.as_str()),
                ("{description}", or_na(&posting.description)),
                ("{resume}", resume_text),
            ],
        )
    }
}

#[async_trait]
impl RelevanceScorer for LlmRelevanceScorer {
    async fn score(&self, posting: &JobPosting, resume_text: &str) -> ScoreResult {
        let prompt = self.build_prompt(posting, resume_text);
        match self.model.complete(&prompt, SCORING_SYSTEM).await {
            Ok(text) => {
                let result = parse_score_response(&text, self.threshold);
                debug!(score = result.score, "posting scored");
                result
            }
            Err(e) => {
                warn!(error = %e, "scoring call failed");
                ScoreResult::failed(e)
            }
        }
    }
}

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

/// Interprets the model's scoring reply.
///
/// Well-formed JSON is normalized field by field. Anything else falls back to
/// pulling a bare `score: N` out of the text.
pub fn parse_score_response(text: &str, threshold: u8) -> ScoreResult {
    let cleaned = strip_json_fences(text);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(fields)) => from_fields(&fields, threshold),
        _ => {
            warn!("scoring reply was not a JSON object, falling back to regex");
            let score = BARE_SCORE
                .captures(cleaned)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .map(|v| v.min(100) as u8)
                .unwrap_or(0);
            ScoreResult {
                score,
                reasoning: UNPARSEABLE_REASONING.to_string(),
                key_matches: Vec::new(),
                missing_skills: Vec::new(),
                recommendation: Recommendation::for_score(score, threshold),
            }
        }
    }
}

fn from_fields(fields: &Map<String, Value>, threshold: u8) -> ScoreResult {
    let score = fields.get("score").map(coerce_score).unwrap_or(0);

    let recommendation = match fields.get("recommendation").and_then(Value::as_str) {
        Some(r) if r.trim().eq_ignore_ascii_case("apply") => Recommendation::Apply,
        Some(r) if r.trim().eq_ignore_ascii_case("skip") => Recommendation::Skip,
        _ => Recommendation::for_score(score, threshold),
    };

    ScoreResult {
        score,
        reasoning: fields
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        key_matches: string_list(fields.get("key_matches")),
        missing_skills: string_list(fields.get("missing_skills")),
        recommendation,
    }
}

fn coerce_score(value: &Value) -> u8 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.filter(|v| v.is_finite())
        .map(|v| v.trunc().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}
