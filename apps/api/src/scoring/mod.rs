//! Relevance scoring. Asks the model how well a posting fits the candidate's
//! resume and turns its reply into a bounded `ScoreResult`.

pub mod prompts;
pub mod scorer;

use serde::{Deserialize, Serialize};

pub use scorer::{LlmRelevanceScorer, RelevanceScorer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Apply,
    Skip,
}

impl Recommendation {
    pub fn for_score(score: u8, threshold: u8) -> Self {
        if score >= threshold {
            Recommendation::Apply
        } else {
            Recommendation::Skip
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Always within 0..=100.
    pub score: u8,
    pub reasoning: String,
    pub key_matches: Vec<String>,
    pub missing_skills: Vec<String>,
    pub recommendation: Recommendation,
}

impl ScoreResult {
    /// Result used when the model could not be reached at all.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            score: 0,
            reasoning: format!("Error: {reason}"),
            key_matches: Vec::new(),
            missing_skills: Vec::new(),
            recommendation: Recommendation::Skip,
        }
    }
}
