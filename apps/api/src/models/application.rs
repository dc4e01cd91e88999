use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable key of a row in the `applications` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct ApplicationKey(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    Applied,
    Skipped,
    Failed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Applied => "Applied",
            ApplicationStatus::Skipped => "Skipped",
            ApplicationStatus::Failed => "Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipType {
    Quality,
    Score,
    NoEmails,
    Error,
}

impl SkipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipType::Quality => "quality",
            SkipType::Score => "score",
            SkipType::NoEmails => "no_emails",
            SkipType::Error => "error",
        }
    }
}

/// One delivery attempt to a single recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAttempt {
    pub recipient: String,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ApplicationRow {
    pub id: i64,
    pub job_id: i64,
    pub status: String,
    pub relevance_score: Option<i64>,
    pub score_reasoning: Option<String>,
    pub key_matches: Option<String>,
    pub missing_skills: Option<String>,
    pub cover_letter: Option<String>,
    pub applied_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailAttemptRow {
    pub id: i64,
    pub application_id: i64,
    pub recipient_email: String,
    pub sent_date: DateTime<Utc>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SkipRow {
    pub id: i64,
    pub job_id: i64,
    pub skip_reason: String,
    pub skip_type: Option<String>,
    pub skipped_date: DateTime<Utc>,
}

/// Aggregate ledger counters for reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LedgerStats {
    pub total_jobs: i64,
    pub applications_sent: i64,
    pub jobs_skipped: i64,
    pub emails_sent: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecentApplication {
    pub company: Option<String>,
    pub title: Option<String>,
    pub job_url: String,
    pub relevance_score: Option<i64>,
    pub applied_date: DateTime<Utc>,
    /// Comma-joined recipient addresses.
    pub emails: Option<String>,
}
