use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable key of a row in the `jobs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct PostingKey(pub i64);

/// A single field as the scraper produced it.
///
/// Listing pages are not strongly typed: the same field can arrive as plain
/// text, a list of fragments, or a mapping. Only the normalizer looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Null,
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
    List(Vec<RawField>),
    Map(BTreeMap<String, RawField>),
}

impl From<&str> for RawField {
    fn from(value: &str) -> Self {
        RawField::Text(value.to_string())
    }
}

impl From<String> for RawField {
    fn from(value: String) -> Self {
        RawField::Text(value)
    }
}

impl From<Vec<RawField>> for RawField {
    fn from(value: Vec<RawField>) -> Self {
        RawField::List(value)
    }
}

/// Untyped record returned by a posting-detail scrape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPosting {
    #[serde(flatten)]
    pub fields: BTreeMap<String, RawField>,
}

impl RawPosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for scrapers and tests.
    pub fn with(mut self, key: &str, value: impl Into<RawField>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<RawField>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&RawField> {
        self.fields.get(key)
    }
}

/// Canonical posting produced by the normalizer. Every text field is trimmed
/// plain text; the numeric fields are derived quality signals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub url: String,
    pub external_id: Option<String>,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub posted_text: String,
    pub applicant_text: String,
    pub salary_text: String,
    /// 999 when the posting age could not be read.
    pub days_posted_ago: u32,
    pub applicant_count: u32,
    pub salary_min: u64,
    pub salary_max: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PostingRow {
    pub id: i64,
    pub job_id: Option<String>,
    pub job_url: String,
    pub company: Option<String>,
    pub title: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub applicant_count: Option<i64>,
    pub days_posted: Option<i64>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub first_seen: DateTime<Utc>,
    pub last_processed: DateTime<Utc>,
}
