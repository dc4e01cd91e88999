//! Per-user settings held in the shared store: credentials, sender identity,
//! listing source, resume location, and the filtering thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::postings::QualityConfig;

/// What to do with a posting that was skipped or failed on an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReprocessPolicy {
    /// Reconsider it on every run.
    #[default]
    Always,
    /// Never look at it again once anything was recorded for it.
    Never,
    /// Reconsider it until it has collected this many skip records.
    MaxAttempts { attempts: u32 },
}

#[derive(Debug, Clone, FromRow)]
pub struct UserSettings {
    pub user_id: Uuid,
    pub model_api_key: Option<String>,
    pub enrichment_api_key: Option<String>,
    pub mail_access_token: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub listing_search_url: Option<String>,
    pub listing_session_cookie: Option<String>,
    pub resume_text_path: Option<String>,
    pub resume_pdf_path: Option<String>,
    pub attach_resume: bool,
    pub max_days_posted: i64,
    pub max_applicants: i64,
    pub min_relevance_score: i64,
    pub min_description_length: i64,
    pub excluded_companies: Json<Vec<String>>,
    pub custom_prompt: Option<String>,
    pub reprocess_policy: Json<ReprocessPolicy>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn defaults(user_id: Uuid) -> Self {
        Self {
            user_id,
            model_api_key: None,
            enrichment_api_key: None,
            mail_access_token: None,
            sender_name: None,
            sender_email: None,
            listing_search_url: None,
            listing_session_cookie: None,
            resume_text_path: None,
            resume_pdf_path: None,
            attach_resume: true,
            max_days_posted: 14,
            max_applicants: 500,
            min_relevance_score: 60,
            min_description_length: 50,
            excluded_companies: Json(Vec::new()),
            custom_prompt: None,
            reprocess_policy: Json(ReprocessPolicy::Always),
            updated_at: Utc::now(),
        }
    }

    pub fn quality_config(&self) -> QualityConfig {
        QualityConfig {
            max_days_posted: to_u32(self.max_days_posted),
            max_applicants: to_u32(self.max_applicants),
            min_description_length: usize::try_from(self.min_description_length.max(0))
                .unwrap_or(usize::MAX),
            excluded_companies: self.excluded_companies.0.clone(),
        }
    }

    pub fn relevance_threshold(&self) -> u8 {
        self.min_relevance_score.clamp(0, 100) as u8
    }

    /// Applies a partial update. Empty strings clear optional fields.
    pub fn apply(&mut self, update: SettingsUpdate) {
        fn set(field: &mut Option<String>, value: Option<String>) {
            if let Some(v) = value {
                let v = v.trim().to_string();
                *field = if v.is_empty() { None } else { Some(v) };
            }
        }

        set(&mut self.model_api_key, update.model_api_key);
        set(&mut self.enrichment_api_key, update.enrichment_api_key);
        set(&mut self.mail_access_token, update.mail_access_token);
        set(&mut self.sender_name, update.sender_name);
        set(&mut self.sender_email, update.sender_email);
        set(&mut self.listing_search_url, update.listing_search_url);
        set(&mut self.listing_session_cookie, update.listing_session_cookie);
        set(&mut self.resume_text_path, update.resume_text_path);
        set(&mut self.resume_pdf_path, update.resume_pdf_path);
        set(&mut self.custom_prompt, update.custom_prompt);

        if let Some(v) = update.attach_resume {
            self.attach_resume = v;
        }
        if let Some(v) = update.max_days_posted {
            self.max_days_posted = i64::from(v);
        }
        if let Some(v) = update.max_applicants {
            self.max_applicants = i64::from(v);
        }
        if let Some(v) = update.min_relevance_score {
            self.min_relevance_score = i64::from(v);
        }
        if let Some(v) = update.min_description_length {
            self.min_description_length = i64::from(v);
        }
        if let Some(list) = update.excluded_companies {
            self.excluded_companies = Json(
                list.into_iter()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect(),
            );
        }
        if let Some(policy) = update.reprocess_policy {
            self.reprocess_policy = Json(policy);
        }
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// Partial settings update accepted by the API.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub model_api_key: Option<String>,
    pub enrichment_api_key: Option<String>,
    pub mail_access_token: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub listing_search_url: Option<String>,
    pub listing_session_cookie: Option<String>,
    pub resume_text_path: Option<String>,
    pub resume_pdf_path: Option<String>,
    pub attach_resume: Option<bool>,
    pub max_days_posted: Option<u32>,
    pub max_applicants: Option<u32>,
    pub min_relevance_score: Option<u8>,
    pub min_description_length: Option<u32>,
    pub excluded_companies: Option<Vec<String>>,
    pub custom_prompt: Option<String>,
    pub reprocess_policy: Option<ReprocessPolicy>,
}

/// Settings as returned by the API. Secrets are reported as present or not.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub user_id: Uuid,
    pub has_model_api_key: bool,
    pub has_enrichment_api_key: bool,
    pub has_mail_access_token: bool,
    pub has_listing_session_cookie: bool,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub listing_search_url: Option<String>,
    pub resume_text_path: Option<String>,
    pub resume_pdf_path: Option<String>,
    pub attach_resume: bool,
    pub max_days_posted: i64,
    pub max_applicants: i64,
    pub min_relevance_score: i64,
    pub min_description_length: i64,
    pub excluded_companies: Vec<String>,
    pub custom_prompt: Option<String>,
    pub reprocess_policy: ReprocessPolicy,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserSettings> for SettingsView {
    fn from(s: &UserSettings) -> Self {
        Self {
            user_id: s.user_id,
            has_model_api_key: s.model_api_key.is_some(),
            has_enrichment_api_key: s.enrichment_api_key.is_some(),
            has_mail_access_token: s.mail_access_token.is_some(),
            has_listing_session_cookie: s.listing_session_cookie.is_some(),
            sender_name: s.sender_name.clone(),
            sender_email: s.sender_email.clone(),
            listing_search_url: s.listing_search_url.clone(),
            resume_text_path: s.resume_text_path.clone(),
            resume_pdf_path: s.resume_pdf_path.clone(),
            attach_resume: s.attach_resume,
            max_days_posted: s.max_days_posted,
            max_applicants: s.max_applicants,
            min_relevance_score: s.min_relevance_score,
            min_description_length: s.min_description_length,
            excluded_companies: s.excluded_companies.0.clone(),
            custom_prompt: s.custom_prompt.clone(),
            reprocess_policy: s.reprocess_policy.0,
            updated_at: s.updated_at,
        }
    }
}

pub async fn get_settings(
    pool: &SqlitePool,
    user_id: Uuid,
) -> Result<Option<UserSettings>, sqlx::Error> {
    sqlx::query_as::<_, UserSettings>("SELECT * FROM user_settings WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn save_settings(
    pool: &SqlitePool,
    settings: &UserSettings,
) -> Result<UserSettings, sqlx::Error> {
    sqlx::query_as::<_, UserSettings>(
        r#"
        INSERT INTO user_settings (
            user_id, model_api_key, enrichment_api_key, mail_access_token,
            sender_name, sender_email, listing_search_url, listing_session_cookie,
            resume_text_path, resume_pdf_path, attach_resume, max_days_posted,
            max_applicants, min_relevance_score, min_description_length,
            excluded_companies, custom_prompt, reprocess_policy, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id) DO UPDATE SET
            model_api_key = excluded.model_api_key,
            enrichment_api_key = excluded.enrichment_api_key,
            mail_access_token = excluded.mail_access_token,
            sender_name = excluded.sender_name,
            sender_email = excluded.sender_email,
            listing_search_url = excluded.listing_search_url,
            listing_session_cookie = excluded.listing_session_cookie,
            resume_text_path = excluded.resume_text_path,
            resume_pdf_path = excluded.resume_pdf_path,
            attach_resume = excluded.attach_resume,
            max_days_posted = excluded.max_days_posted,
            max_applicants = excluded.max_applicants,
            min_relevance_score = excluded.min_relevance_score,
            min_description_length = excluded.min_description_length,
            excluded_companies = excluded.excluded_companies,
            custom_prompt = excluded.custom_prompt,
            reprocess_policy = excluded.reprocess_policy,
            updated_at = excluded.updated_at
        RETURNING *
        "#,
    )
    .bind(settings.user_id)
    .bind(&settings.model_api_key)
    .bind(&settings.enrichment_api_key)
    .bind(&settings.mail_access_token)
    .bind(&settings.sender_name)
    .bind(&settings.sender_email)
    .bind(&settings.listing_search_url)
    .bind(&settings.listing_session_cookie)
    .bind(&settings.resume_text_path)
    .bind(&settings.resume_pdf_path)
    .bind(settings.attach_resume)
    .bind(settings.max_days_posted)
    .bind(settings.max_applicants)
    .bind(settings.min_relevance_score)
    .bind(settings.min_description_length)
    .bind(&settings.excluded_companies)
    .bind(&settings.custom_prompt)
    .bind(&settings.reprocess_policy)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}
