//! Views over a user's ledger, plus manual follow-up logging.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ledger::Ledger;
use crate::models::application::{
    ApplicationKey, ApplicationRow, EmailAttemptRow, LedgerStats, RecentApplication, SkipRow,
};
use crate::models::posting::{PostingKey, PostingRow};
use crate::state::AppState;

const DEFAULT_APPLICATION_LIMIT: u32 = 20;
const MAX_APPLICATION_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PostingQuery {
    pub url: String,
}

/// Everything the ledger holds about one posting.
#[derive(Debug, Serialize)]
pub struct PostingHistory {
    pub posting: PostingRow,
    pub applications: Vec<ApplicationHistory>,
    pub skips: Vec<SkipRow>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationHistory {
    #[serde(flatten)]
    pub application: ApplicationRow,
    pub emails: Vec<EmailAttemptRow>,
}

#[derive(Debug, Deserialize)]
pub struct FollowUpRequest {
    pub recipient: String,
    #[serde(default = "default_success")]
    pub success: bool,
}

fn default_success() -> bool {
    true
}

/// Opens the user's ledger, or `None` if they have never run.
async fn open_existing(state: &AppState, user_id: Uuid) -> Result<Option<Ledger>, AppError> {
    let path = state.config.ledger_path(user_id);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Ok(None);
    }
    Ok(Some(Ledger::open(&path).await?))
}

/// GET /api/v1/users/:user_id/stats
pub async fn handle_stats(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<LedgerStats>, AppError> {
    let stats = match open_existing(&state, user_id).await? {
        Some(ledger) => ledger.stats().await?,
        None => LedgerStats::default(),
    };
    Ok(Json(stats))
}

/// GET /api/v1/users/:user_id/applications
pub async fn handle_recent_applications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<RecentQuery>,
) -> Result<Json<Vec<RecentApplication>>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_APPLICATION_LIMIT)
        .clamp(1, MAX_APPLICATION_LIMIT);
    let applications = match open_existing(&state, user_id).await? {
        Some(ledger) => ledger.recent_applications(limit).await?,
        None => Vec::new(),
    };
    Ok(Json(applications))
}

/// GET /api/v1/users/:user_id/postings?url=...
pub async fn handle_posting_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PostingQuery>,
) -> Result<Json<PostingHistory>, AppError> {
    let not_found = || AppError::NotFound(format!("posting {} has not been seen", params.url));
    let ledger = open_existing(&state, user_id).await?.ok_or_else(not_found)?;
    let posting = ledger.find_posting(&params.url).await?.ok_or_else(not_found)?;
    let key = PostingKey(posting.id);

    let mut applications = Vec::new();
    for application in ledger.applications_for(key).await? {
        let emails = ledger
            .email_attempts_for(ApplicationKey(application.id))
            .await?;
        applications.push(ApplicationHistory {
            application,
            emails,
        });
    }
    let skips = ledger.skips_for(key).await?;

    Ok(Json(PostingHistory {
        posting,
        applications,
        skips,
    }))
}

/// POST /api/v1/users/:user_id/applications/:application_id/emails
pub async fn handle_record_follow_up(
    State(state): State<AppState>,
    Path((user_id, application_id)): Path<(Uuid, i64)>,
    Json(body): Json<FollowUpRequest>,
) -> Result<(StatusCode, Json<EmailAttemptRow>), AppError> {
    let recipient = body.recipient.trim();
    if !recipient.contains('@') {
        return Err(AppError::Validation(format!(
            "recipient '{recipient}' is not an email address"
        )));
    }

    let not_found = || AppError::NotFound(format!("application {application_id}"));
    let ledger = open_existing(&state, user_id).await?.ok_or_else(not_found)?;
    let key = ApplicationKey(application_id);
    if ledger.find_application(key).await?.is_none() {
        return Err(not_found());
    }

    let attempt = ledger
        .record_email_attempt(key, recipient, body.success)
        .await?;
    Ok((StatusCode::CREATED, Json(attempt)))
}
