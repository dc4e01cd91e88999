use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::errors::AppError;
use crate::settings::{get_settings, save_settings, SettingsUpdate, SettingsView, UserSettings};
use crate::state::AppState;

/// GET /api/v1/users/:user_id/settings
/// Users without saved settings get the defaults.
pub async fn handle_get_settings(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SettingsView>, AppError> {
    let settings = get_settings(&state.db, user_id)
        .await?
        .unwrap_or_else(|| UserSettings::defaults(user_id));
    Ok(Json(SettingsView::from(&settings)))
}

/// PUT /api/v1/users/:user_id/settings
/// Partial update; omitted fields keep their stored values.
pub async fn handle_put_settings(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<SettingsView>, AppError> {
    validate_update(&update)?;

    let mut settings = get_settings(&state.db, user_id)
        .await?
        .unwrap_or_else(|| UserSettings::defaults(user_id));
    settings.apply(update);
    settings.updated_at = chrono::Utc::now();

    let saved = save_settings(&state.db, &settings).await?;
    tracing::info!(user_id = %user_id, "Settings updated");
    Ok(Json(SettingsView::from(&saved)))
}

fn validate_update(update: &SettingsUpdate) -> Result<(), AppError> {
    if update.min_relevance_score.is_some_and(|s| s > 100) {
        return Err(AppError::Validation(
            "min_relevance_score must be between 0 and 100".to_string(),
        ));
    }
    if let Some(email) = update.sender_email.as_deref().map(str::trim) {
        if !email.is_empty() && !email.contains('@') {
            return Err(AppError::Validation(
                "sender_email must be an email address".to_string(),
            ));
        }
    }
    if let Some(url) = update.listing_search_url.as_deref().map(str::trim) {
        if !url.is_empty() && url::Url::parse(url).is_err() {
            return Err(AppError::Validation(
                "listing_search_url must be an absolute URL".to_string(),
            ));
        }
    }
    Ok(())
}
