use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::run::{RunRecord, RunStatus};
use crate::pipeline::runs;
use crate::state::AppState;

const DEFAULT_RUN_LIMIT: u32 = 20;
const MAX_RUN_LIMIT: u32 = 200;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub run_id: i64,
    pub stop_requested: bool,
}

/// Overlays in-flight counters on a stored record.
async fn with_live_counters(state: &AppState, mut run: RunRecord) -> RunRecord {
    if let Some(live) = state.runs.live_counters(run.id).await {
        run.jobs_processed = i64::from(live.jobs_processed);
        run.applications_sent = i64::from(live.applications_sent);
        run.jobs_skipped = i64::from(live.jobs_skipped);
    }
    run
}

/// POST /api/v1/users/:user_id/runs
pub async fn handle_start_run(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<(StatusCode, Json<RunRecord>), AppError> {
    let run = state.runs.start(user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// GET /api/v1/users/:user_id/runs
pub async fn handle_list_runs(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<RunRecord>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_RUN_LIMIT).clamp(1, MAX_RUN_LIMIT);
    let mut out = Vec::new();
    for run in runs::recent_runs(&state.db, user_id, limit).await? {
        out.push(with_live_counters(&state, run).await);
    }
    Ok(Json(out))
}

/// GET /api/v1/runs/:run_id
pub async fn handle_get_run(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> Result<Json<RunRecord>, AppError> {
    let run = runs::get_run(&state.db, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("run {run_id}")))?;
    Ok(Json(with_live_counters(&state, run).await))
}

/// POST /api/v1/runs/:run_id/stop
pub async fn handle_stop_run(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> Result<(StatusCode, Json<StopResponse>), AppError> {
    let run = runs::get_run(&state.db, run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("run {run_id}")))?;
    if run.run_status() != Some(RunStatus::Running) {
        return Err(AppError::Conflict(format!(
            "run {run_id} is already {}",
            run.status
        )));
    }

    let stop_requested = state.runs.stop(run_id).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(StopResponse {
            run_id,
            stop_requested,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::build_router;
    use super::super::testing::{send, test_state};
    use crate::models::run::RunStatus;
    use crate::pipeline::runs;

    #[tokio::test]
    async fn test_unknown_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let router = build_router(test_state(dir.path()).await);

        let (status, body) = send(router, "GET", "/api/v1/runs/42", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_stopping_finished_run_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let run = runs::create_run(&state.db, uuid::Uuid::new_v4()).await.unwrap();
        runs::finish_run(&state.db, run.id, RunStatus::Completed, None, None)
            .await
            .unwrap();
        let router = build_router(state);

        let (status, body) =
            send(router, "POST", &format!("/api/v1/runs/{}/stop", run.id), None).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(
            body["error"]["message"],
            format!("run {} is already completed", run.id)
        );
    }

    #[tokio::test]
    async fn test_stop_persists_flag_for_running_run() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let run = runs::create_run(&state.db, uuid::Uuid::new_v4()).await.unwrap();
        let db = state.db.clone();
        let router = build_router(state);

        let (status, body) =
            send(router, "POST", &format!("/api/v1/runs/{}/stop", run.id), None).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["stop_requested"], true);
        assert!(runs::get_run(&db, run.id).await.unwrap().unwrap().stop_requested);
    }

    #[tokio::test]
    async fn test_run_without_settings_ends_failed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let user = uuid::Uuid::new_v4();
        let router = build_router(state.clone());

        let (status, body) =
            send(router.clone(), "POST", &format!("/api/v1/users/{user}/runs"), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "running");
        let run_id = body["id"].as_i64().unwrap();

        let mut finished = None;
        for _ in 0..500 {
            let run = runs::get_run(&state.db, run_id).await.unwrap().unwrap();
            if run.status != "running" {
                finished = Some(run);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let run = finished.expect("run should finish");
        assert_eq!(run.status, "failed");

        let (_, listed) = send(router, "GET", &format!("/api/v1/users/{user}/runs"), None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }
}
