//! Run records in the shared store.
//!
//! A run is created `running` and moves to exactly one terminal state. The
//! terminal transition only applies to a row that is still `running`, so the
//! first writer wins and a late writer (or the staleness sweep) can never
//! overwrite an outcome.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::warn;
use uuid::Uuid;

use crate::models::run::{RunCounters, RunRecord, RunStatus};

pub const STALE_RUN_MESSAGE: &str = "Run abandoned: no completion within the staleness window";

pub async fn create_run(pool: &SqlitePool, user_id: Uuid) -> Result<RunRecord, sqlx::Error> {
    sqlx::query_as::<_, RunRecord>(
        "INSERT INTO job_runs (user_id, status, started_at) VALUES (?, 'running', ?) RETURNING *",
    )
    .bind(user_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn get_run(pool: &SqlitePool, run_id: i64) -> Result<Option<RunRecord>, sqlx::Error> {
    sqlx::query_as::<_, RunRecord>("SELECT * FROM job_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await
}

pub async fn recent_runs(
    pool: &SqlitePool,
    user_id: Uuid,
    limit: u32,
) -> Result<Vec<RunRecord>, sqlx::Error> {
    sqlx::query_as::<_, RunRecord>(
        "SELECT * FROM job_runs WHERE user_id = ? ORDER BY started_at DESC, id DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await
}

pub async fn active_run(pool: &SqlitePool, user_id: Uuid) -> Result<Option<RunRecord>, sqlx::Error> {
    sqlx::query_as::<_, RunRecord>(
        "SELECT * FROM job_runs WHERE user_id = ? AND status = 'running' ORDER BY id DESC LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Moves a running run to its terminal state. Returns false if the run had
/// already reached one. `None` counters keep whatever was stored.
pub async fn finish_run(
    pool: &SqlitePool,
    run_id: i64,
    status: RunStatus,
    counters: Option<&RunCounters>,
    error_message: Option<&str>,
) -> Result<bool, sqlx::Error> {
    if !status.is_terminal() {
        warn!(run_id, "finish_run called with non-terminal status");
        return Ok(false);
    }

    let result = sqlx::query(
        r#"
        UPDATE job_runs SET
            status = ?,
            completed_at = ?,
            error_message = ?,
            jobs_processed = COALESCE(?, jobs_processed),
            applications_sent = COALESCE(?, applications_sent),
            jobs_skipped = COALESCE(?, jobs_skipped)
        WHERE id = ? AND status = 'running'
        "#,
    )
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(error_message)
    .bind(counters.map(|c| i64::from(c.jobs_processed)))
    .bind(counters.map(|c| i64::from(c.applications_sent)))
    .bind(counters.map(|c| i64::from(c.jobs_skipped)))
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Persists a stop request. Returns false if the run is not running.
pub async fn request_stop(pool: &SqlitePool, run_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE job_runs SET stop_requested = 1 WHERE id = ? AND status = 'running'",
    )
    .bind(run_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Fails every `running` row started before `now - older_than`, except the
/// runs listed in `live`. Returns how many rows were failed.
pub async fn fail_stale_runs(
    pool: &SqlitePool,
    older_than: Duration,
    live: &[i64],
) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - older_than;
    let stale: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM job_runs WHERE status = 'running' AND started_at < ?",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let mut failed = 0;
    for run_id in stale.into_iter().filter(|id| !live.contains(id)) {
        if finish_run(pool, run_id, RunStatus::Failed, None, Some(STALE_RUN_MESSAGE)).await? {
            warn!(run_id, "stale run marked failed");
            failed += 1;
        }
    }
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_create_starts_running() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        let run = create_run(&pool, user).await.unwrap();
        assert_eq!(run.run_status(), Some(RunStatus::Running));
        assert_eq!(run.user_id, user);
        assert!(!run.stop_requested);
        assert!(run.completed_at.is_none());
        assert_eq!(active_run(&pool, user).await.unwrap().unwrap().id, run.id);
    }

    #[tokio::test]
    async fn test_first_terminal_state_wins() {
        let pool = test_pool().await;
        let run = create_run(&pool, Uuid::new_v4()).await.unwrap();
        let counters = RunCounters {
            jobs_processed: 4,
            applications_sent: 2,
            jobs_skipped: 2,
        };

        assert!(finish_run(&pool, run.id, RunStatus::Completed, Some(&counters), None)
            .await
            .unwrap());
        assert!(!finish_run(&pool, run.id, RunStatus::Failed, None, Some("late"))
            .await
            .unwrap());

        let stored = get_run(&pool, run.id).await.unwrap().unwrap();
        assert_eq!(stored.run_status(), Some(RunStatus::Completed));
        assert_eq!(stored.jobs_processed, 4);
        assert_eq!(stored.applications_sent, 2);
        assert!(stored.completed_at.is_some());
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_stop_only_applies_to_running() {
        let pool = test_pool().await;
        let run = create_run(&pool, Uuid::new_v4()).await.unwrap();
        assert!(request_stop(&pool, run.id).await.unwrap());
        assert!(get_run(&pool, run.id).await.unwrap().unwrap().stop_requested);

        finish_run(&pool, run.id, RunStatus::Stopped, None, None).await.unwrap();
        assert!(!request_stop(&pool, run.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_sweep_spares_live_runs() {
        let pool = test_pool().await;
        let abandoned = create_run(&pool, Uuid::new_v4()).await.unwrap();
        let live = create_run(&pool, Uuid::new_v4()).await.unwrap();

        let failed = fail_stale_runs(&pool, Duration::zero() - Duration::seconds(1), &[live.id])
            .await
            .unwrap();
        assert_eq!(failed, 1);

        let stored = get_run(&pool, abandoned.id).await.unwrap().unwrap();
        assert_eq!(stored.run_status(), Some(RunStatus::Failed));
        assert_eq!(stored.error_message.as_deref(), Some(STALE_RUN_MESSAGE));
        let still = get_run(&pool, live.id).await.unwrap().unwrap();
        assert_eq!(still.run_status(), Some(RunStatus::Running));
    }

    #[tokio::test]
    async fn test_recent_runs_newest_first() {
        let pool = test_pool().await;
        let user = Uuid::new_v4();
        let first = create_run(&pool, user).await.unwrap();
        finish_run(&pool, first.id, RunStatus::Completed, None, None).await.unwrap();
        let second = create_run(&pool, user).await.unwrap();
        create_run(&pool, Uuid::new_v4()).await.unwrap();

        let runs = recent_runs(&pool, user, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.id);
    }
}
