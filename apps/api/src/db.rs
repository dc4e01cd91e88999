use std::str::FromStr;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

/// Shared store: user settings and run records. Per-user ledgers live in
/// their own files.
const SHARED_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS user_settings (
        user_id                BLOB PRIMARY KEY,
        model_api_key          TEXT,
        enrichment_api_key     TEXT,
        mail_access_token      TEXT,
        sender_name            TEXT,
        sender_email           TEXT,
        listing_search_url     TEXT,
        listing_session_cookie TEXT,
        resume_text_path       TEXT,
        resume_pdf_path        TEXT,
        attach_resume          INTEGER NOT NULL DEFAULT 1,
        max_days_posted        INTEGER NOT NULL DEFAULT 14,
        max_applicants         INTEGER NOT NULL DEFAULT 500,
        min_relevance_score    INTEGER NOT NULL DEFAULT 60,
        min_description_length INTEGER NOT NULL DEFAULT 50,
        excluded_companies     TEXT NOT NULL DEFAULT '[]',
        custom_prompt          TEXT,
        reprocess_policy       TEXT NOT NULL DEFAULT '{"mode":"always"}',
        updated_at             TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS job_runs (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id           BLOB NOT NULL,
        status            TEXT NOT NULL
                          CHECK (status IN ('running', 'completed', 'stopped', 'failed')),
        jobs_processed    INTEGER NOT NULL DEFAULT 0,
        applications_sent INTEGER NOT NULL DEFAULT 0,
        jobs_skipped      INTEGER NOT NULL DEFAULT 0,
        stop_requested    INTEGER NOT NULL DEFAULT 0,
        error_message     TEXT,
        started_at        TEXT NOT NULL,
        completed_at      TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_job_runs_user ON job_runs(user_id, started_at)",
    "CREATE INDEX IF NOT EXISTS idx_job_runs_status ON job_runs(status)",
];

/// Creates the shared SQLite pool and makes sure its tables exist.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    info!("Opening shared SQLite store...");

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    info!("Shared store ready");
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SHARED_SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

/// In-memory shared store with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<std::time::Duration>)
        .max_lifetime(None::<std::time::Duration>)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
