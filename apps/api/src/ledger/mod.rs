//! Application ledger: the per-user durable record of every posting seen,
//! every application attempted, every address emailed, and every skip.
//!
//! This is the only writer of those tables and the sole source of the
//! at-most-once guarantee: a posting URL with an `Applied` application is
//! never processed again. Multi-row writes run in a single transaction, so a
//! failed write can never leave a half-recorded application behind.

pub mod schema;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::{debug, info};

use crate::models::application::{
    ApplicationKey, ApplicationRow, ApplicationStatus, EmailAttempt, EmailAttemptRow,
    LedgerStats, RecentApplication, SkipRow, SkipType,
};
use crate::models::posting::{JobPosting, PostingKey, PostingRow};
use crate::scoring::ScoreResult;

use self::schema::LEDGER_SCHEMA;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("could not create ledger directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to one user's ledger store. Cloning shares the underlying pool.
#[derive(Debug, Clone)]
pub struct Ledger {
    pool: SqlitePool,
}

impl Ledger {
    /// Opens (creating if needed) the ledger file at `path`.
    pub async fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| LedgerError::Directory {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let ledger = Self::connect(options).await?;
        info!("Ledger opened at {}", path.display());
        Ok(ledger)
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, LedgerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(options).await
    }

    // One connection per ledger: a run owns its handle and writes are serialized.
    async fn connect(options: SqliteConnectOptions) -> Result<Self, LedgerError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        for statement in LEDGER_SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// True iff an `Applied` application exists for the posting at `url`.
    pub async fn is_already_applied(&self, url: &str) -> Result<bool, LedgerError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM applications a
            JOIN jobs j ON j.id = a.job_id
            WHERE j.job_url = ? AND a.status = 'Applied'
            "#,
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// True iff the posting at `url` has any application or skip on record.
    pub async fn is_already_processed(&self, url: &str) -> Result<bool, LedgerError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT
                (SELECT COUNT(*) FROM applications a JOIN jobs j ON j.id = a.job_id WHERE j.job_url = ?)
              + (SELECT COUNT(*) FROM skipped_jobs s JOIN jobs j ON j.id = s.job_id WHERE j.job_url = ?)
            "#,
        )
        .bind(url)
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Number of skip records held against the posting at `url`.
    pub async fn skip_count(&self, url: &str) -> Result<u32, LedgerError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM skipped_jobs s JOIN jobs j ON j.id = s.job_id WHERE j.job_url = ?",
        )
        .bind(url)
        .fetch_one(&self.pool)
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    /// Inserts the posting if its URL is new, otherwise refreshes
    /// `last_processed`. Returns the same key for the same URL every time.
    ///
    /// An external id already owned by a different URL is dropped rather than
    /// rejecting the posting.
    pub async fn upsert_posting(&self, posting: &JobPosting) -> Result<PostingKey, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE job_url = ?")
            .bind(&posting.url)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(id) = existing {
            sqlx::query("UPDATE jobs SET last_processed = ? WHERE id = ?")
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            return Ok(PostingKey(id));
        }

        let mut external_id = posting.external_id.as_deref().filter(|id| !id.is_empty());
        if let Some(id) = external_id {
            let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM jobs WHERE job_id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            if taken.is_some() {
                debug!(external_id = id, url = %posting.url, "external id already recorded under another URL");
                external_id = None;
            }
        }

        let id = sqlx::query(
            r#"
            INSERT INTO jobs (
                job_id, job_url, company, title, location, description,
                applicant_count, days_posted, salary_min, salary_max,
                posted_text, applicant_text, salary_text, first_seen, last_processed
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(external_id)
        .bind(&posting.url)
        .bind(&posting.company)
        .bind(&posting.title)
        .bind(&posting.location)
        .bind(&posting.description)
        .bind(i64::from(posting.applicant_count))
        .bind(i64::from(posting.days_posted_ago))
        .bind(clamp_i64(posting.salary_min))
        .bind(clamp_i64(posting.salary_max))
        .bind(&posting.posted_text)
        .bind(&posting.applicant_text)
        .bind(&posting.salary_text)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;
        Ok(PostingKey(id))
    }

    /// Appends an application together with its delivery attempts, atomically.
    pub async fn record_application(
        &self,
        posting: PostingKey,
        status: ApplicationStatus,
        score: &ScoreResult,
        cover_letter: &str,
        attempts: &[EmailAttempt],
    ) -> Result<ApplicationKey, LedgerError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO applications (
                job_id, status, relevance_score, score_reasoning,
                key_matches, missing_skills, cover_letter, applied_date
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(posting)
        .bind(status.as_str())
        .bind(i64::from(score.score))
        .bind(&score.reasoning)
        .bind(score.key_matches.join(", "))
        .bind(score.missing_skills.join(", "))
        .bind(cover_letter)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for attempt in attempts {
            sqlx::query(
                "INSERT INTO emails_sent (application_id, recipient_email, sent_date, success) VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(&attempt.recipient)
            .bind(now)
            .bind(attempt.success)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(ApplicationKey(id))
    }

    /// Appends one delivery attempt to an existing application, such as a
    /// follow-up sent outside a run.
    pub async fn record_email_attempt(
        &self,
        application: ApplicationKey,
        recipient: &str,
        success: bool,
    ) -> Result<EmailAttemptRow, LedgerError> {
        let row = sqlx::query_as::<_, EmailAttemptRow>(
            r#"
            INSERT INTO emails_sent (application_id, recipient_email, sent_date, success)
            VALUES (?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(application)
        .bind(recipient)
        .bind(Utc::now())
        .bind(success)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn record_skip(
        &self,
        posting: PostingKey,
        reason: &str,
        skip_type: SkipType,
    ) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO skipped_jobs (job_id, skip_reason, skip_type, skipped_date) VALUES (?, ?, ?, ?)",
        )
        .bind(posting)
        .bind(reason)
        .bind(skip_type.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Aggregate counters, read in one statement so they describe a single
    /// committed snapshot.
    pub async fn stats(&self) -> Result<LedgerStats, LedgerError> {
        let stats = sqlx::query_as::<_, LedgerStats>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM jobs) AS total_jobs,
                (SELECT COUNT(*) FROM applications WHERE status = 'Applied') AS applications_sent,
                (SELECT COUNT(*) FROM skipped_jobs) AS jobs_skipped,
                (SELECT COUNT(*) FROM emails_sent WHERE success = 1) AS emails_sent
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(stats)
    }

    /// Most recent `Applied` applications, newest first.
    pub async fn recent_applications(
        &self,
        limit: u32,
    ) -> Result<Vec<RecentApplication>, LedgerError> {
        let rows = sqlx::query_as::<_, RecentApplication>(
            r#"
            SELECT j.company, j.title, j.job_url, a.relevance_score, a.applied_date,
                   GROUP_CONCAT(e.recipient_email, ',') AS emails
            FROM applications a
            JOIN jobs j ON j.id = a.job_id
            LEFT JOIN emails_sent e ON e.application_id = a.id
            WHERE a.status = 'Applied'
            GROUP BY a.id
            ORDER BY a.applied_date DESC, a.id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn find_posting(&self, url: &str) -> Result<Option<PostingRow>, LedgerError> {
        let row = sqlx::query_as::<_, PostingRow>(
            r#"
            SELECT id, job_id, job_url, company, title, location, description,
                   applicant_count, days_posted, salary_min, salary_max,
                   first_seen, last_processed
            FROM jobs WHERE job_url = ?
            "#,
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_application(
        &self,
        application: ApplicationKey,
    ) -> Result<Option<ApplicationRow>, LedgerError> {
        let row = sqlx::query_as::<_, ApplicationRow>("SELECT * FROM applications WHERE id = ?")
            .bind(application)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Applications recorded for a posting, oldest first.
    pub async fn applications_for(
        &self,
        posting: PostingKey,
    ) -> Result<Vec<ApplicationRow>, LedgerError> {
        let rows = sqlx::query_as::<_, ApplicationRow>(
            "SELECT * FROM applications WHERE job_id = ? ORDER BY id",
        )
        .bind(posting)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn email_attempts_for(
        &self,
        application: ApplicationKey,
    ) -> Result<Vec<EmailAttemptRow>, LedgerError> {
        let rows = sqlx::query_as::<_, EmailAttemptRow>(
            "SELECT * FROM emails_sent WHERE application_id = ? ORDER BY id",
        )
        .bind(application)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn skips_for(&self, posting: PostingKey) -> Result<Vec<SkipRow>, LedgerError> {
        let rows =
            sqlx::query_as::<_, SkipRow>("SELECT * FROM skipped_jobs WHERE job_id = ? ORDER BY id")
                .bind(posting)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Recommendation;

    fn posting(url: &str) -> JobPosting {
        JobPosting {
            url: url.to_string(),
            external_id: Some(url.rsplit('/').next().unwrap_or_default().to_string()),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            description: "Rust services".to_string(),
            days_posted_ago: 2,
            applicant_count: 12,
            salary_min: 100_000,
            salary_max: 120_000,
            ..Default::default()
        }
    }

    fn score(value: u8) -> ScoreResult {
        ScoreResult {
            score: value,
            reasoning: "fit".to_string(),
            key_matches: vec!["Rust".to_string(), "SQL".to_string()],
            missing_skills: vec![],
            recommendation: Recommendation::Apply,
        }
    }

    fn sent(to: &str) -> EmailAttempt {
        EmailAttempt {
            recipient: to.to_string(),
            success: true,
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let ledger = Ledger::in_memory().await.unwrap();
        let first = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        let second = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.stats().await.unwrap().total_jobs, 1);

        let row = ledger.find_posting("https://x.com/jobs/1").await.unwrap().unwrap();
        assert!(row.last_processed >= row.first_seen);
        assert_eq!(row.salary_max, Some(120_000));
    }

    #[tokio::test]
    async fn test_shared_external_id_does_not_block_insert() {
        let ledger = Ledger::in_memory().await.unwrap();
        let mut a = posting("https://x.com/jobs/a");
        a.external_id = Some("77".to_string());
        let mut b = posting("https://x.com/jobs/b");
        b.external_id = Some("77".to_string());

        let ka = ledger.upsert_posting(&a).await.unwrap();
        let kb = ledger.upsert_posting(&b).await.unwrap();
        assert_ne!(ka, kb);
        let row_b = ledger.find_posting(&b.url).await.unwrap().unwrap();
        assert!(row_b.job_id.is_none());
    }

    #[tokio::test]
    async fn test_applied_marks_only_that_url() {
        let ledger = Ledger::in_memory().await.unwrap();
        let key = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        ledger.upsert_posting(&posting("https://x.com/jobs/2")).await.unwrap();

        ledger
            .record_application(
                key,
                ApplicationStatus::Applied,
                &score(80),
                "<p>Hi</p>",
                &[sent("hr@acme.com")],
            )
            .await
            .unwrap();

        assert!(ledger.is_already_applied("https://x.com/jobs/1").await.unwrap());
        assert!(!ledger.is_already_applied("https://x.com/jobs/2").await.unwrap());
        assert!(!ledger.is_already_applied("https://x.com/jobs/3").await.unwrap());
    }

    #[tokio::test]
    async fn test_skipped_and_failed_do_not_count_as_applied() {
        let ledger = Ledger::in_memory().await.unwrap();
        let url = "https://x.com/jobs/9";
        let key = ledger.upsert_posting(&posting(url)).await.unwrap();
        ledger
            .record_application(key, ApplicationStatus::Skipped, &score(20), "", &[])
            .await
            .unwrap();
        ledger
            .record_application(
                key,
                ApplicationStatus::Failed,
                &score(90),
                "<p>x</p>",
                &[EmailAttempt {
                    recipient: "hr@acme.com".to_string(),
                    success: false,
                }],
            )
            .await
            .unwrap();

        assert!(!ledger.is_already_applied(url).await.unwrap());
        assert!(ledger.is_already_processed(url).await.unwrap());
        assert_eq!(ledger.applications_for(key).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_application_and_attempts_written_together() {
        let ledger = Ledger::in_memory().await.unwrap();
        let key = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        let app = ledger
            .record_application(
                key,
                ApplicationStatus::Applied,
                &score(75),
                "<p>letter</p>",
                &[sent("hr@acme.com"), sent("jobs@acme.com")],
            )
            .await
            .unwrap();

        let attempts = ledger.email_attempts_for(app).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.success));

        let apps = ledger.applications_for(key).await.unwrap();
        assert_eq!(apps[0].key_matches.as_deref(), Some("Rust, SQL"));
        assert_eq!(apps[0].relevance_score, Some(75));
    }

    #[tokio::test]
    async fn test_unknown_posting_key_rolls_back() {
        let ledger = Ledger::in_memory().await.unwrap();
        let result = ledger
            .record_application(
                PostingKey(404),
                ApplicationStatus::Applied,
                &score(90),
                "",
                &[sent("hr@acme.com")],
            )
            .await;
        assert!(result.is_err());
        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.applications_sent, 0);
        assert_eq!(stats.emails_sent, 0);
    }

    #[tokio::test]
    async fn test_stats_and_skips() {
        let ledger = Ledger::in_memory().await.unwrap();
        let a = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        let b = ledger.upsert_posting(&posting("https://x.com/jobs/2")).await.unwrap();
        ledger
            .record_skip(b, "Missing title", SkipType::Quality)
            .await
            .unwrap();
        let app = ledger
            .record_application(a, ApplicationStatus::Applied, &score(70), "", &[])
            .await
            .unwrap();
        ledger.record_email_attempt(app, "hr@acme.com", true).await.unwrap();
        ledger.record_email_attempt(app, "jobs@acme.com", false).await.unwrap();

        assert_eq!(
            ledger.stats().await.unwrap(),
            LedgerStats {
                total_jobs: 2,
                applications_sent: 1,
                jobs_skipped: 1,
                emails_sent: 1,
            }
        );
        assert_eq!(ledger.skip_count("https://x.com/jobs/2").await.unwrap(), 1);
        let skips = ledger.skips_for(b).await.unwrap();
        assert_eq!(skips[0].skip_type.as_deref(), Some("quality"));
    }

    #[tokio::test]
    async fn test_recent_applications_joins_recipients() {
        let ledger = Ledger::in_memory().await.unwrap();
        let a = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        let b = ledger.upsert_posting(&posting("https://x.com/jobs/2")).await.unwrap();
        ledger
            .record_application(
                a,
                ApplicationStatus::Applied,
                &score(70),
                "",
                &[sent("hr@acme.com"), sent("jobs@acme.com")],
            )
            .await
            .unwrap();
        ledger
            .record_application(b, ApplicationStatus::Skipped, &score(10), "", &[])
            .await
            .unwrap();

        let recent = ledger.recent_applications(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].job_url, "https://x.com/jobs/1");
        let emails = recent[0].emails.clone().unwrap();
        assert!(emails.contains("hr@acme.com") && emails.contains("jobs@acme.com"));
    }

    #[tokio::test]
    async fn test_file_ledger_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("user.db");
        {
            let ledger = Ledger::open(&path).await.unwrap();
            let key = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
            ledger
                .record_application(key, ApplicationStatus::Applied, &score(88), "", &[])
                .await
                .unwrap();
        }
        let reopened = Ledger::open(&path).await.unwrap();
        assert!(reopened.is_already_applied("https://x.com/jobs/1").await.unwrap());
    }

    #[tokio::test]
    async fn test_follow_up_attempt_appends_to_application() {
        let ledger = Ledger::in_memory().await.unwrap();
        let key = ledger.upsert_posting(&posting("https://x.com/jobs/1")).await.unwrap();
        let app = ledger
            .record_application(key, ApplicationStatus::Applied, &score(70), "", &[sent("hr@acme.com")])
            .await
            .unwrap();

        let row = ledger.record_email_attempt(app, "cto@acme.com", true).await.unwrap();
        assert_eq!(row.application_id, app.0);
        assert_eq!(row.recipient_email, "cto@acme.com");
        assert_eq!(ledger.email_attempts_for(app).await.unwrap().len(), 2);

        assert!(ledger.find_application(app).await.unwrap().is_some());
        assert!(ledger.find_application(ApplicationKey(app.0 + 1)).await.unwrap().is_none());
    }
}
