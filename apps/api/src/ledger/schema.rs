//! Per-user ledger schema. Statements are idempotent and run on every open.

pub const LEDGER_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id          TEXT UNIQUE,
        job_url         TEXT NOT NULL UNIQUE,
        company         TEXT,
        title           TEXT,
        location        TEXT,
        description     TEXT,
        applicant_count INTEGER,
        days_posted     INTEGER,
        salary_min      INTEGER,
        salary_max      INTEGER,
        posted_text     TEXT,
        applicant_text  TEXT,
        salary_text     TEXT,
        first_seen      TEXT NOT NULL,
        last_processed  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS applications (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id          INTEGER NOT NULL REFERENCES jobs(id),
        status          TEXT NOT NULL CHECK (status IN ('Applied', 'Skipped', 'Failed')),
        relevance_score INTEGER,
        score_reasoning TEXT,
        key_matches     TEXT,
        missing_skills  TEXT,
        cover_letter    TEXT,
        applied_date    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS emails_sent (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        application_id  INTEGER NOT NULL REFERENCES applications(id),
        recipient_email TEXT NOT NULL,
        sent_date       TEXT NOT NULL,
        success         INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS skipped_jobs (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        job_id       INTEGER NOT NULL REFERENCES jobs(id),
        skip_reason  TEXT NOT NULL,
        skip_type    TEXT CHECK (skip_type IN ('quality', 'score', 'no_emails', 'error')),
        skipped_date TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_applications_job ON applications(job_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_emails_application ON emails_sent(application_id)",
    "CREATE INDEX IF NOT EXISTS idx_skipped_job ON skipped_jobs(job_id)",
];
