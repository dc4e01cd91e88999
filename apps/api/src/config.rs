use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::contacts::enrichment::DEFAULT_ENRICHMENT_URL;

/// Service configuration loaded from environment variables.
/// Everything has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
    pub enrichment_api_url: String,
    pub run_batch_size: usize,
    pub inter_application_delay: Duration,
    pub rate_limit_backoff: Duration,
    pub max_recipients_per_job: usize,
    pub stale_run_after: Duration,
    /// Stop contact discovery at generic role mailboxes once a domain is
    /// guessed. Disable to fall through to scanning the company website.
    pub generic_contact_fallback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/outreach.db".to_string(),
            data_dir: PathBuf::from("data"),
            port: 8080,
            rust_log: "info".to_string(),
            enrichment_api_url: DEFAULT_ENRICHMENT_URL.to_string(),
            run_batch_size: 10,
            inter_application_delay: Duration::from_secs(2),
            rate_limit_backoff: Duration::from_secs(5),
            max_recipients_per_job: 5,
            stale_run_after: Duration::from_secs(10 * 60),
            generic_contact_fallback: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        Ok(Config {
            database_url: env_or("DATABASE_URL", defaults.database_url),
            data_dir: env_or("DATA_DIR", defaults.data_dir.display().to_string()).into(),
            port: parse_env("PORT", defaults.port)?,
            rust_log: env_or("RUST_LOG", defaults.rust_log),
            enrichment_api_url: env_or("ENRICHMENT_API_URL", defaults.enrichment_api_url),
            run_batch_size: parse_env("RUN_BATCH_SIZE", defaults.run_batch_size)?,
            inter_application_delay: Duration::from_secs(parse_env(
                "INTER_APPLICATION_DELAY_SECS",
                2,
            )?),
            rate_limit_backoff: Duration::from_secs(parse_env("RATE_LIMIT_BACKOFF_SECS", 5)?),
            max_recipients_per_job: parse_env(
                "MAX_RECIPIENTS_PER_JOB",
                defaults.max_recipients_per_job,
            )?,
            stale_run_after: Duration::from_secs(60 * parse_env::<u64>("STALE_RUN_MINUTES", 10)?),
            generic_contact_fallback: parse_env(
                "GENERIC_CONTACT_FALLBACK",
                defaults.generic_contact_fallback,
            )?,
        })
    }

    /// Location of one user's ledger file.
    pub fn ledger_path(&self, user_id: Uuid) -> PathBuf {
        self.data_dir.join(format!("user_{user_id}.db"))
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_path_is_per_user() {
        let config = Config {
            data_dir: PathBuf::from("/var/outreach"),
            ..Config::default()
        };
        let user = Uuid::nil();
        assert_eq!(
            config.ledger_path(user),
            PathBuf::from("/var/outreach/user_00000000-0000-0000-0000-000000000000.db")
        );
    }

    #[test]
    fn test_unset_variable_uses_default() {
        let value: usize = parse_env("OUTREACH_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
        assert!(parse_env("OUTREACH_TEST_UNSET_VARIABLE", true).unwrap());
    }
}
