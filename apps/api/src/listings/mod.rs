//! Job listing sources. The pipeline depends only on `JobScraper`.

pub mod linkedin;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::posting::RawPosting;

pub use linkedin::LinkedInScraper;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("rate limited by listing site at {url}")]
    RateLimited { url: String },

    #[error("listing site returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("redirected to a sign-in or challenge page for {url}")]
    Blocked { url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ScrapeError {
    /// True when the site asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ScrapeError::RateLimited { .. } => true,
            ScrapeError::Http(e) => e.status().is_some_and(|s| s.as_u16() == 429),
            _ => false,
        }
    }
}

#[async_trait]
pub trait JobScraper: Send + Sync {
    /// Posting URLs found on a search results page, deduplicated, query
    /// strings removed.
    async fn list_posting_refs(
        &self,
        search_target: &str,
        session: Option<&str>,
    ) -> Result<Vec<String>, ScrapeError>;

    async fn fetch_posting_detail(
        &self,
        url: &str,
        session: Option<&str>,
    ) -> Result<RawPosting, ScrapeError>;
}
