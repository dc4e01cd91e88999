use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::retry::{RetryPolicy, RetryableError};

/// Default endpoint of the enrichment provider's domain search.
pub const DEFAULT_ENRICHMENT_URL: &str = "https://api.hunter.io/v2/domain-search";
const DEFAULT_LIMIT: u32 = 5;
const DEPARTMENT: &str = "hr";

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("enrichment API returned status {status}: {message}")]
    Status { status: u16, message: String },
}

impl RetryableError for EnrichmentError {
    fn status(&self) -> Option<u16> {
        match self {
            EnrichmentError::Status { status, .. } => Some(*status),
            EnrichmentError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }

    fn is_transport(&self) -> bool {
        match self {
            EnrichmentError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            EnrichmentError::Status { .. } => false,
        }
    }
}

/// What the enrichment provider knows about a company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentMatch {
    /// Empty when the provider could not name a domain.
    pub domain: String,
    pub emails: Vec<String>,
}

/// Third-party lookup from company or domain to recruiting addresses.
#[async_trait]
pub trait EmailEnrichment: Send + Sync {
    async fn search_company(&self, company: &str) -> Result<EnrichmentMatch, EnrichmentError>;
    async fn search_domain(&self, domain: &str) -> Result<Vec<String>, EnrichmentError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    domain: Option<String>,
    #[serde(default)]
    emails: Vec<EmailEntry>,
}

#[derive(Debug, Deserialize)]
struct EmailEntry {
    value: Option<String>,
}

impl From<SearchData> for EnrichmentMatch {
    fn from(data: SearchData) -> Self {
        Self {
            domain: data.domain.unwrap_or_default().trim().to_lowercase(),
            emails: data
                .emails
                .into_iter()
                .filter_map(|e| e.value)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }
}

/// Hunter-style domain search client bound to one user's API key.
pub struct HunterClient {
    client: Client,
    base_url: String,
    api_key: String,
    limit: u32,
    retry: RetryPolicy,
}

impl HunterClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, EnrichmentError> {
        let client = Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            limit: DEFAULT_LIMIT,
            retry,
        })
    }

    async fn search(&self, key: &str, value: &str) -> Result<EnrichmentMatch, EnrichmentError> {
        let limit = self.limit.to_string();
        let params = [
            ("api_key", self.api_key.as_str()),
            (key, value),
            ("limit", limit.as_str()),
            ("department", DEPARTMENT),
        ];

        self.retry
            .run("enrichment search", || self.search_once(&params))
            .await
    }

    async fn search_once(&self, params: &[(&str, &str)]) -> Result<EnrichmentMatch, EnrichmentError> {
        let response = self.client.get(&self.base_url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Status {
                status: status.as_u16(),
                message,
            });
        }
        let body: SearchResponse = response.json().await?;
        Ok(EnrichmentMatch::from(body.data))
    }
}

#[async_trait]
impl EmailEnrichment for HunterClient {
    async fn search_company(&self, company: &str) -> Result<EnrichmentMatch, EnrichmentError> {
        let found = self.search("company", company).await?;
        debug!(company, emails = found.emails.len(), "enrichment company search");
        Ok(found)
    }

    async fn search_domain(&self, domain: &str) -> Result<Vec<String>, EnrichmentError> {
        let found = self.search("domain", domain).await?;
        debug!(domain, emails = found.emails.len(), "enrichment domain search");
        Ok(found.emails)
    }
}
