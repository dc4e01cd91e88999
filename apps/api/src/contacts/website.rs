use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use super::domains::email_matches_domain;
use crate::retry::{RetryPolicy, RetryableError};

/// Paths scanned on a company site, most specific first.
const CONTACT_PATHS: &[&str] = &[
    "/contact",
    "/contact-us",
    "/about",
    "/about-us",
    "/careers",
    "/jobs",
    "/",
];

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").expect("email regex should compile")
});

static MAILTO_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href^="mailto:"]"#).expect("mailto selector should parse"));

#[derive(Debug, Error)]
pub enum PageFetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("page returned status {0}")]
    Status(u16),
}

impl RetryableError for PageFetchError {
    fn status(&self) -> Option<u16> {
        match self {
            PageFetchError::Status(status) => Some(*status),
            PageFetchError::Http(e) => e.status().map(|s| s.as_u16()),
        }
    }

    fn is_transport(&self) -> bool {
        matches!(self, PageFetchError::Http(e) if e.is_timeout() || e.is_connect())
    }
}

/// Fetches a page body as text.
#[async_trait]
pub trait ContactPageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, PageFetchError>;
}

pub struct HttpPageFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl HttpPageFetcher {
    pub fn new(retry: RetryPolicy) -> Result<Self, PageFetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("outreach-api/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, retry })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, PageFetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PageFetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl ContactPageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<String, PageFetchError> {
        self.retry.run("contact page fetch", || self.fetch_once(url)).await
    }
}

/// Scans the well-known pages of `domain` and returns the addresses on the
/// first page that lists any at that domain.
pub async fn scan_website(fetcher: &dyn ContactPageFetcher, domain: &str) -> Vec<String> {
    for path in CONTACT_PATHS {
        let url = format!("https://{domain}{path}");
        match fetcher.fetch(&url).await {
            Ok(body) => {
                let found = extract_domain_emails(&body, domain);
                if !found.is_empty() {
                    debug!(%url, count = found.len(), "addresses found on company site");
                    return found;
                }
            }
            Err(e) => debug!(%url, error = %e, "contact page unavailable"),
        }
    }
    Vec::new()
}

/// Addresses at `domain` (or a subdomain) appearing in the page's visible text
/// or its `mailto:` links. Lowercased, first occurrence order.
pub fn extract_domain_emails(html: &str, domain: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut found: Vec<String> = Vec::new();
    let mut keep = |candidate: &str| {
        let address = candidate.trim().trim_end_matches('.').to_lowercase();
        if email_matches_domain(&address, domain) && !found.contains(&address) {
            found.push(address);
        }
    };

    let mut visible = String::new();
    for node in document.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element().map(|el| el.name().to_string()))
            .is_some_and(|name| HIDDEN_ELEMENTS.contains(&name.as_str()));
        if !hidden {
            visible.push_str(text);
            visible.push(' ');
        }
    }
    for m in EMAIL.find_iter(&visible) {
        keep(m.as_str());
    }

    for link in document.select(&MAILTO_LINKS) {
        if let Some(href) = link.value().attr("href") {
            let target = href
                .strip_prefix("mailto:")
                .unwrap_or(href)
                .split('?')
                .next()
                .unwrap_or_default();
            for address in target.split(',') {
                keep(address);
            }
        }
    }

    found
}
