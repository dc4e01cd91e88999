use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, COOKIE};
use reqwest::{Client, StatusCode};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{JobScraper, ScrapeError};
use crate::models::posting::RawPosting;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const POSTING_PATH: &str = "/jobs/view/";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector should parse")
}

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter().map(|css| selector(css)).collect()
}

/// Result-card selectors, narrowest first.
static CARD_LINKS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        r#"ul.jobs-search__results-list li div a[class*="base-card"]"#,
        r#"ul.jobs-search__results-list li a[href*="/jobs/view/"]"#,
        r#"div[data-job-id] a[href*="/jobs/view/"]"#,
        r#"div[class*="job-card"] a"#,
    ])
});
static ANY_LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static LD_JSON: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"script[type="application/ld+json"]"#));

static CANONICAL: LazyLock<Selector> = LazyLock::new(|| selector(r#"link[rel="canonical"]"#));
static LNKD_URL: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="lnkd:url"]"#));
static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static PAGE_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static TITLE: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        r#"h1[data-test-id="job-details__job-title"]"#,
        "h1.top-card-layout__title",
        "h1.topcard__title",
    ])
});
static COMPANY: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "a.topcard__org-name-link",
        "a.top-card-layout__company-url",
        ".top-card-layout__entity-info .topcard__flavor a",
        ".topcard__org-name-link",
        r#"a[data-tracking-control-name="public_jobs_topcard-org-name"]"#,
    ])
});
static LOCATION: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        ".top-card-layout__entity-info .topcard__flavor--bullet",
        ".jobs-unified-top-card__bullet",
        ".topcard__flavor--bullet",
        r#"span[data-test-id="job-details__location"]"#,
    ])
});
static POSTED: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "span.jobs-unified-top-card__posted-date",
        ".posted-time-ago__text",
        ".topcard__flavor--metadata",
        "time",
    ])
});
static DESCRIPTION: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "div.show-more-less-html__markup",
        "div.jobs-description__content",
        "section.jobs-description-content__text",
    ])
});
static APPLICANTS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[
        "span.num-applicants__caption",
        "figcaption.num-applicants__caption",
    ])
});
static SALARY: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    selectors(&[r#"div[class*="salary"] span"#, "div.compensation__salary"])
});

static POSTING_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/jobs/view/(?:[^/?#]*-)?(\d+)").expect("posting id regex should compile")
});

/// Scraper for LinkedIn's public job search and posting pages.
pub struct LinkedInScraper {
    client: Client,
}

impl LinkedInScraper {
    pub fn new() -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    async fn get_page(&self, url: &str, session: Option<&str>) -> Result<String, ScrapeError> {
        let mut request = self.client.get(url);
        if let Some(cookie) = session.filter(|c| !c.is_empty()) {
            if let Ok(value) = HeaderValue::from_str(&format!("li_at={cookie}")) {
                request = request.header(COOKIE, value);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ScrapeError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let final_url = response.url().as_str().to_lowercase();
        if final_url.contains("/login") || final_url.contains("checkpoint/challenge") {
            return Err(ScrapeError::Blocked {
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl JobScraper for LinkedInScraper {
    async fn list_posting_refs(
        &self,
        search_target: &str,
        session: Option<&str>,
    ) -> Result<Vec<String>, ScrapeError> {
        let html = self.get_page(search_target, session).await?;
        if html.len() < 1000 {
            warn!(len = html.len(), "search page is unusually short");
        }
        let refs = parse_posting_refs(&html, search_target);
        info!(count = refs.len(), "posting references found");
        Ok(refs)
    }

    async fn fetch_posting_detail(
        &self,
        url: &str,
        session: Option<&str>,
    ) -> Result<RawPosting, ScrapeError> {
        let html = self.get_page(url, session).await?;
        Ok(parse_posting_detail(&html, url))
    }
}

/// Posting URLs on a search page. Result cards are tried first, then every
/// link on the page, then JSON-LD item lists.
pub fn parse_posting_refs(html: &str, base: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let base = Url::parse(base).ok();
    let mut refs = Vec::new();

    for card in CARD_LINKS.iter() {
        for link in document.select(card) {
            if let Some(href) = link.value().attr("href") {
                push_ref(&mut refs, href, base.as_ref());
            }
        }
        if !refs.is_empty() {
            return refs;
        }
    }

    for link in document.select(&ANY_LINK) {
        if let Some(href) = link.value().attr("href") {
            push_ref(&mut refs, href, base.as_ref());
        }
    }
    if !refs.is_empty() {
        debug!("posting references recovered from full link scan");
        return refs;
    }

    for script in document.select(&LD_JSON) {
        let body = script.text().collect::<String>();
        let Ok(data) = serde_json::from_str::<Value>(&body) else {
            continue;
        };
        if let Some(items) = data.get("itemListElement").and_then(Value::as_array) {
            for item in items {
                if let Some(url) = item.get("url").and_then(Value::as_str) {
                    push_ref(&mut refs, url, base.as_ref());
                }
            }
        }
    }
    refs
}

fn push_ref(refs: &mut Vec<String>, href: &str, base: Option<&Url>) {
    if !href.contains(POSTING_PATH) {
        return;
    }
    let absolute = match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    };
    let clean = absolute
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_string();
    if !clean.is_empty() && !refs.contains(&clean) {
        refs.push(clean);
    }
}

/// Raw fields of a single posting page. Missing fields are simply absent.
pub fn parse_posting_detail(html: &str, url: &str) -> RawPosting {
    let document = Html::parse_document(html);
    let mut raw = RawPosting::new().with("job_url", url);

    let canonical = document
        .select(&CANONICAL)
        .next()
        .and_then(|el| attr(el, "href"))
        .or_else(|| document.select(&LNKD_URL).next().and_then(|el| attr(el, "content")));
    let id_source = canonical.as_deref().unwrap_or(url);
    if let Some(id) = POSTING_ID.captures(id_source).and_then(|c| c.get(1)) {
        raw.set("job_id", id.as_str());
    }
    if let Some(canonical) = canonical {
        raw.set("canonical_url", canonical);
    }

    let title = first_text(&document, &TITLE)
        .or_else(|| document.select(&OG_TITLE).next().and_then(|el| attr(el, "content")))
        .or_else(|| document.select(&PAGE_TITLE).next().and_then(element_text));
    let fields = [
        ("title", title),
        ("company", first_text(&document, &COMPANY)),
        ("location", first_text(&document, &LOCATION)),
        ("posted_text", first_text(&document, &POSTED)),
        ("description", first_text(&document, &DESCRIPTION)),
        ("applicant_text", first_text(&document, &APPLICANTS)),
        ("salary_text", first_text(&document, &SALARY)),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            raw.set(key, value);
        }
    }
    raw
}

fn first_text(document: &Html, candidates: &[Selector]) -> Option<String> {
    candidates
        .iter()
        .find_map(|sel| document.select(sel).find_map(element_text))
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn attr(element: ElementRef<'_>, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
