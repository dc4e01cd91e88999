use std::sync::LazyLock;

use regex::Regex;

use crate::models::posting::{JobPosting, RawField, RawPosting};

/// Age reported when the posted-date text is missing or unreadable.
pub const UNKNOWN_AGE_DAYS: u32 = 999;

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("number regex should compile"));

static SALARY_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:,\d{3})*(?:\.\d+)?").expect("salary regex should compile")
});

/// Converts a raw scraped record into a canonical posting.
///
/// `url` is the posting reference the record was fetched from; it becomes the
/// posting's identity regardless of any URL found inside the record.
pub fn normalize(url: &str, raw: &RawPosting) -> JobPosting {
    let text = |key: &str| raw.get(key).map(flatten).unwrap_or_default();

    let posted_text = text("posted_text");
    let applicant_text = text("applicant_text");
    let salary_text = text("salary_text");
    let (salary_min, salary_max) = parse_salary_range(&salary_text);
    let external_id = Some(text("job_id")).filter(|id| !id.is_empty());

    JobPosting {
        url: url.trim().to_string(),
        external_id,
        title: text("title"),
        company: text("company"),
        location: text("location"),
        description: text("description"),
        days_posted_ago: parse_days_posted(&posted_text),
        applicant_count: parse_applicant_count(&applicant_text),
        salary_min,
        salary_max,
        posted_text,
        applicant_text,
        salary_text,
    }
}

/// Flattens one raw field to trimmed plain text. Lists contribute their first
/// element; mappings contribute their `"0"` entry or their JSON rendering.
fn flatten(field: &RawField) -> String {
    match field {
        RawField::Null => String::new(),
        RawField::Text(s) => s.trim().to_string(),
        RawField::Number(n) => n.to_string(),
        RawField::Flag(b) => b.to_string(),
        RawField::List(items) => items.first().map(flatten).unwrap_or_default(),
        RawField::Map(entries) => match entries.get("0") {
            Some(first) => flatten(first),
            None if entries.is_empty() => String::new(),
            None => serde_json::to_string(entries).unwrap_or_default(),
        },
    }
}

pub fn parse_days_posted(posted_text: &str) -> u32 {
    let text = posted_text.to_lowercase();
    if text.trim().is_empty() {
        return UNKNOWN_AGE_DAYS;
    }

    // No number means one unit ("a day ago"); an unparseable one is unknown.
    let count = |unit_days: u32| match FIRST_NUMBER.find(&text) {
        None => unit_days,
        Some(m) => m
            .as_str()
            .parse::<u32>()
            .map_or(UNKNOWN_AGE_DAYS, |n| n.saturating_mul(unit_days)),
    };

    if text.contains("hour") || text.contains("today") {
        0
    } else if text.contains("yesterday") {
        1
    } else if text.contains("day") {
        count(1)
    } else if text.contains("week") {
        count(7)
    } else if text.contains("month") {
        count(30)
    } else {
        UNKNOWN_AGE_DAYS
    }
}

pub fn parse_applicant_count(applicant_text: &str) -> u32 {
    FIRST_NUMBER
        .find(applicant_text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// First two amounts in the text become (min, max). A single amount is both.
pub fn parse_salary_range(salary_text: &str) -> (u64, u64) {
    let amounts: Vec<u64> = SALARY_AMOUNT
        .find_iter(salary_text)
        .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .map(|v| v.trunc() as u64)
        .take(2)
        .collect();

    match amounts.as_slice() {
        [min, max] => (*min, *max),
        [only] => (*only, *only),
        _ => (0, 0),
    }
}
