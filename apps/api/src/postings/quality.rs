use serde::{Deserialize, Serialize};

use crate::models::posting::JobPosting;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    pub max_days_posted: u32,
    pub max_applicants: u32,
    pub min_description_length: usize,
    pub excluded_companies: Vec<String>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            max_days_posted: 14,
            max_applicants: 500,
            min_description_length: 50,
            excluded_companies: Vec::new(),
        }
    }
}

/// Outcome of the quality gate. `reasons` is empty iff `passed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityVerdict {
    pub passed: bool,
    pub reasons: Vec<String>,
}

impl QualityVerdict {
    /// Reasons joined the way they are stored in the ledger.
    pub fn summary(&self) -> String {
        self.reasons.join(", ")
    }
}

/// Applies every rule and collects all failure reasons, in rule order.
pub fn passes_quality(posting: &JobPosting, config: &QualityConfig) -> QualityVerdict {
    let mut reasons = Vec::new();

    if posting.title.is_empty() {
        reasons.push("Missing title".to_string());
    }
    if posting.company.is_empty() {
        reasons.push("Missing company".to_string());
    }
    if posting.description.chars().count() < config.min_description_length {
        reasons.push("Insufficient description".to_string());
    }
    if posting.days_posted_ago > config.max_days_posted {
        reasons.push(format!(
            "Posted {} days ago (>{} days)",
            posting.days_posted_ago, config.max_days_posted
        ));
    }
    if posting.applicant_count > config.max_applicants {
        reasons.push(format!(
            "{} applicants (>{})",
            posting.applicant_count, config.max_applicants
        ));
    }

    let company = posting.company.to_lowercase();
    for excluded in &config.excluded_companies {
        let needle = excluded.trim();
        if !needle.is_empty() && company.contains(&needle.to_lowercase()) {
            reasons.push(format!("Excluded company: {needle}"));
        }
    }

    QualityVerdict {
        passed: reasons.is_empty(),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_posting() -> JobPosting {
        JobPosting {
            url: "https://jobs.example.com/view/1".to_string(),
            title: "Platform Engineer".to_string(),
            company: "Acme".to_string(),
            description: "x".repeat(200),
            days_posted_ago: 3,
            applicant_count: 40,
            ..Default::default()
        }
    }

    #[test]
    fn test_good_posting_passes() {
        let verdict = passes_quality(&good_posting(), &QualityConfig::default());
        assert!(verdict.passed);
        assert!(verdict.reasons.is_empty());
    }

    #[test]
    fn test_stale_posting_reason() {
        let posting = JobPosting {
            days_posted_ago: 20,
            ..good_posting()
        };
        let verdict = passes_quality(&posting, &QualityConfig::default());
        assert!(!verdict.passed);
        assert_eq!(verdict.reasons, vec!["Posted 20 days ago (>14 days)"]);
    }

    #[test]
    fn test_all_reasons_collected_in_order() {
        let posting = JobPosting {
            url: "https://jobs.example.com/view/2".to_string(),
            company: "MegaCorp Staffing".to_string(),
            description: "short".to_string(),
            days_posted_ago: 999,
            applicant_count: 900,
            ..Default::default()
        };
        let config = QualityConfig {
            excluded_companies: vec!["megacorp".to_string(), "".to_string()],
            ..QualityConfig::default()
        };
        let verdict = passes_quality(&posting, &config);
        assert_eq!(
            verdict.reasons,
            vec![
                "Missing title",
                "Insufficient description",
                "Posted 999 days ago (>14 days)",
                "900 applicants (>500)",
                "Excluded company: megacorp",
            ]
        );
        assert!(verdict.summary().starts_with("Missing title, Insufficient"));
    }

    #[test]
    fn test_description_length_counts_characters() {
        let posting = JobPosting {
            description: "é".repeat(50),
            ..good_posting()
        };
        assert!(passes_quality(&posting, &QualityConfig::default()).passed);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let posting = JobPosting {
            days_posted_ago: 14,
            applicant_count: 500,
            ..good_posting()
        };
        assert!(passes_quality(&posting, &QualityConfig::default()).passed);
    }
}
