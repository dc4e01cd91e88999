/// Corporate suffixes dropped from the end of a company name.
const CORPORATE_SUFFIXES: &[&str] = &["inc", "llc", "corp", "ltd", "limited"];

const TLDS: &[&str] = &["com", "org", "net", "co", "io", "ai", "tech"];

const MAX_CANDIDATES: usize = 10;

/// Role-based mailbox names tried at a guessed domain.
pub const GENERIC_MAILBOXES: &[&str] = &[
    "hr",
    "careers",
    "jobs",
    "recruiting",
    "talent",
    "hiring",
    "info",
    "contact",
    "hello",
    "admin",
    "support",
];

/// Ordered list of plausible domains for a company name.
///
/// Name variants come first (full concatenation, suffix-stripped
/// concatenation, then hyphenated forms) and each is tried across the TLD
/// list before the next variant. At most ten candidates are returned.
pub fn candidate_domains(company: &str) -> Vec<String> {
    let words = name_words(company);
    if words.is_empty() {
        return Vec::new();
    }

    let stripped = strip_suffixes(&words);
    let mut bases: Vec<String> = Vec::new();
    for base in [
        words.concat(),
        stripped.concat(),
        words.join("-"),
        stripped.join("-"),
    ] {
        if !base.is_empty() && !bases.contains(&base) {
            bases.push(base);
        }
    }

    let mut candidates = Vec::new();
    for tld in TLDS {
        for base in &bases {
            let domain = format!("{base}.{tld}");
            if !candidates.contains(&domain) {
                candidates.push(domain);
            }
            if candidates.len() == MAX_CANDIDATES {
                return candidates;
            }
        }
    }
    candidates
}

/// Generic role addresses at `domain`, in fixed order.
pub fn generic_addresses(domain: &str) -> Vec<String> {
    GENERIC_MAILBOXES
        .iter()
        .map(|mailbox| format!("{mailbox}@{domain}"))
        .collect()
}

/// True when the address's host is `domain` or one of its subdomains.
pub fn email_matches_domain(email: &str, domain: &str) -> bool {
    let Some((local, host)) = email.trim().rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() {
        return false;
    }
    let host = host.to_lowercase();
    let domain = domain.to_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Cleans a free-form domain answer: scheme, `www.`, and any path are removed.
/// Returns `None` for empty or `UNKNOWN` answers.
pub fn clean_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_matches(|c| c == '`' || c == '"' || c == '\'');
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let host = without_www
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches('.')
        .to_lowercase();

    if host.is_empty() || host.eq_ignore_ascii_case("unknown") || !host.contains('.') {
        None
    } else {
        Some(host)
    }
}

fn name_words(company: &str) -> Vec<String> {
    let lowered = company
        .to_lowercase()
        .replace('&', " and ")
        .replace('+', " plus ");
    lowered
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

fn strip_suffixes(words: &[String]) -> Vec<String> {
    let mut end = words.len();
    while end > 0 && CORPORATE_SUFFIXES.contains(&words[end - 1].as_str()) {
        end -= 1;
    }
    if end == 0 {
        words.to_vec()
    } else {
        words[..end].to_vec()
    }
}
