/// Domain guess prompt. Placeholder: {company}.
pub const DOMAIN_GUESS_PROMPT: &str = "Extract the company website domain from: {company}

Return ONLY the domain in the format example.com
- No https:// or www.
- If the company name contains spaces, make your best guess at the domain
- If the company is completely unknown, return: UNKNOWN

Examples:
- Google -> google.com
- Meta Platforms -> meta.com
- JPMorgan Chase -> jpmorganchase.com";

pub const DOMAIN_GUESS_SYSTEM: &str =
    "You map company names to their primary website domain. Answer with the domain only.";

/// Address proposal prompt. Placeholders: {company}, {domain}.
pub const ADDRESS_GUESS_PROMPT: &str = r#"Company: {company}
Domain: {domain}

Propose between 5 and 10 plausible email addresses at exactly this domain that
would reach the company's recruiting, HR, or hiring team. Prefer role-based
mailboxes over personal names.

Return ONLY this JSON object:
{"emails": ["<address>", "..."]}"#;
