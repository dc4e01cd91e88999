// Cross-cutting prompt fragments. Each stage that talks to the model keeps
// its own prompts.rs next to it.

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for prose generation where HTML output is expected.
pub const HTML_PROSE_SYSTEM: &str = "You are a concise professional writer. \
    Respond with the requested text only. \
    Do NOT add a subject line, greeting placeholder, or commentary about the text.";

/// Fills `{name}` placeholders in one left-to-right pass. Substituted values
/// are never rescanned and unknown placeholders are left as written.
pub fn fill_placeholders(template: &str, fields: &[(&str, &str)]) -> String {
    let extra: usize = fields.iter().map(|(_, value)| value.len()).sum();
    let mut out = String::with_capacity(template.len() + extra);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match fields.iter().find(|(name, _)| tail.starts_with(name)) {
            Some((name, value)) => {
                out.push_str(value);
                rest = &tail[name.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
