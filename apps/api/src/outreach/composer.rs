use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::prompts::{ATTACHED_RESUME_NOTICE, CLOSING_NOTICE, COVER_LETTER_PROMPT_TEMPLATE};
use crate::llm_client::prompts::{fill_placeholders, HTML_PROSE_SYSTEM};
use crate::llm_client::LanguageModel;
use crate::models::posting::JobPosting;
use crate::scoring::ScoreResult;

/// HTML cover letter. `fallback` is set when the model could not produce a
/// letter and `html` holds only an error notice; such letters are never sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverLetter {
    pub html: String,
    pub fallback: bool,
}

#[async_trait]
pub trait LetterComposer: Send + Sync {
    async fn compose(
        &self,
        posting: &JobPosting,
        resume_text: &str,
        score: &ScoreResult,
    ) -> CoverLetter;
}

pub struct LlmLetterComposer {
    model: Arc<dyn LanguageModel>,
    attach_resume: bool,
    custom_template: Option<String>,
}

impl LlmLetterComposer {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        attach_resume: bool,
        custom_template: Option<String>,
    ) -> Self {
        let custom_template = custom_template.filter(|t| !t.trim().is_empty());
        Self {
            model,
            attach_resume,
            custom_template,
        }
    }
}

#[async_trait]
impl LetterComposer for LlmLetterComposer {
    async fn compose(
        &self,
        posting: &JobPosting,
        resume_text: &str,
        score: &ScoreResult,
    ) -> CoverLetter {
        let template = self
            .custom_template
            .as_deref()
            .unwrap_or(COVER_LETTER_PROMPT_TEMPLATE);
        let prompt = render_template(template, posting, resume_text, score);

        match self.model.complete(&prompt, HTML_PROSE_SYSTEM).await {
            Ok(text) => CoverLetter {
                html: finish_letter(&text, self.attach_resume),
                fallback: false,
            },
            Err(e) => {
                warn!(company = %posting.company, error = %e, "cover letter generation failed");
                CoverLetter {
                    html: format!("<p>Error generating cover letter: {e}</p>"),
                    fallback: true,
                }
            }
        }
    }
}

/// Fills the named placeholders of a letter template. Unknown placeholders are
/// left as written.
pub fn render_template(
    template: &str,
    posting: &JobPosting,
    resume_text: &str,
    score: &ScoreResult,
) -> String {
    let or_na = |v: &str| if v.is_empty() { "N/A".to_string() } else { v.to_string() };
    let score_text = score.score.to_string();
    let key_matches = score.key_matches.join(", ");
    let missing_skills = score.missing_skills.join(", ");
    let title = or_na(&posting.title);
    let company = or_na(&posting.company);
    let location = or_na(&posting.location);
    let description = or_na(&posting.description);
    fill_placeholders(
        template,
        &[
            ("{job_title}", title.as_str()),
            ("{company}", company.as_str()),
            ("{location}", location.as_str()),
            ("{score}", score_text.as_str()),
            ("{key_matches}", key_matches.as_str()),
            ("{missing_skills}", missing_skills.as_str()),
            ("{reasoning}", score.reasoning.as_str()),
            ("{description}", description.as_str()),
            ("{resume}", resume_text),
        ],
    )
}

/// Wraps plain-text paragraphs in `<p>` tags and appends the closing notice.
pub fn finish_letter(text: &str, attach_resume: bool) -> String {
    let text = text.trim();
    let mut html = if text.starts_with('<') {
        text.to_string()
    } else {
        text.split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{p}</p>"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    html.push_str(if attach_resume {
        ATTACHED_RESUME_NOTICE
    } else {
        CLOSING_NOTICE
    });
    html
}
