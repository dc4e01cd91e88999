//! Wires one user's settings into a ready-to-run pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::orchestrator::{Pipeline, PipelineError, PipelineSettings};
use crate::config::Config;
use crate::contacts::{ContactResolver, HttpPageFetcher, HunterClient};
use crate::ledger::Ledger;
use crate::listings::LinkedInScraper;
use crate::llm_client::{LanguageModel, LlmClient};
use crate::mail::{GmailTransport, SenderIdentity};
use crate::outreach::LlmLetterComposer;
use crate::resume::{FileResumeSource, ResumeMaterial};
use crate::retry::RetryPolicy;
use crate::scoring::LlmRelevanceScorer;
use crate::settings::UserSettings;

/// Everything a run task needs, built before the first posting is touched.
pub struct PreparedRun {
    pub pipeline: Pipeline,
    pub ledger: Ledger,
    pub resume: ResumeMaterial,
    pub search_target: String,
}

#[async_trait]
pub trait RunFactory: Send + Sync {
    async fn prepare(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> Result<PreparedRun, PipelineError>;
}

/// Builds runs against the real listing site, model API, enrichment API and
/// mail provider.
pub struct ServiceRunFactory {
    config: Config,
}

impl ServiceRunFactory {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

fn require<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, PipelineError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PipelineError::MissingPrecondition(format!("no {what} configured")))
}

/// Merges service-wide knobs with one user's thresholds.
pub fn pipeline_settings(
    config: &Config,
    settings: &UserSettings,
) -> Result<PipelineSettings, PipelineError> {
    let sender_email = require(&settings.sender_email, "sender email")?.to_string();
    let sender_name = settings
        .sender_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| sender_email.clone());

    Ok(PipelineSettings {
        quality: settings.quality_config(),
        min_relevance_score: settings.relevance_threshold(),
        sender: SenderIdentity {
            name: sender_name,
            email: sender_email,
        },
        max_recipients: config.max_recipients_per_job,
        batch_size: config.run_batch_size,
        inter_application_delay: config.inter_application_delay,
        rate_limit_backoff: config.rate_limit_backoff,
        reprocess: settings.reprocess_policy.0,
        session: settings
            .listing_session_cookie
            .clone()
            .filter(|s| !s.trim().is_empty()),
    })
}

#[async_trait]
impl RunFactory for ServiceRunFactory {
    async fn prepare(
        &self,
        user_id: Uuid,
        settings: &UserSettings,
    ) -> Result<PreparedRun, PipelineError> {
        let model_key = require(&settings.model_api_key, "language model API key")?;
        let enrichment_key = require(&settings.enrichment_api_key, "enrichment API key")?;
        let mail_token = require(&settings.mail_access_token, "mail access token")?;
        let search_target = require(&settings.listing_search_url, "listing search URL")?;
        let resume_path = require(&settings.resume_text_path, "resume")?;
        let pipeline_settings = pipeline_settings(&self.config, settings)?;

        let source = FileResumeSource::new(
            resume_path,
            settings.resume_pdf_path.as_ref().map(PathBuf::from),
        );
        let resume = ResumeMaterial::load(&source, settings.attach_resume).await?;

        let model: Arc<dyn LanguageModel> = Arc::new(
            LlmClient::new(model_key.to_string()).map_err(|e| PipelineError::Setup(e.to_string()))?,
        );
        let enrichment = HunterClient::new(
            self.config.enrichment_api_url.clone(),
            enrichment_key,
            RetryPolicy::default(),
        )
        .map_err(|e| PipelineError::Setup(e.to_string()))?;
        let pages = HttpPageFetcher::new(RetryPolicy::default())
            .map_err(|e| PipelineError::Setup(e.to_string()))?;
        let scraper = LinkedInScraper::new().map_err(|e| PipelineError::Setup(e.to_string()))?;
        let mailer =
            GmailTransport::new(mail_token).map_err(|e| PipelineError::Setup(e.to_string()))?;

        let pipeline = Pipeline::new(
            Arc::new(scraper),
            Arc::new(LlmRelevanceScorer::new(
                model.clone(),
                settings.relevance_threshold(),
            )),
            Arc::new(
                ContactResolver::new(Arc::new(enrichment), Arc::new(pages), Some(model.clone()))
                    .with_generic_fallback(self.config.generic_contact_fallback),
            ),
            Arc::new(LlmLetterComposer::new(
                model,
                resume.attachment.is_some(),
                settings.custom_prompt.clone(),
            )),
            Arc::new(mailer),
            pipeline_settings,
        );

        let ledger = Ledger::open(&self.config.ledger_path(user_id)).await?;

        Ok(PreparedRun {
            pipeline,
            ledger,
            resume,
            search_target: search_target.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ReprocessPolicy;
    use sqlx::types::Json;

    fn complete_settings(user_id: Uuid, resume: &std::path::Path) -> UserSettings {
        let mut settings = UserSettings::defaults(user_id);
        settings.model_api_key = Some("model-key".to_string());
        settings.enrichment_api_key = Some("enrichment-key".to_string());
        settings.mail_access_token = Some("mail-token".to_string());
        settings.sender_email = Some("sam@example.com".to_string());
        settings.listing_search_url = Some("https://www.linkedin.com/jobs/search?keywords=rust".to_string());
        settings.resume_text_path = Some(resume.display().to_string());
        settings.attach_resume = false;
        settings
    }

    #[tokio::test]
    async fn test_missing_model_key_is_a_precondition_failure() {
        let factory = ServiceRunFactory::new(Config::default());
        let user = Uuid::new_v4();
        let settings = UserSettings::defaults(user);

        let result = factory.prepare(user, &settings).await;
        match result {
            Err(PipelineError::MissingPrecondition(msg)) => {
                assert_eq!(msg, "no language model API key configured")
            }
            _ => panic!("expected a missing precondition"),
        }
    }

    #[tokio::test]
    async fn test_missing_resume_file_fails_before_any_posting() {
        let dir = tempfile::tempdir().unwrap();
        let factory = ServiceRunFactory::new(Config {
            data_dir: dir.path().to_path_buf(),
            ..Config::default()
        });
        let user = Uuid::new_v4();
        let settings = complete_settings(user, &dir.path().join("absent.txt"));

        let result = factory.prepare(user, &settings).await;
        assert!(matches!(result, Err(PipelineError::Resume(_))));
    }

    #[tokio::test]
    async fn test_prepare_opens_the_user_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let resume_path = dir.path().join("resume.txt");
        tokio::fs::write(&resume_path, "Rust engineer").await.unwrap();
        let config = Config {
            data_dir: dir.path().join("ledgers"),
            ..Config::default()
        };
        let factory = ServiceRunFactory::new(config.clone());
        let user = Uuid::new_v4();

        let prepared = factory
            .prepare(user, &complete_settings(user, &resume_path))
            .await
            .unwrap();

        assert_eq!(prepared.resume.text, "Rust engineer");
        assert!(prepared.search_target.contains("keywords=rust"));
        assert!(config.ledger_path(user).exists());
    }

    #[test]
    fn test_pipeline_settings_merge_config_and_user_values() {
        let user = Uuid::new_v4();
        let mut settings = UserSettings::defaults(user);
        settings.sender_email = Some("sam@example.com".to_string());
        settings.min_relevance_score = 75;
        settings.listing_session_cookie = Some("  ".to_string());
        settings.reprocess_policy = Json(ReprocessPolicy::Never);

        let merged = pipeline_settings(&Config::default(), &settings).unwrap();

        assert_eq!(merged.min_relevance_score, 75);
        assert_eq!(merged.sender.name, "sam@example.com");
        assert_eq!(merged.batch_size, 10);
        assert_eq!(merged.max_recipients, 5);
        assert_eq!(merged.reprocess, ReprocessPolicy::Never);
        assert!(merged.session.is_none());
    }
}
