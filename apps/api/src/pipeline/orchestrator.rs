//! Drives one run: list posting references, then take each posting through
//! dedup, scrape, normalize, quality, score, contacts, letter, and send.
//!
//! Postings are handled strictly one after another. The stop signal is read
//! once per posting boundary. Anything that goes wrong with a single posting
//! becomes a skip; only ledger faults and a failed listing end the run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::progress::ProgressReporter;
use super::stop::StopSignal;
use crate::contacts::ContactFinder;
use crate::ledger::{Ledger, LedgerError};
use crate::listings::{JobScraper, ScrapeError};
use crate::mail::{application_subject, MailTransport, OutgoingEmail, SenderIdentity};
use crate::models::application::{ApplicationStatus, EmailAttempt, SkipType};
use crate::models::posting::{JobPosting, PostingKey};
use crate::models::run::RunCounters;
use crate::outreach::LetterComposer;
use crate::postings::{normalize, passes_quality, QualityConfig};
use crate::resume::{ResumeError, ResumeMaterial};
use crate::scoring::RelevanceScorer;
use crate::settings::ReprocessPolicy;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot start run: {0}")]
    MissingPrecondition(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("could not list postings: {0}")]
    Listing(#[source] ScrapeError),

    #[error("resume unavailable: {0}")]
    Resume(#[from] ResumeError),

    #[error("could not build run collaborators: {0}")]
    Setup(String),

    #[error("run store error: {0}")]
    RunStore(#[from] sqlx::Error),
}

/// Per-run knobs, assembled from service config and the user's settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub quality: QualityConfig,
    pub min_relevance_score: u8,
    pub sender: SenderIdentity,
    pub max_recipients: usize,
    pub batch_size: usize,
    pub inter_application_delay: Duration,
    pub rate_limit_backoff: Duration,
    pub reprocess: ReprocessPolicy,
    pub session: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stopped,
}

/// How a posting that reached the evaluation stages ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Applied,
    Skipped,
}

pub struct Pipeline {
    scraper: Arc<dyn JobScraper>,
    scorer: Arc<dyn RelevanceScorer>,
    contacts: Arc<dyn ContactFinder>,
    composer: Arc<dyn LetterComposer>,
    mailer: Arc<dyn MailTransport>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        scraper: Arc<dyn JobScraper>,
        scorer: Arc<dyn RelevanceScorer>,
        contacts: Arc<dyn ContactFinder>,
        composer: Arc<dyn LetterComposer>,
        mailer: Arc<dyn MailTransport>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            scraper,
            scorer,
            contacts,
            composer,
            mailer,
            settings,
        }
    }

    /// Runs one batch. `counters` is updated in place so the caller keeps
    /// accurate totals even when this returns an error.
    pub async fn run(
        &self,
        ledger: &Ledger,
        resume: &ResumeMaterial,
        search_target: &str,
        stop: &dyn StopSignal,
        progress: &dyn ProgressReporter,
        counters: &mut RunCounters,
    ) -> Result<RunOutcome, PipelineError> {
        let refs = self
            .scraper
            .list_posting_refs(search_target, self.settings.session.as_deref())
            .await
            .map_err(PipelineError::Listing)?;

        let batch: Vec<String> = refs.into_iter().take(self.settings.batch_size).collect();
        info!("Processing {} posting(s)", batch.len());

        for url in batch {
            if stop.is_stop_requested() {
                info!("Stop requested, ending run");
                return Ok(RunOutcome::Stopped);
            }

            self.process_posting(ledger, resume, &url, counters)
                .instrument(info_span!("posting", url = %url))
                .await?;
            progress.report(counters);
        }

        info!(
            processed = counters.jobs_processed,
            sent = counters.applications_sent,
            skipped = counters.jobs_skipped,
            "Run finished"
        );
        Ok(RunOutcome::Completed)
    }

    async fn process_posting(
        &self,
        ledger: &Ledger,
        resume: &ResumeMaterial,
        url: &str,
        counters: &mut RunCounters,
    ) -> Result<(), PipelineError> {
        if ledger.is_already_applied(url).await? {
            debug!("Already applied");
            counters.jobs_skipped += 1;
            return Ok(());
        }
        if !self.should_reprocess(ledger, url).await? {
            debug!("Seen on an earlier run, reprocessing disabled");
            counters.jobs_skipped += 1;
            return Ok(());
        }

        let raw = match self
            .scraper
            .fetch_posting_detail(url, self.settings.session.as_deref())
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to fetch posting: {}", e);
                counters.jobs_skipped += 1;
                if e.is_rate_limited() {
                    tokio::time::sleep(self.settings.rate_limit_backoff).await;
                }
                return Ok(());
            }
        };

        let posting = normalize(url, &raw);
        counters.jobs_processed += 1;
        let key = ledger.upsert_posting(&posting).await?;

        let evaluated = AssertUnwindSafe(self.evaluate(ledger, resume, &posting, key))
            .catch_unwind()
            .await;

        match evaluated {
            Ok(Ok(Disposition::Applied)) => {
                counters.applications_sent += 1;
                tokio::time::sleep(self.settings.inter_application_delay).await;
            }
            Ok(Ok(Disposition::Skipped)) => counters.jobs_skipped += 1,
            Ok(Err(e)) => return Err(e.into()),
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Posting processing panicked: {}", message);
                ledger
                    .record_skip(key, &format!("Unexpected fault: {message}"), SkipType::Error)
                    .await?;
                counters.jobs_skipped += 1;
            }
        }
        Ok(())
    }

    async fn should_reprocess(&self, ledger: &Ledger, url: &str) -> Result<bool, LedgerError> {
        match self.settings.reprocess {
            ReprocessPolicy::Always => Ok(true),
            ReprocessPolicy::Never => Ok(!ledger.is_already_processed(url).await?),
            ReprocessPolicy::MaxAttempts { attempts } => {
                Ok(ledger.skip_count(url).await? < attempts)
            }
        }
    }

    async fn evaluate(
        &self,
        ledger: &Ledger,
        resume: &ResumeMaterial,
        posting: &JobPosting,
        key: PostingKey,
    ) -> Result<Disposition, LedgerError> {
        let verdict = passes_quality(posting, &self.settings.quality);
        if !verdict.passed {
            let reason = verdict.summary();
            info!("Failed quality gate: {}", reason);
            ledger.record_skip(key, &reason, SkipType::Quality).await?;
            return Ok(Disposition::Skipped);
        }

        let score = self.scorer.score(posting, &resume.text).await;
        let threshold = self.settings.min_relevance_score;
        if score.score < threshold {
            info!(score = score.score, threshold, "Below relevance threshold");
            ledger
                .record_application(key, ApplicationStatus::Skipped, &score, "", &[])
                .await?;
            let reason = format!("Relevance score {} below threshold {}", score.score, threshold);
            ledger.record_skip(key, &reason, SkipType::Score).await?;
            return Ok(Disposition::Skipped);
        }

        let directory = self.contacts.resolve(&posting.company).await;
        if directory.is_empty() {
            info!(company = %posting.company, "No contact addresses found");
            let reason = format!("No contact emails found for {}", posting.company);
            ledger.record_skip(key, &reason, SkipType::NoEmails).await?;
            return Ok(Disposition::Skipped);
        }
        debug!(source = ?directory.source, count = directory.emails.len(), "Contacts resolved");

        let letter = self.composer.compose(posting, &resume.text, &score).await;
        if letter.fallback {
            warn!("Cover letter generation failed");
            ledger
                .record_skip(key, "Cover letter generation failed", SkipType::Error)
                .await?;
            return Ok(Disposition::Skipped);
        }

        let subject = application_subject(&posting.title, &posting.company);
        let mut attempts = Vec::new();
        for recipient in directory.emails.iter().take(self.settings.max_recipients) {
            let email = OutgoingEmail {
                to: recipient.clone(),
                subject: subject.clone(),
                html_body: letter.html.clone(),
                attachment: resume.attachment.clone(),
                sender: self.settings.sender.clone(),
            };
            let success = match self.mailer.send(&email).await {
                Ok(()) => {
                    info!(recipient = %recipient, "Application sent");
                    true
                }
                Err(e) => {
                    warn!(recipient = %recipient, "Send failed: {}", e);
                    false
                }
            };
            attempts.push(EmailAttempt {
                recipient: recipient.clone(),
                success,
            });
        }

        if attempts.iter().any(|a| a.success) {
            ledger
                .record_application(key, ApplicationStatus::Applied, &score, &letter.html, &attempts)
                .await?;
            return Ok(Disposition::Applied);
        }

        ledger
            .record_application(key, ApplicationStatus::Failed, &score, &letter.html, &attempts)
            .await?;
        let reason = format!("All {} email send(s) failed", attempts.len());
        ledger.record_skip(key, &reason, SkipType::Error).await?;
        Ok(Disposition::Skipped)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Hand-written collaborators with call counters, shared with the run
    //! manager tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::contacts::resolver::{ContactDirectory, ContactSource};
    use crate::mail::MailError;
    use crate::models::posting::RawPosting;
    use crate::outreach::composer::CoverLetter;
    use crate::scoring::{Recommendation, ScoreResult};

    pub enum Detail {
        Found(RawPosting),
        RateLimited,
    }

    #[derive(Default)]
    pub struct FakeScraper {
        pub refs: Vec<String>,
        pub details: HashMap<String, Detail>,
        pub detail_calls: AtomicUsize,
    }

    impl FakeScraper {
        pub fn with_postings(postings: Vec<(&str, RawPosting)>) -> Self {
            let mut scraper = Self::default();
            for (url, raw) in postings {
                scraper.refs.push(url.to_string());
                scraper.details.insert(url.to_string(), Detail::Found(raw));
            }
            scraper
        }
    }

    #[async_trait]
    impl JobScraper for FakeScraper {
        async fn list_posting_refs(
            &self,
            _search_target: &str,
            _session: Option<&str>,
        ) -> Result<Vec<String>, ScrapeError> {
            Ok(self.refs.clone())
        }

        async fn fetch_posting_detail(
            &self,
            url: &str,
            _session: Option<&str>,
        ) -> Result<RawPosting, ScrapeError> {
            self.detail_calls.fetch_add(1, Ordering::SeqCst);
            match self.details.get(url) {
                Some(Detail::Found(raw)) => Ok(raw.clone()),
                Some(Detail::RateLimited) => Err(ScrapeError::RateLimited { url: url.to_string() }),
                _ => Err(ScrapeError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    pub struct FakeScorer {
        pub score: u8,
        pub calls: AtomicUsize,
    }

    impl FakeScorer {
        pub fn new(score: u8) -> Self {
            Self {
                score,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RelevanceScorer for FakeScorer {
        async fn score(&self, posting: &JobPosting, _resume_text: &str) -> ScoreResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if posting.company == "Panic Inc" {
                panic!("scorer blew up");
            }
            ScoreResult {
                score: self.score,
                reasoning: "Solid overlap".to_string(),
                key_matches: vec!["Rust".to_string()],
                missing_skills: vec!["Go".to_string()],
                recommendation: Recommendation::for_score(self.score, 60),
            }
        }
    }

    pub struct FakeContacts {
        pub emails: Vec<String>,
        pub calls: AtomicUsize,
    }

    impl FakeContacts {
        pub fn new(emails: &[&str]) -> Self {
            Self {
                emails: emails.iter().map(|e| e.to_string()).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ContactFinder for FakeContacts {
        async fn resolve(&self, _company: &str) -> ContactDirectory {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.emails.is_empty() {
                return ContactDirectory::empty();
            }
            ContactDirectory {
                domain: "acme.com".to_string(),
                emails: self.emails.clone(),
                source: ContactSource::EnrichmentCompany,
            }
        }
    }

    pub struct FakeComposer {
        pub fallback: bool,
        pub calls: AtomicUsize,
    }

    impl FakeComposer {
        pub fn new(fallback: bool) -> Self {
            Self {
                fallback,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LetterComposer for FakeComposer {
        async fn compose(
            &self,
            posting: &JobPosting,
            _resume_text: &str,
            _score: &ScoreResult,
        ) -> CoverLetter {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fallback {
                return CoverLetter {
                    html: "<p>Error generating cover letter: down</p>".to_string(),
                    fallback: true,
                };
            }
            CoverLetter {
                html: format!("<p>Dear {} team,</p>", posting.company),
                fallback: false,
            }
        }
    }

    #[derive(Default)]
    pub struct FakeMailer {
        pub rejecting: Vec<String>,
        pub sent: Mutex<Vec<OutgoingEmail>>,
    }

    impl FakeMailer {
        pub fn sent_to(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|e| e.to.clone()).collect()
        }
    }

    #[async_trait]
    impl MailTransport for FakeMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
            if self.rejecting.contains(&email.to) {
                return Err(MailError::Rejected {
                    status: 400,
                    message: "Invalid To header".to_string(),
                });
            }
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }
    }

    pub fn good_posting(company: &str) -> RawPosting {
        RawPosting::new()
            .with("title", "Backend Engineer")
            .with("company", company)
            .with("location", "Remote")
            .with(
                "description",
                "Build and operate Rust services that move job data between systems reliably.",
            )
            .with("posted_text", "2 days ago")
            .with("applicant_text", "40 applicants")
    }

    pub fn settings() -> PipelineSettings {
        PipelineSettings {
            quality: QualityConfig::default(),
            min_relevance_score: 60,
            sender: SenderIdentity {
                name: "Sam Doe".to_string(),
                email: "sam@example.com".to_string(),
            },
            max_recipients: 5,
            batch_size: 10,
            inter_application_delay: Duration::from_secs(2),
            rate_limit_backoff: Duration::from_secs(5),
            reprocess: ReprocessPolicy::Always,
            session: None,
        }
    }

    pub fn resume() -> ResumeMaterial {
        ResumeMaterial {
            text: "Rust engineer with eight years of backend work.".to_string(),
            attachment: None,
        }
    }
}
