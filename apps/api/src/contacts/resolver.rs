use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::domains::{candidate_domains, clean_domain, email_matches_domain, generic_addresses};
use super::enrichment::EmailEnrichment;
use super::prompts::{ADDRESS_GUESS_PROMPT, DOMAIN_GUESS_PROMPT, DOMAIN_GUESS_SYSTEM};
use super::website::{scan_website, ContactPageFetcher};
use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{complete_json, LanguageModel};

const MAX_MODEL_ADDRESSES: usize = 10;

/// Which strategy produced a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactSource {
    EnrichmentCompany,
    EnrichmentDomain,
    GenericPattern,
    Website,
    ModelGuess,
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDirectory {
    pub domain: String,
    pub emails: Vec<String>,
    pub source: ContactSource,
}

impl ContactDirectory {
    pub fn empty() -> Self {
        Self {
            domain: String::new(),
            emails: Vec::new(),
            source: ContactSource::Exhausted,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    fn found(domain: &str, emails: Vec<String>, source: ContactSource) -> Option<Self> {
        let mut unique: Vec<String> = Vec::with_capacity(emails.len());
        for email in emails {
            let email = email.trim().to_lowercase();
            if !email.is_empty() && !unique.contains(&email) {
                unique.push(email);
            }
        }
        if unique.is_empty() {
            return None;
        }
        Some(Self {
            domain: domain.to_string(),
            emails: unique,
            source,
        })
    }
}

/// Finds recruiting addresses for a company. Never fails; an empty directory
/// means nothing was found.
#[async_trait]
pub trait ContactFinder: Send + Sync {
    async fn resolve(&self, company: &str) -> ContactDirectory;
}

#[derive(Debug, Deserialize)]
struct AddressProposal {
    #[serde(default)]
    emails: Vec<String>,
}

/// The layered resolver. Credentials live inside the collaborators it is
/// built with; the model is optional.
pub struct ContactResolver {
    enrichment: Arc<dyn EmailEnrichment>,
    pages: Arc<dyn ContactPageFetcher>,
    model: Option<Arc<dyn LanguageModel>>,
    generic_fallback: bool,
}

impl ContactResolver {
    pub fn new(
        enrichment: Arc<dyn EmailEnrichment>,
        pages: Arc<dyn ContactPageFetcher>,
        model: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            enrichment,
            pages,
            model,
            generic_fallback: true,
        }
    }

    /// When disabled, guessed domains go straight from the enrichment lookup
    /// to the website scan instead of stopping at generic role addresses.
    pub fn with_generic_fallback(mut self, enabled: bool) -> Self {
        self.generic_fallback = enabled;
        self
    }

    async fn by_company(&self, company: &str) -> Option<ContactDirectory> {
        let found = match self.enrichment.search_company(company).await {
            Ok(found) => found,
            Err(e) => {
                warn!(company, error = %e, "enrichment company search failed");
                return None;
            }
        };

        let domain = if found.domain.is_empty() {
            found
                .emails
                .first()
                .and_then(|e| e.rsplit_once('@'))
                .map(|(_, host)| host.to_lowercase())
                .unwrap_or_default()
        } else {
            found.domain
        };
        ContactDirectory::found(&domain, found.emails, ContactSource::EnrichmentCompany)
    }

    async fn by_candidate(&self, domain: &str) -> Option<ContactDirectory> {
        match self.enrichment.search_domain(domain).await {
            Ok(emails) => {
                if let Some(dir) =
                    ContactDirectory::found(domain, emails, ContactSource::EnrichmentDomain)
                {
                    return Some(dir);
                }
            }
            Err(e) => warn!(domain, error = %e, "enrichment domain search failed"),
        }

        if self.generic_fallback {
            return ContactDirectory::found(
                domain,
                generic_addresses(domain),
                ContactSource::GenericPattern,
            );
        }

        let scraped = scan_website(self.pages.as_ref(), domain).await;
        ContactDirectory::found(domain, scraped, ContactSource::Website)
    }

    async fn by_model(
        &self,
        model: &dyn LanguageModel,
        company: &str,
        candidates: &[String],
    ) -> Option<ContactDirectory> {
        let domain = match self.guess_domain(model, company).await {
            Some(domain) => domain,
            None => candidates.first()?.clone(),
        };

        let prompt = ADDRESS_GUESS_PROMPT
            .replace("{company}", company)
            .replace("{domain}", &domain);
        let proposal: AddressProposal = match complete_json(model, &prompt, JSON_ONLY_SYSTEM).await
        {
            Ok(p) => p,
            Err(e) => {
                warn!(company, error = %e, "model address proposal failed");
                return None;
            }
        };

        let emails: Vec<String> = proposal
            .emails
            .into_iter()
            .filter(|e| email_matches_domain(e, &domain))
            .take(MAX_MODEL_ADDRESSES)
            .collect();
        ContactDirectory::found(&domain, emails, ContactSource::ModelGuess)
    }

    async fn guess_domain(&self, model: &dyn LanguageModel, company: &str) -> Option<String> {
        let prompt = DOMAIN_GUESS_PROMPT.replace("{company}", company);
        match model.complete(&prompt, DOMAIN_GUESS_SYSTEM).await {
            Ok(answer) => clean_domain(&answer),
            Err(e) => {
                debug!(company, error = %e, "model domain guess failed");
                None
            }
        }
    }
}

#[async_trait]
impl ContactFinder for ContactResolver {
    async fn resolve(&self, company: &str) -> ContactDirectory {
        let company = company.trim();
        if company.is_empty() {
            return ContactDirectory::empty();
        }

        if let Some(dir) = self.by_company(company).await {
            info!(company, domain = %dir.domain, count = dir.emails.len(), "contacts from enrichment");
            return dir;
        }

        let candidates = candidate_domains(company);
        for domain in &candidates {
            if let Some(dir) = self.by_candidate(domain).await {
                info!(company, %domain, source = ?dir.source, count = dir.emails.len(), "contacts from guessed domain");
                return dir;
            }
        }

        if let Some(model) = &self.model {
            if let Some(dir) = self.by_model(model.as_ref(), company, &candidates).await {
                info!(company, domain = %dir.domain, count = dir.emails.len(), "contacts from model guess");
                return dir;
            }
        }

        info!(company, "no contacts found");
        ContactDirectory::empty()
    }
}
