//! Outbound mail. The pipeline only sees `MailTransport`; the Gmail REST
//! transport is the production implementation.

pub mod gmail;
pub mod mime;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use gmail::GmailTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderIdentity {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub attachment: Option<Attachment>,
    pub sender: SenderIdentity,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail provider rejected the message (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

/// Subject line used for every application email.
pub fn application_subject(title: &str, company: &str) -> String {
    format!("Application for {title} at {company}")
}
