use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use super::mime::build_message;
use super::{MailError, MailTransport, OutgoingEmail};

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

/// Sends through the Gmail REST API with a bearer token obtained elsewhere.
pub struct GmailTransport {
    client: Client,
    access_token: String,
    endpoint: String,
}

impl GmailTransport {
    pub fn new(access_token: impl Into<String>) -> Result<Self, MailError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            access_token: access_token.into(),
            endpoint: GMAIL_SEND_URL.to_string(),
        })
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let boundary = format!("=_{}", Uuid::new_v4().simple());
        let message = build_message(email, &boundary)?;
        let raw = URL_SAFE.encode(message.as_bytes());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&json!({ "raw": raw }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(to = %email.to, %status, "mail provider rejected message");
            return Err(MailError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(to = %email.to, "application email sent");
        Ok(())
    }
}
