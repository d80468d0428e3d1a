use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid mail relay URL '{0}'")]
    InvalidUrl(String),

    #[error("Mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail relay rejected message with status {0}")]
    Rejected(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

/// Outbound message delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

/// Writes messages to the log instead of delivering them
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, "mail (log only): {}", mail.text);
        Ok(())
    }
}

/// Posts each message as JSON to an HTTP mail relay
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    endpoint: Url,
}

impl WebhookMailer {
    pub fn new(endpoint: &str) -> Result<Self, MailError> {
        let endpoint = Url::parse(endpoint).map_err(|_| MailError::InvalidUrl(endpoint.to_string()))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(MailError::InvalidUrl(endpoint.to_string()));
        }
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let response = self.client.post(self.endpoint.clone()).json(mail).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Rejected(status.as_u16()));
        }
        tracing::debug!(to = %mail.to, status = status.as_u16(), "mail accepted by relay");
        Ok(())
    }
}
