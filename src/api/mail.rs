//! Transactional mail delivery abstractions.
//!
//! One-time codes have to reach the inbox before the cooldown makes sense,
//! so delivery is awaited inline and its outcome drives the issuing flow.
//! The default sender for local dev is `LogMailer`, which logs and returns
//! `Ok(())`. Production deployments use `HttpMailer`, a thin client for a
//! template-based mail API (Postmark-style `{from, to, subject, template,
//! variables}` JSON body with a bearer key).

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, info_span, Instrument};
use url::Url;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub(crate) String);

#[derive(Clone, Debug, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub variables: serde_json::Value,
}

/// Mail delivery abstraction used by the one-time code flows.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error so the caller can degrade.
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            template = %message.template,
            variables = %message.variables,
            "mail send stub"
        );
        Ok(())
    }
}

/// HTTP client for a template mail API.
#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
    from: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    template: &'a str,
    variables: &'a serde_json::Value,
}

impl HttpMailer {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: Url, api_key: SecretString, from: String) -> Result<Self, MailError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|err| MailError(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            from,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        let body = SendRequest {
            from: &self.from,
            to: &message.to,
            subject: &message.subject,
            template: &message.template,
            variables: &message.variables,
        };

        let span = info_span!(
            "mail.send",
            http.method = "POST",
            url = %self.endpoint,
            template = %message.template
        );
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .instrument(span)
            .await
            .map_err(|err| MailError(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MailError(format!("mail API returned {status}: {body}")));
        }

        Ok(())
    }
}
