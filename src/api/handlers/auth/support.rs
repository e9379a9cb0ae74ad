//! Test doubles shared by the auth test modules.

use crate::api::mail::{MailError, MailMessage, Mailer};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Mailer that records every message instead of delivering it.
pub(crate) struct CapturingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

impl CapturingMailer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn sent(&self) -> Vec<MailMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Code carried by the most recent message, if any.
    pub(crate) fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .last()
            .and_then(|message| message.variables.get("code"))
            .and_then(|code| code.as_str())
            .map(ToString::to_string)
    }
}

#[async_trait]
impl Mailer for CapturingMailer {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Mailer whose every delivery attempt fails.
pub(crate) struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
        Err(MailError("mail API unreachable".to_string()))
    }
}
