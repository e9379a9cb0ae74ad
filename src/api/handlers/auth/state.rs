//! Auth runtime configuration and shared handler state.

use super::directory::UserDirectory;
use super::ledger::Ledger;
use super::otp::{OtpManager, OtpPolicy};
use super::tokens::TokenKeys;
use crate::api::mail::Mailer;
use std::sync::Arc;

pub const DEFAULT_MIN_PASSWORD_LENGTH: usize = 6;

/// Flow-level knobs that are not part of the OTP policy.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    min_password_length: usize,
    otp: OtpPolicy,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            otp: OtpPolicy::new(),
        }
    }

    #[must_use]
    pub fn with_min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length.max(1);
        self
    }

    #[must_use]
    pub fn with_otp_policy(mut self, policy: OtpPolicy) -> Self {
        self.otp = policy;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    #[must_use]
    pub fn otp_policy(&self) -> OtpPolicy {
        self.otp
    }

    /// Cookies are cross-site (`SameSite=None; Secure`) only when the
    /// frontend is served over https.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Everything the auth handlers share, injected as one extension.
pub struct AuthState {
    config: AuthConfig,
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn UserDirectory>,
    keys: TokenKeys,
    otp: OtpManager,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Mailer>,
        keys: TokenKeys,
    ) -> Self {
        let otp = OtpManager::new(ledger.clone(), mailer, config.otp_policy());
        Self {
            config,
            ledger,
            directory,
            keys,
            otp,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    #[must_use]
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    #[must_use]
    pub fn keys(&self) -> &TokenKeys {
        &self.keys
    }

    #[must_use]
    pub fn otp(&self) -> &OtpManager {
        &self.otp
    }
}
