//! One-time code issuance and verification.
//!
//! Each email address runs a small state machine stored entirely in the
//! ledger, so any number of service instances see the same picture:
//!
//! - `otp:{email}` holds the live code for its short lifetime.
//! - `otp_attempts:{email}` counts wrong guesses inside a rolling window.
//! - `otp_request_count:{email}` counts issuance requests per hour.
//! - `otp_cooldown:{email}`, `otp_spam_lock:{email}` and `otp_lock:{email}`
//!   are advisory flags that gate issuance (and, for the lock, verification).
//!
//! The three flags answer different abuse patterns. A flood of issuance
//! requests trips the spam lock, a flood of wrong guesses against one code
//! trips the account lock, and a legitimate user mashing resend hits the
//! cooldown. Restriction checks, request accounting, and issuance run in
//! strict order per request.

use super::ledger::{Ledger, LedgerError};
use crate::api::mail::{MailError, MailMessage, Mailer};
use rand::{rngs::OsRng, Rng};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_CODE_DIGITS: u32 = 6;
pub const DEFAULT_CODE_TTL_SECONDS: i64 = 5 * 60;
pub const DEFAULT_COOLDOWN_SECONDS: i64 = 60;
pub const DEFAULT_REQUEST_LIMIT: u32 = 5;
pub const DEFAULT_REQUEST_WINDOW_SECONDS: i64 = 60 * 60;
pub const DEFAULT_SPAM_LOCK_SECONDS: i64 = 60 * 60;
pub const DEFAULT_FAILURE_LIMIT: u32 = 2;
pub const DEFAULT_FAILURE_WINDOW_SECONDS: i64 = 5 * 60;
pub const DEFAULT_LOCK_SECONDS: i64 = 30 * 60;

const MIN_CODE_DIGITS: u32 = 4;
const MAX_CODE_DIGITS: u32 = 9;

/// Issuance denied by one of the ledger flags.
///
/// `retry_after_seconds` is the configured flag duration. The ledger does
/// not expose remaining TTLs, so the full window is reported.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OtpDenied {
    #[error(
        "Account locked due to too many failed attempts. Try again in {} minute(s).",
        (.retry_after_seconds + 59) / 60
    )]
    AccountLocked { retry_after_seconds: i64 },
    #[error(
        "Too many code requests. Try again in {} minute(s).",
        (.retry_after_seconds + 59) / 60
    )]
    SpamLocked { retry_after_seconds: i64 },
    #[error("Please wait {retry_after_seconds} second(s) before requesting a new code.")]
    CoolingDown { retry_after_seconds: i64 },
}

impl OtpDenied {
    #[must_use]
    pub fn retry_after_seconds(&self) -> i64 {
        match self {
            Self::AccountLocked {
                retry_after_seconds,
            }
            | Self::SpamLocked {
                retry_after_seconds,
            }
            | Self::CoolingDown {
                retry_after_seconds,
            } => *retry_after_seconds,
        }
    }
}

#[derive(Debug, Error)]
pub enum OtpError {
    #[error(transparent)]
    Denied(#[from] OtpDenied),
    #[error("Invalid or expired code.")]
    InvalidOrExpired,
    #[error("Incorrect code. {remaining} attempt(s) remaining.")]
    Mismatch { remaining: u32 },
    #[error("Too many failed attempts. Account locked for {} minute(s).", (.lock_seconds + 59) / 60)]
    LockedOut { lock_seconds: i64 },
    #[error("Failed to deliver the code: {0}")]
    Mail(#[source] MailError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Subject and template used when a flow mails out a code.
#[derive(Clone, Copy, Debug)]
pub struct OtpMailKind {
    pub subject: &'static str,
    pub template: &'static str,
}

pub const REGISTRATION_MAIL: OtpMailKind = OtpMailKind {
    subject: "Verify your email",
    template: "user-activation",
};

pub const RECOVERY_MAIL: OtpMailKind = OtpMailKind {
    subject: "Reset your password",
    template: "password-recovery",
};

pub(crate) fn code_key(email: &str) -> String {
    format!("otp:{email}")
}

pub(crate) fn attempts_key(email: &str) -> String {
    format!("otp_attempts:{email}")
}

pub(crate) fn cooldown_key(email: &str) -> String {
    format!("otp_cooldown:{email}")
}

pub(crate) fn spam_lock_key(email: &str) -> String {
    format!("otp_spam_lock:{email}")
}

pub(crate) fn lock_key(email: &str) -> String {
    format!("otp_lock:{email}")
}

pub(crate) fn request_count_key(email: &str) -> String {
    format!("otp_request_count:{email}")
}

/// Code lengths, lifetimes, and lock thresholds.
///
/// Defaults: 6-digit codes valid for 5 minutes, a 60 second resend
/// cooldown, a spam lock after 5 requests per rolling hour, and a 30
/// minute account lock after 2 wrong guesses inside 5 minutes.
#[derive(Clone, Copy, Debug)]
pub struct OtpPolicy {
    code_digits: u32,
    code_ttl_seconds: i64,
    cooldown_seconds: i64,
    request_limit: u32,
    request_window_seconds: i64,
    spam_lock_seconds: i64,
    failure_limit: u32,
    failure_window_seconds: i64,
    lock_seconds: i64,
}

impl OtpPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            code_digits: DEFAULT_CODE_DIGITS,
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
            cooldown_seconds: DEFAULT_COOLDOWN_SECONDS,
            request_limit: DEFAULT_REQUEST_LIMIT,
            request_window_seconds: DEFAULT_REQUEST_WINDOW_SECONDS,
            spam_lock_seconds: DEFAULT_SPAM_LOCK_SECONDS,
            failure_limit: DEFAULT_FAILURE_LIMIT,
            failure_window_seconds: DEFAULT_FAILURE_WINDOW_SECONDS,
            lock_seconds: DEFAULT_LOCK_SECONDS,
        }
    }

    /// Code width in digits, clamped to 4..=9 so codes stay typeable and
    /// never overflow the generator's integer range.
    #[must_use]
    pub fn with_code_digits(mut self, digits: u32) -> Self {
        self.code_digits = digits.clamp(MIN_CODE_DIGITS, MAX_CODE_DIGITS);
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_request_limit(mut self, limit: u32) -> Self {
        self.request_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_request_window_seconds(mut self, seconds: i64) -> Self {
        self.request_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_spam_lock_seconds(mut self, seconds: i64) -> Self {
        self.spam_lock_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_failure_limit(mut self, limit: u32) -> Self {
        self.failure_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_failure_window_seconds(mut self, seconds: i64) -> Self {
        self.failure_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_lock_seconds(mut self, seconds: i64) -> Self {
        self.lock_seconds = seconds;
        self
    }

    #[must_use]
    pub fn code_digits(&self) -> u32 {
        self.code_digits
    }

    #[must_use]
    pub fn code_ttl_seconds(&self) -> i64 {
        self.code_ttl_seconds
    }

    #[must_use]
    pub fn cooldown_seconds(&self) -> i64 {
        self.cooldown_seconds
    }

    #[must_use]
    pub fn request_limit(&self) -> u32 {
        self.request_limit
    }

    #[must_use]
    pub fn request_window_seconds(&self) -> i64 {
        self.request_window_seconds
    }

    #[must_use]
    pub fn spam_lock_seconds(&self) -> i64 {
        self.spam_lock_seconds
    }

    #[must_use]
    pub fn failure_limit(&self) -> u32 {
        self.failure_limit
    }

    #[must_use]
    pub fn failure_window_seconds(&self) -> i64 {
        self.failure_window_seconds
    }

    #[must_use]
    pub fn lock_seconds(&self) -> i64 {
        self.lock_seconds
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Issues and verifies one-time codes for a single email address at a time.
pub struct OtpManager {
    ledger: Arc<dyn Ledger>,
    mailer: Arc<dyn Mailer>,
    policy: OtpPolicy,
}

impl OtpManager {
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, mailer: Arc<dyn Mailer>, policy: OtpPolicy) -> Self {
        Self {
            ledger,
            mailer,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Gate issuance on the account lock, the spam lock, and the cooldown,
    /// in that priority order.
    ///
    /// # Errors
    /// Returns the first flag found as an `OtpDenied`, or a ledger error.
    pub async fn check_restrictions(&self, email: &str) -> Result<(), OtpError> {
        if self.ledger.get(&lock_key(email)).await?.is_some() {
            return Err(OtpDenied::AccountLocked {
                retry_after_seconds: self.policy.lock_seconds(),
            }
            .into());
        }

        if self.ledger.get(&spam_lock_key(email)).await?.is_some() {
            return Err(OtpDenied::SpamLocked {
                retry_after_seconds: self.policy.spam_lock_seconds(),
            }
            .into());
        }

        if self.ledger.get(&cooldown_key(email)).await?.is_some() {
            return Err(OtpDenied::CoolingDown {
                retry_after_seconds: self.policy.cooldown_seconds(),
            }
            .into());
        }

        Ok(())
    }

    /// Count this request against the rolling window, tripping the spam
    /// lock once the limit is reached. Runs after the gate so rejected
    /// requests still count.
    ///
    /// # Errors
    /// Returns `OtpDenied::SpamLocked` at the limit, or a ledger error.
    pub async fn track_request(&self, email: &str) -> Result<(), OtpError> {
        let count = self
            .ledger
            .incr_with_ttl(
                &request_count_key(email),
                self.policy.request_window_seconds(),
            )
            .await?;

        if count >= i64::from(self.policy.request_limit()) {
            self.ledger
                .set_with_ttl(&spam_lock_key(email), "1", self.policy.spam_lock_seconds())
                .await?;
            return Err(OtpDenied::SpamLocked {
                retry_after_seconds: self.policy.spam_lock_seconds(),
            }
            .into());
        }

        Ok(())
    }

    /// Generate a fresh code, deliver it, then store it and start the
    /// cooldown.
    ///
    /// Delivery runs first. A code that never reached an inbox is not
    /// stored, but the cooldown still starts, so a broken transport cannot
    /// be used to hammer the mail provider with resends.
    ///
    /// # Errors
    /// Returns `OtpError::Mail` when delivery fails, or a ledger error.
    pub async fn issue(&self, email: &str, name: &str, kind: OtpMailKind) -> Result<(), OtpError> {
        let code = generate_code(self.policy.code_digits());
        let message = MailMessage {
            to: email.to_string(),
            subject: kind.subject.to_string(),
            template: kind.template.to_string(),
            variables: json!({ "name": name, "code": code }),
        };

        if let Err(err) = self.mailer.send(&message).await {
            self.ledger
                .set_with_ttl(&cooldown_key(email), "1", self.policy.cooldown_seconds())
                .await?;
            return Err(OtpError::Mail(err));
        }

        self.ledger
            .set_with_ttl(&code_key(email), &code, self.policy.code_ttl_seconds())
            .await?;
        self.ledger
            .set_with_ttl(&cooldown_key(email), "1", self.policy.cooldown_seconds())
            .await?;

        Ok(())
    }

    /// Check a submitted code.
    ///
    /// An expired code and a never-issued one are indistinguishable on
    /// purpose. Wrong guesses count toward the account lock; at the limit
    /// the code and the counter are both dropped. On a match every piece
    /// of transient state is cleared, so the same code cannot be verified
    /// twice.
    ///
    /// # Errors
    /// Returns the verification failure, or a ledger error.
    pub async fn verify(&self, email: &str, code: &str) -> Result<(), OtpError> {
        if self.ledger.get(&lock_key(email)).await?.is_some() {
            return Err(OtpDenied::AccountLocked {
                retry_after_seconds: self.policy.lock_seconds(),
            }
            .into());
        }

        let Some(stored) = self.ledger.get(&code_key(email)).await? else {
            return Err(OtpError::InvalidOrExpired);
        };

        if stored != code {
            let failures = self
                .ledger
                .incr_with_ttl(&attempts_key(email), self.policy.failure_window_seconds())
                .await?;

            if failures >= i64::from(self.policy.failure_limit()) {
                self.ledger
                    .set_with_ttl(&lock_key(email), "1", self.policy.lock_seconds())
                    .await?;
                self.ledger
                    .delete(&[code_key(email), attempts_key(email)])
                    .await?;
                return Err(OtpError::LockedOut {
                    lock_seconds: self.policy.lock_seconds(),
                });
            }

            let remaining =
                u32::try_from(i64::from(self.policy.failure_limit()) - failures).unwrap_or(0);
            return Err(OtpError::Mismatch { remaining });
        }

        // The delete count arbitrates concurrent submissions of the same
        // code: whoever removes the key wins, everyone else sees it gone.
        if self.ledger.delete(&[code_key(email)]).await? == 0 {
            return Err(OtpError::InvalidOrExpired);
        }
        self.ledger.delete(&[attempts_key(email)]).await?;

        Ok(())
    }
}

fn generate_code(digits: u32) -> String {
    let width = digits.clamp(MIN_CODE_DIGITS, MAX_CODE_DIGITS);
    let bound = 10u64.pow(width);
    let value = OsRng.gen_range(0..bound);
    format!("{:0width$}", value, width = width as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::ledger::InMemoryLedger;
    use crate::api::handlers::auth::support::{CapturingMailer, FailingMailer};
    use anyhow::Result;

    const EMAIL: &str = "tuj@example.com";

    fn manager(mailer: Arc<dyn Mailer>, policy: OtpPolicy) -> (OtpManager, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        (OtpManager::new(ledger.clone(), mailer, policy), ledger)
    }

    #[tokio::test]
    async fn gate_passes_with_no_flags_set() -> Result<()> {
        let (manager, _ledger) = manager(CapturingMailer::new(), OtpPolicy::new());
        manager.check_restrictions(EMAIL).await?;
        Ok(())
    }

    #[tokio::test]
    async fn gate_reports_account_lock_first() -> Result<()> {
        let (manager, ledger) = manager(CapturingMailer::new(), OtpPolicy::new());
        ledger.set_with_ttl(&lock_key(EMAIL), "1", 60).await?;
        ledger.set_with_ttl(&spam_lock_key(EMAIL), "1", 60).await?;
        ledger.set_with_ttl(&cooldown_key(EMAIL), "1", 60).await?;

        let denied = manager.check_restrictions(EMAIL).await;
        assert!(matches!(
            denied,
            Err(OtpError::Denied(OtpDenied::AccountLocked { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn gate_reports_spam_lock_before_cooldown() -> Result<()> {
        let (manager, ledger) = manager(CapturingMailer::new(), OtpPolicy::new());
        ledger.set_with_ttl(&spam_lock_key(EMAIL), "1", 60).await?;
        ledger.set_with_ttl(&cooldown_key(EMAIL), "1", 60).await?;

        let denied = manager.check_restrictions(EMAIL).await;
        assert!(matches!(
            denied,
            Err(OtpError::Denied(OtpDenied::SpamLocked { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn gate_reports_cooldown() -> Result<()> {
        let (manager, ledger) = manager(CapturingMailer::new(), OtpPolicy::new());
        ledger.set_with_ttl(&cooldown_key(EMAIL), "1", 60).await?;

        let denied = manager.check_restrictions(EMAIL).await;
        assert!(matches!(
            denied,
            Err(OtpError::Denied(OtpDenied::CoolingDown { retry_after_seconds }))
                if retry_after_seconds == DEFAULT_COOLDOWN_SECONDS
        ));
        Ok(())
    }

    #[tokio::test]
    async fn request_limit_trips_the_spam_lock() -> Result<()> {
        let policy = OtpPolicy::new().with_request_limit(3);
        let (manager, ledger) = manager(CapturingMailer::new(), policy);

        manager.track_request(EMAIL).await?;
        manager.track_request(EMAIL).await?;
        let third = manager.track_request(EMAIL).await;
        assert!(matches!(
            third,
            Err(OtpError::Denied(OtpDenied::SpamLocked { .. }))
        ));
        assert!(ledger.get(&spam_lock_key(EMAIL)).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn issue_stores_code_and_starts_cooldown() -> Result<()> {
        let mailer = CapturingMailer::new();
        let (manager, ledger) = manager(mailer.clone(), OtpPolicy::new());

        manager.issue(EMAIL, "Tuj", REGISTRATION_MAIL).await?;

        let stored = ledger.get(&code_key(EMAIL)).await?;
        let mailed = mailer.last_code();
        assert_eq!(stored, mailed);
        assert!(ledger.get(&cooldown_key(EMAIL)).await?.is_some());

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Verify your email");
        assert_eq!(sent[0].template, "user-activation");
        assert_eq!(sent[0].variables["name"], "Tuj");
        Ok(())
    }

    #[tokio::test]
    async fn failed_delivery_starts_cooldown_but_stores_no_code() -> Result<()> {
        let (manager, ledger) = manager(Arc::new(FailingMailer), OtpPolicy::new());

        let issued = manager.issue(EMAIL, "Tuj", RECOVERY_MAIL).await;
        assert!(matches!(issued, Err(OtpError::Mail(_))));
        assert!(ledger.get(&code_key(EMAIL)).await?.is_none());
        assert!(ledger.get(&cooldown_key(EMAIL)).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn cooldown_blocks_reissue_and_preserves_the_code() -> Result<()> {
        let mailer = CapturingMailer::new();
        let (manager, ledger) = manager(mailer.clone(), OtpPolicy::new());

        manager.issue(EMAIL, "Tuj", REGISTRATION_MAIL).await?;
        let first = ledger.get(&code_key(EMAIL)).await?;

        let gated = manager.check_restrictions(EMAIL).await;
        assert!(matches!(
            gated,
            Err(OtpError::Denied(OtpDenied::CoolingDown { .. }))
        ));
        assert_eq!(ledger.get(&code_key(EMAIL)).await?, first);
        assert_eq!(mailer.sent().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn correct_code_verifies_once_and_clears_state() -> Result<()> {
        let mailer = CapturingMailer::new();
        let (manager, ledger) = manager(mailer.clone(), OtpPolicy::new());

        manager.issue(EMAIL, "Tuj", REGISTRATION_MAIL).await?;
        let code = mailer.last_code().unwrap();

        manager.verify(EMAIL, &code).await?;
        assert!(ledger.get(&code_key(EMAIL)).await?.is_none());
        assert!(ledger.get(&attempts_key(EMAIL)).await?.is_none());

        let replay = manager.verify(EMAIL, &code).await;
        assert!(matches!(replay, Err(OtpError::InvalidOrExpired)));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_code_counts_down_then_locks() -> Result<()> {
        let mailer = CapturingMailer::new();
        let (manager, ledger) = manager(mailer.clone(), OtpPolicy::new());

        manager.issue(EMAIL, "Tuj", REGISTRATION_MAIL).await?;
        let code = mailer.last_code().unwrap();
        let wrong = if code == "000000" { "000001" } else { "000000" };

        let first = manager.verify(EMAIL, wrong).await;
        assert!(matches!(first, Err(OtpError::Mismatch { remaining: 1 })));
        assert!(ledger.get(&code_key(EMAIL)).await?.is_some());

        let second = manager.verify(EMAIL, wrong).await;
        assert!(matches!(second, Err(OtpError::LockedOut { .. })));
        assert!(ledger.get(&code_key(EMAIL)).await?.is_none());
        assert!(ledger.get(&attempts_key(EMAIL)).await?.is_none());
        assert!(ledger.get(&lock_key(EMAIL)).await?.is_some());

        // Even the right code is refused while the lock holds.
        let while_locked = manager.verify(EMAIL, &code).await;
        assert!(matches!(
            while_locked,
            Err(OtpError::Denied(OtpDenied::AccountLocked { .. }))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn verify_without_issuance_is_invalid() -> Result<()> {
        let (manager, _ledger) = manager(CapturingMailer::new(), OtpPolicy::new());
        let missing = manager.verify(EMAIL, "123456").await;
        assert!(matches!(missing, Err(OtpError::InvalidOrExpired)));
        Ok(())
    }

    #[test]
    fn generated_codes_are_fixed_width_digits() {
        for _ in 0..50 {
            let code = generate_code(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
        assert_eq!(generate_code(4).len(), 4);
    }

    #[test]
    fn policy_clamps_code_digits() {
        assert_eq!(OtpPolicy::new().with_code_digits(12).code_digits(), 9);
        assert_eq!(OtpPolicy::new().with_code_digits(1).code_digits(), 4);
        assert_eq!(OtpPolicy::new().with_code_digits(6).code_digits(), 6);
    }

    #[test]
    fn denials_report_wait_in_human_units() {
        let lock = OtpDenied::AccountLocked {
            retry_after_seconds: 1800,
        };
        assert!(lock.to_string().contains("30 minute(s)"));
        assert_eq!(lock.retry_after_seconds(), 1800);

        let cooldown = OtpDenied::CoolingDown {
            retry_after_seconds: 60,
        };
        assert!(cooldown.to_string().contains("60 second(s)"));
    }
}
