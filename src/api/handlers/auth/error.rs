//! Failure taxonomy for the auth flows.
//!
//! Every component failure is mapped onto one of five classes before it
//! leaves a handler. The HTTP status follows the class; the body carries a
//! human-readable message plus a stable machine-checkable `reason` code so
//! clients can branch without parsing prose.

use super::credentials::HashError;
use super::directory::DirectoryError;
use super::ledger::LedgerError;
use super::otp::{OtpDenied, OtpError};
use super::tokens::TokenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Broad failure classes, each tied to one HTTP status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed or policy-violating input. The client should fix and retry.
    Validation,
    /// Bad credentials or an invalid, expired, or missing token.
    Auth,
    /// Cooldown, spam lock, or account lock. The client must wait it out.
    RateLimit,
    /// Resource absent. Used sparingly to avoid account enumeration.
    NotFound,
    /// Mail transport or store unavailable. Retryable by the caller.
    Upstream,
}

impl ErrorClass {
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Upstream => StatusCode::BAD_GATEWAY,
        }
    }
}

/// JSON body returned for every failed flow operation.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
    /// Stable reason code, e.g. `otp_cooldown` or `invalid_credentials`.
    pub reason: String,
}

#[derive(Debug)]
pub struct FlowError {
    class: ErrorClass,
    reason: &'static str,
    message: String,
}

impl FlowError {
    #[must_use]
    pub fn validation(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Validation,
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn auth(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Auth,
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn rate_limit(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::RateLimit,
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::NotFound,
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn upstream(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Upstream,
            reason,
            message: message.into(),
        }
    }

    fn unavailable() -> Self {
        Self::upstream(
            "store_unavailable",
            "Service temporarily unavailable. Please try again.",
        )
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.class.status()
    }
}

impl IntoResponse for FlowError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            reason: self.reason.to_string(),
        };
        (self.class.status(), Json(body)).into_response()
    }
}

impl From<OtpError> for FlowError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::Denied(denied) => {
                let reason = match denied {
                    OtpDenied::AccountLocked { .. } => "otp_locked",
                    OtpDenied::SpamLocked { .. } => "otp_spam_locked",
                    OtpDenied::CoolingDown { .. } => "otp_cooldown",
                };
                Self::rate_limit(reason, denied.to_string())
            }
            OtpError::LockedOut { .. } => Self::rate_limit("otp_locked", err.to_string()),
            OtpError::Mismatch { .. } => Self::validation("otp_mismatch", err.to_string()),
            OtpError::InvalidOrExpired => Self::validation("otp_invalid", err.to_string()),
            OtpError::Mail(_) => Self::upstream(
                "mail_unavailable",
                "Failed to send the code. Please try again.",
            ),
            OtpError::Ledger(_) => Self::unavailable(),
        }
    }
}

impl From<LedgerError> for FlowError {
    fn from(_: LedgerError) -> Self {
        Self::unavailable()
    }
}

impl From<DirectoryError> for FlowError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound => Self::not_found("not_found", "Not found."),
            DirectoryError::Unavailable(_) | DirectoryError::Corrupt(_) => Self::unavailable(),
        }
    }
}

impl From<TokenError> for FlowError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::auth("token_expired", "Session expired."),
            TokenError::Malformed | TokenError::InvalidSignature | TokenError::InvalidSubject => {
                Self::auth("token_invalid", "Invalid session token.")
            }
            TokenError::Signing(_) => Self::unavailable(),
        }
    }
}

impl From<HashError> for FlowError {
    fn from(_: HashError) -> Self {
        Self::unavailable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_map_to_expected_statuses() {
        assert_eq!(ErrorClass::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorClass::Auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorClass::RateLimit.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorClass::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorClass::Upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn otp_denials_keep_their_reason_codes() {
        let locked = FlowError::from(OtpError::Denied(OtpDenied::AccountLocked {
            retry_after_seconds: 1800,
        }));
        assert_eq!(locked.reason(), "otp_locked");
        assert_eq!(locked.class(), ErrorClass::RateLimit);

        let spam = FlowError::from(OtpError::Denied(OtpDenied::SpamLocked {
            retry_after_seconds: 3600,
        }));
        assert_eq!(spam.reason(), "otp_spam_locked");

        let cooling = FlowError::from(OtpError::Denied(OtpDenied::CoolingDown {
            retry_after_seconds: 60,
        }));
        assert_eq!(cooling.reason(), "otp_cooldown");
        assert_eq!(cooling.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn otp_verification_failures_classify_as_validation() {
        let mismatch = FlowError::from(OtpError::Mismatch { remaining: 1 });
        assert_eq!(mismatch.reason(), "otp_mismatch");
        assert_eq!(mismatch.status(), StatusCode::BAD_REQUEST);
        assert!(mismatch.message().contains("1 attempt(s) remaining"));

        let invalid = FlowError::from(OtpError::InvalidOrExpired);
        assert_eq!(invalid.reason(), "otp_invalid");
    }

    #[test]
    fn token_failures_classify_as_auth() {
        assert_eq!(FlowError::from(TokenError::Expired).reason(), "token_expired");
        assert_eq!(FlowError::from(TokenError::Malformed).reason(), "token_invalid");
        assert_eq!(
            FlowError::from(TokenError::InvalidSignature).status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn error_body_serializes_flat() {
        let err = FlowError::validation("invalid_email", "Invalid email.");
        let body = ErrorBody {
            error: err.message().to_string(),
            reason: err.reason().to_string(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["error"], "Invalid email.");
        assert_eq!(value["reason"], "invalid_email");
    }
}
