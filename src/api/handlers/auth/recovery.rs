//! Password recovery: masked start, code verification, guarded reset.
//!
//! `start` answers with the same body for a known local account, an
//! unknown address, and an account owned by an external provider, so the
//! endpoint cannot be used to enumerate accounts. Verifying the code
//! consumes it and leaves a short-lived reset grant in the ledger; `reset`
//! consumes that grant atomically before touching the password.

use super::credentials::{hash_password, normalize_email, verify_password};
use super::directory::{Provider, UserRecord};
use super::error::{ErrorBody, FlowError};
use super::otp::{OtpError, RECOVERY_MAIL};
use super::state::AuthState;
use super::types::{
    MessageResponse, RecoverStartRequest, RecoverVerifyRequest, ResetPasswordRequest,
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// How long a verified reset code authorizes a password change.
pub(crate) const RESET_GRANT_TTL_SECONDS: i64 = 10 * 60;

const MASKED_START: &str = "If an account exists for that address, a reset code is on its way.";

pub(crate) fn reset_grant_key(email: &str) -> String {
    format!("otp_reset_grant:{email}")
}

/// Mail a recovery code if the address belongs to a local account.
///
/// Lookup and delivery failures degrade to the masked success, otherwise
/// their status would reveal whether the address exists. Rate-limit
/// denials do surface, they only fire for addresses the caller is
/// already hammering.
///
/// # Errors
/// Validation failures and rate-limit denials.
pub async fn start(
    state: &AuthState,
    request: RecoverStartRequest,
) -> Result<MessageResponse, FlowError> {
    if request.email.trim().is_empty() {
        return Err(FlowError::validation("missing_fields", "Email is required."));
    }
    let email = normalize_email(&request.email);

    let masked = MessageResponse::new(MASKED_START);

    let user = match state.directory().find_by_email(&email).await {
        Ok(user) => user,
        Err(err) => {
            warn!("Recovery lookup failed: {err}");
            return Ok(masked);
        }
    };

    let Some(user) = user else {
        return Ok(masked);
    };
    if user.provider != Provider::Local {
        return Ok(masked);
    }

    if let Err(err) = issue_recovery_code(state, &user, &email).await {
        match err {
            OtpError::Denied(_) => return Err(err.into()),
            other => {
                warn!("Recovery code issuance failed: {other}");
                return Ok(masked);
            }
        }
    }

    info!(user_id = %user.id, "Recovery code issued");
    Ok(masked)
}

async fn issue_recovery_code(
    state: &AuthState,
    user: &UserRecord,
    email: &str,
) -> Result<(), OtpError> {
    state.otp().check_restrictions(email).await?;
    state.otp().track_request(email).await?;
    state.otp().issue(email, &user.name, RECOVERY_MAIL).await
}

/// Consume the recovery code and record the reset grant.
///
/// # Errors
/// Validation failures, OTP failures, and upstream failures.
pub async fn verify(
    state: &AuthState,
    request: RecoverVerifyRequest,
) -> Result<MessageResponse, FlowError> {
    if request.email.trim().is_empty() || request.code.trim().is_empty() {
        return Err(FlowError::validation(
            "missing_fields",
            "Email and code are required.",
        ));
    }
    let email = normalize_email(&request.email);

    state.otp().verify(&email, request.code.trim()).await?;

    state
        .ledger()
        .set_with_ttl(&reset_grant_key(&email), "1", RESET_GRANT_TTL_SECONDS)
        .await?;

    Ok(MessageResponse::new(
        "Code verified. You can set a new password now.",
    ))
}

/// Consume the reset grant and persist the new password.
///
/// # Errors
/// `reset_not_verified` without a live grant, validation failures,
/// `password_reuse`, and upstream failures.
pub async fn reset(
    state: &AuthState,
    request: ResetPasswordRequest,
) -> Result<MessageResponse, FlowError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(FlowError::validation(
            "missing_fields",
            "Email and password are required.",
        ));
    }
    let email = normalize_email(&request.email);

    if request.password.chars().count() < state.config().min_password_length() {
        return Err(FlowError::validation(
            "password_too_short",
            format!(
                "Password must be at least {} characters.",
                state.config().min_password_length()
            ),
        ));
    }

    // Consuming the grant is the authorization check. The delete count
    // makes concurrent resets single-winner.
    if state.ledger().delete(&[reset_grant_key(&email)]).await? == 0 {
        return Err(FlowError::auth(
            "reset_not_verified",
            "Verify the reset code first.",
        ));
    }

    let Some(user) = state.directory().find_by_email(&email).await? else {
        return Err(FlowError::not_found("not_found", "Account not found."));
    };

    if user.provider != Provider::Local {
        return Err(FlowError::validation(
            "oauth_account",
            "This account signs in through an external provider.",
        ));
    }

    if let Some(hash) = user.password_hash.as_deref() {
        if verify_password(&request.password, hash)? {
            return Err(FlowError::validation(
                "password_reuse",
                "New password must differ from the current password.",
            ));
        }
    }

    let password_hash = hash_password(&request.password)?;
    state
        .directory()
        .update_password(user.id, &password_hash)
        .await?;

    info!(user_id = %user.id, "Password reset completed");
    Ok(MessageResponse::new(
        "Password updated. You can sign in now.",
    ))
}

#[utoipa::path(
    post,
    path = "/v1/auth/recover",
    request_body = RecoverStartRequest,
    responses(
        (status = 200, description = "Masked acknowledgement.", body = MessageResponse),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 429, description = "Cooldown, spam lock, or account lock in effect.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn recover(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RecoverStartRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match start(&state, request).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/recover/verify",
    request_body = RecoverVerifyRequest,
    responses(
        (status = 200, description = "Code accepted; reset authorized.", body = MessageResponse),
        (status = 400, description = "Invalid payload or wrong code.", body = ErrorBody),
        (status = 429, description = "Account lock in effect.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn recover_verify(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RecoverVerifyRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match verify(&state, request).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/recover/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated.", body = MessageResponse),
        (status = 400, description = "Invalid payload or password policy violation.", body = ErrorBody),
        (status = 401, description = "No verified reset code for this address.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn reset_password(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match reset(&state, request).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(err) => err.into_response(),
    }
}
