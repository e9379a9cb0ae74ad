//! Registration flow.
//!
//! Two steps: `start` validates the payload and mails a verification code,
//! `verify` consumes the code and creates the account. Creation goes
//! through the directory's conflict-aware insert, so two concurrent
//! verifications of the same email cannot both win.

use super::credentials::{hash_password, normalize_email, valid_email, valid_name};
use super::directory::{CreateOutcome, NewUser};
use super::error::{ErrorBody, FlowError};
use super::otp::REGISTRATION_MAIL;
use super::session;
use super::state::AuthState;
use super::tokens::{unix_now, TokenPair};
use super::types::{MessageResponse, RegisterStartRequest, RegisterVerifyRequest, UserResponse};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

struct ValidRegistration {
    name: String,
    email: String,
    password: String,
}

/// Cheap rejects first: shape, then email pattern, then password policy.
fn validate_registration(
    state: &AuthState,
    name: &str,
    email: &str,
    password: &str,
) -> Result<ValidRegistration, FlowError> {
    if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(FlowError::validation(
            "missing_fields",
            "Name, email, and password are required.",
        ));
    }

    if !valid_name(name) {
        return Err(FlowError::validation(
            "name_too_short",
            "Name must be at least 2 characters.",
        ));
    }

    let email = normalize_email(email);
    if !valid_email(&email) {
        return Err(FlowError::validation("invalid_email", "Invalid email."));
    }

    if password.chars().count() < state.config().min_password_length() {
        return Err(FlowError::validation(
            "password_too_short",
            format!(
                "Password must be at least {} characters.",
                state.config().min_password_length()
            ),
        ));
    }

    Ok(ValidRegistration {
        name: name.trim().to_string(),
        email,
        password: password.to_string(),
    })
}

/// Validate, check uniqueness, then gate, count, and issue the code.
///
/// # Errors
/// Validation failures, `email_taken`, rate-limit denials, and upstream
/// failures from the mailer or the ledger.
pub async fn start(
    state: &AuthState,
    request: RegisterStartRequest,
) -> Result<MessageResponse, FlowError> {
    let valid = validate_registration(state, &request.name, &request.email, &request.password)?;

    // Uniqueness is reported explicitly here: the account does not exist
    // yet, so there is nothing to enumerate.
    if state
        .directory()
        .find_by_email(&valid.email)
        .await?
        .is_some()
    {
        return Err(FlowError::validation(
            "email_taken",
            "An account with this email already exists.",
        ));
    }

    state.otp().check_restrictions(&valid.email).await?;
    state.otp().track_request(&valid.email).await?;
    state
        .otp()
        .issue(&valid.email, &valid.name, REGISTRATION_MAIL)
        .await?;

    info!(email = %valid.email, "Registration code issued");
    Ok(MessageResponse::new(
        "Check your email for a verification code.",
    ))
}

/// Consume the code and create the verified account, then mint a session.
///
/// # Errors
/// Validation failures, OTP failures, `email_taken` when a concurrent
/// registration won the insert, and upstream failures.
pub async fn verify(
    state: &AuthState,
    request: RegisterVerifyRequest,
    now: i64,
) -> Result<(UserResponse, TokenPair), FlowError> {
    let valid = validate_registration(state, &request.name, &request.email, &request.password)?;
    if request.code.trim().is_empty() {
        return Err(FlowError::validation(
            "missing_fields",
            "Verification code is required.",
        ));
    }

    state.otp().verify(&valid.email, request.code.trim()).await?;

    let password_hash = hash_password(&valid.password)?;
    let outcome = state
        .directory()
        .create(NewUser {
            name: valid.name,
            email: valid.email,
            password_hash,
        })
        .await?;

    let user = match outcome {
        CreateOutcome::Created(user) => user,
        CreateOutcome::EmailTaken => {
            return Err(FlowError::validation(
                "email_taken",
                "An account with this email already exists.",
            ));
        }
    };

    let pair = state.keys().mint_pair(user.id, user.role, now)?;
    info!(user_id = %user.id, "Account created");
    Ok((UserResponse::from(user), pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterStartRequest,
    responses(
        (status = 200, description = "Verification code sent.", body = MessageResponse),
        (status = 400, description = "Invalid payload or email already registered.", body = ErrorBody),
        (status = 429, description = "Cooldown, spam lock, or account lock in effect.", body = ErrorBody),
        (status = 502, description = "Code delivery failed.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterStartRequest>>,
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
    path = "/v1/auth/register/verify",
    request_body = RegisterVerifyRequest,
    responses(
        (status = 201, description = "Account created and session cookies set.", body = UserResponse),
        (status = 400, description = "Invalid payload or wrong code.", body = ErrorBody),
        (status = 429, description = "Account lock in effect.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register_verify(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterVerifyRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match verify(&state, request, unix_now()).await {
        Ok((user, pair)) => {
            let mut headers = HeaderMap::new();
            session::apply_session_cookies(
                &mut headers,
                &pair,
                state.keys(),
                state.config().session_cookie_secure(),
            );
            (StatusCode::CREATED, headers, Json(user)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
