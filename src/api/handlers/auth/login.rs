//! Session lifecycle: login, refresh rotation, logout.

use super::credentials::{normalize_email, verify_password};
use super::directory::Provider;
use super::error::{ErrorBody, FlowError};
use super::otp::REGISTRATION_MAIL;
use super::session;
use super::state::AuthState;
use super::tokens::{unix_now, TokenPair};
use super::types::{LoginRequest, MessageResponse, UserResponse};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

fn invalid_credentials() -> FlowError {
    FlowError::auth("invalid_credentials", "Invalid email or password.")
}

/// Check credentials and mint a session pair.
///
/// An unknown email and a wrong password answer identically. Unverified
/// accounts get a fresh verification code and an actionable rejection
/// instead of a session.
///
/// # Errors
/// `invalid_credentials`, `oauth_account`, `account_unverified`,
/// rate-limit denials from the re-issue path, and upstream failures.
pub async fn authenticate(
    state: &AuthState,
    request: LoginRequest,
    now: i64,
) -> Result<(UserResponse, TokenPair), FlowError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(FlowError::validation(
            "missing_fields",
            "Email and password are required.",
        ));
    }
    let email = normalize_email(&request.email);

    let Some(user) = state.directory().find_by_email(&email).await? else {
        return Err(invalid_credentials());
    };

    if user.provider != Provider::Local {
        return Err(FlowError::validation(
            "oauth_account",
            "This account signs in through an external provider.",
        ));
    }

    let Some(hash) = user.password_hash.as_deref() else {
        error!(user_id = %user.id, "Local account has no password hash");
        return Err(FlowError::upstream(
            "store_unavailable",
            "Service temporarily unavailable. Please try again.",
        ));
    };

    if !verify_password(&request.password, hash)? {
        return Err(invalid_credentials());
    }

    if !user.is_verified {
        state.otp().check_restrictions(&email).await?;
        state.otp().track_request(&email).await?;
        state
            .otp()
            .issue(&email, &user.name, REGISTRATION_MAIL)
            .await?;
        return Err(FlowError::auth(
            "account_unverified",
            "Your email is not verified. A new verification code is on its way.",
        ));
    }

    let pair = state.keys().mint_pair(user.id, user.role, now)?;
    info!(user_id = %user.id, "Login succeeded");
    Ok((UserResponse::from(user), pair))
}

/// Rotate a refresh token into a fresh pair.
///
/// The token is accepted only from the refresh cookie, never the bearer
/// header. The subject is re-resolved against the directory so tokens for
/// deleted accounts die, and the new pair carries the directory's current
/// role rather than the one baked into the old token.
///
/// # Errors
/// `token_missing`, the token failure class, or `account_missing`.
pub async fn rotate(
    state: &AuthState,
    headers: &HeaderMap,
    now: i64,
) -> Result<(UserResponse, TokenPair), FlowError> {
    let Some(token) = session::refresh_token_from_headers(headers) else {
        return Err(FlowError::auth("token_missing", "Authentication required."));
    };

    let claims = state.keys().verify_refresh(&token, now)?;
    let subject = claims.subject()?;

    let user = state
        .directory()
        .find_by_id(subject)
        .await?
        .ok_or_else(|| FlowError::auth("account_missing", "Account no longer exists."))?;

    let pair = state.keys().mint_pair(user.id, user.role, now)?;
    Ok((UserResponse::from(user), pair))
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established and cookies set.", body = UserResponse),
        (status = 400, description = "Invalid payload or non-local account.", body = ErrorBody),
        (status = 401, description = "Invalid credentials or unverified email.", body = ErrorBody),
        (status = 429, description = "Rate limited while re-sending the verification code.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match authenticate(&state, request, unix_now()).await {
        Ok((user, pair)) => {
            let mut headers = HeaderMap::new();
            session::apply_session_cookies(
                &mut headers,
                &pair,
                state.keys(),
                state.config().session_cookie_secure(),
            );
            (StatusCode::OK, headers, Json(user)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "New session pair issued.", body = UserResponse),
        (status = 401, description = "Missing, invalid, or expired refresh token.", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip(state, headers))]
pub async fn refresh(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    match rotate(&state, &headers, unix_now()).await {
        Ok((user, pair)) => {
            let mut response_headers = HeaderMap::new();
            session::apply_session_cookies(
                &mut response_headers,
                &pair,
                state.keys(),
                state.config().session_cookie_secure(),
            );
            (StatusCode::OK, response_headers, Json(user)).into_response()
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Session cookies cleared.", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn logout(state: Extension<Arc<AuthState>>) -> Response {
    let mut headers = HeaderMap::new();
    session::apply_clear_cookies(&mut headers, state.config().session_cookie_secure());
    (
        StatusCode::OK,
        headers,
        Json(MessageResponse::new("Logged out.")),
    )
        .into_response()
}
