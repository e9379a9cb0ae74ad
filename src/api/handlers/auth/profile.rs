//! Authenticated self-service endpoints.
//!
//! Every handler resolves the caller from the access token first and
//! passes the resulting principal into the flow.

use super::credentials::{hash_password, valid_name, verify_password};
use super::directory::{DirectoryError, Provider};
use super::error::{ErrorBody, FlowError};
use super::principal::Principal;
use super::state::AuthState;
use super::types::{ChangePasswordRequest, MessageResponse, UpdateProfileRequest, UserResponse};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

fn account_missing() -> FlowError {
    FlowError::auth("account_missing", "Account no longer exists.")
}

/// Rename the caller.
///
/// # Errors
/// `name_too_short`, `account_missing`, and upstream failures.
pub async fn update_profile(
    state: &AuthState,
    principal: &Principal,
    request: UpdateProfileRequest,
) -> Result<UserResponse, FlowError> {
    if !valid_name(&request.name) {
        return Err(FlowError::validation(
            "name_too_short",
            "Name must be at least 2 characters.",
        ));
    }
    let name = request.name.trim().to_string();

    match state.directory().update_name(principal.user.id, &name).await {
        Ok(()) => {}
        Err(DirectoryError::NotFound) => return Err(account_missing()),
        Err(err) => return Err(err.into()),
    }

    let mut user = principal.user.clone();
    user.name = name;
    Ok(UserResponse::from(user))
}

/// Replace the caller's password after re-proving the current one.
///
/// # Errors
/// Validation failures, `invalid_credentials` on a wrong current password,
/// `password_reuse`, `oauth_account`, and upstream failures.
pub async fn change_password(
    state: &AuthState,
    principal: &Principal,
    request: ChangePasswordRequest,
) -> Result<MessageResponse, FlowError> {
    if request.current_password.is_empty() || request.new_password.is_empty() {
        return Err(FlowError::validation(
            "missing_fields",
            "Current and new password are required.",
        ));
    }

    if request.new_password.chars().count() < state.config().min_password_length() {
        return Err(FlowError::validation(
            "password_too_short",
            format!(
                "Password must be at least {} characters.",
                state.config().min_password_length()
            ),
        ));
    }

    if principal.user.provider != Provider::Local {
        return Err(FlowError::validation(
            "oauth_account",
            "This account signs in through an external provider.",
        ));
    }

    let Some(hash) = principal.user.password_hash.as_deref() else {
        return Err(FlowError::upstream(
            "store_unavailable",
            "Service temporarily unavailable. Please try again.",
        ));
    };

    if !verify_password(&request.current_password, hash)? {
        return Err(FlowError::auth(
            "invalid_credentials",
            "Current password is incorrect.",
        ));
    }

    if verify_password(&request.new_password, hash)? {
        return Err(FlowError::validation(
            "password_reuse",
            "New password must differ from the current password.",
        ));
    }

    let new_hash = hash_password(&request.new_password)?;
    match state
        .directory()
        .update_password(principal.user.id, &new_hash)
        .await
    {
        Ok(()) => {}
        Err(DirectoryError::NotFound) => return Err(account_missing()),
        Err(err) => return Err(err.into()),
    }

    info!(user_id = %principal.user.id, "Password changed");
    Ok(MessageResponse::new("Password changed."))
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The authenticated user's profile.", body = UserResponse),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
    ),
    tag = "me"
)]
pub async fn get_me(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    match Principal::resolve(&headers, &state).await {
        Ok(principal) => (StatusCode::OK, Json(UserResponse::from(principal.user))).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    patch,
    path = "/v1/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated.", body = UserResponse),
        (status = 400, description = "Invalid payload.", body = ErrorBody),
        (status = 401, description = "Missing or invalid access token.", body = ErrorBody),
    ),
    tag = "me"
)]
#[instrument(skip(headers, state, payload))]
pub async fn update_me(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<UpdateProfileRequest>>,
) -> Response {
    let principal = match Principal::resolve(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match update_profile(&state, &principal, request).await {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed.", body = MessageResponse),
        (status = 400, description = "Invalid payload or password policy violation.", body = ErrorBody),
        (status = 401, description = "Missing token or wrong current password.", body = ErrorBody),
    ),
    tag = "me"
)]
#[instrument(skip(headers, state, payload))]
pub async fn update_me_password(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    let principal = match Principal::resolve(&headers, &state).await {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };

    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match change_password(&state, &principal, request).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(err) => err.into_response(),
    }
}
