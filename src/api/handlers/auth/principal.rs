//! Caller identity for authenticated operations.
//!
//! Handlers resolve the caller explicitly and pass it into the flow, so
//! nothing downstream depends on ambient request state.

use super::directory::UserRecord;
use super::error::FlowError;
use super::session;
use super::state::AuthState;
use super::tokens::unix_now;
use axum::http::HeaderMap;

#[derive(Clone, Debug)]
pub struct Principal {
    pub user: UserRecord,
}

impl Principal {
    /// Resolve the caller from the access token, then re-resolve the
    /// subject against the directory so tokens for deleted accounts die
    /// immediately.
    ///
    /// # Errors
    /// `token_missing` when no token is presented, the token failure class
    /// otherwise, and `account_missing` when the subject is gone.
    pub async fn resolve(headers: &HeaderMap, state: &AuthState) -> Result<Self, FlowError> {
        let Some(token) = session::access_token_from_headers(headers) else {
            return Err(FlowError::auth("token_missing", "Authentication required."));
        };

        let claims = state.keys().verify_access(&token, unix_now())?;
        let subject = claims.subject()?;

        let user = state
            .directory()
            .find_by_id(subject)
            .await?
            .ok_or_else(|| FlowError::auth("account_missing", "Account no longer exists."))?;

        Ok(Self { user })
    }
}
