//! Session token minting and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with independent
//! secrets, carrying `{sub, role, iat, exp}`. Verification takes the
//! caller's clock so expiry behavior is exact and testable: a token is
//! valid strictly while `now < exp`. Nothing is persisted server-side;
//! rotation on refresh plus the short refresh lifetime bound exposure.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use super::directory::Role;

pub const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
    #[error("token subject is not a valid id")]
    InvalidSubject,
    #[error("token signing failed: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// # Errors
    /// Returns an error if the subject claim is not a UUID.
    pub fn subject(&self) -> Result<Uuid, TokenError> {
        Uuid::parse_str(&self.sub).map_err(|_| TokenError::InvalidSubject)
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Signing material and lifetimes for the session pair.
#[derive(Debug)]
pub struct TokenKeys {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenKeys {
    #[must_use]
    pub fn new(access_secret: SecretString, refresh_secret: SecretString) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.access_ttl_seconds = ttl_seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, ttl_seconds: i64) -> Self {
        self.refresh_ttl_seconds = ttl_seconds;
        self
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    /// Mint a fresh access/refresh pair for a subject.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn mint_pair(
        &self,
        subject: Uuid,
        role: Role,
        now_unix_seconds: i64,
    ) -> Result<TokenPair, TokenError> {
        let access = mint(
            &self.access_secret,
            subject,
            role,
            now_unix_seconds,
            self.access_ttl_seconds,
        )?;
        let refresh = mint(
            &self.refresh_secret,
            subject,
            role,
            now_unix_seconds,
            self.refresh_ttl_seconds,
        )?;
        Ok(TokenPair { access, refresh })
    }

    /// # Errors
    /// Returns an error on a bad signature, malformed token, or expiry.
    pub fn verify_access(
        &self,
        token: &str,
        now_unix_seconds: i64,
    ) -> Result<SessionClaims, TokenError> {
        verify(&self.access_secret, token, now_unix_seconds)
    }

    /// # Errors
    /// Returns an error on a bad signature, malformed token, or expiry.
    pub fn verify_refresh(
        &self,
        token: &str,
        now_unix_seconds: i64,
    ) -> Result<SessionClaims, TokenError> {
        verify(&self.refresh_secret, token, now_unix_seconds)
    }
}

fn mint(
    secret: &SecretString,
    subject: Uuid,
    role: Role,
    now_unix_seconds: i64,
    ttl_seconds: i64,
) -> Result<String, TokenError> {
    let claims = SessionClaims {
        sub: subject.to_string(),
        role,
        iat: now_unix_seconds,
        exp: now_unix_seconds + ttl_seconds,
    };
    let key = EncodingKey::from_secret(secret.expose_secret().as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &key)
        .map_err(|err| TokenError::Signing(err.to_string()))
}

fn verify(secret: &SecretString, token: &str, now_unix_seconds: i64) -> Result<SessionClaims, TokenError> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is checked against the injected clock below, not the system
    // clock the library would consult.
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims(&["exp"]);

    let data = decode::<SessionClaims>(token, &key, &validation).map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Malformed,
    })?;

    if now_unix_seconds >= data.claims.exp {
        return Err(TokenError::Expired);
    }

    Ok(data.claims)
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn keys() -> TokenKeys {
        TokenKeys::new(
            SecretString::from("access-secret-for-tests"),
            SecretString::from("refresh-secret-for-tests"),
        )
        .with_access_ttl_seconds(900)
        .with_refresh_ttl_seconds(3600)
    }

    #[test]
    fn mint_and_verify_round_trip() {
        let keys = keys();
        let subject = Uuid::new_v4();
        let pair = keys.mint_pair(subject, Role::User, NOW).unwrap();

        let access = keys.verify_access(&pair.access, NOW + 1).unwrap();
        assert_eq!(access.subject().unwrap(), subject);
        assert_eq!(access.role, Role::User);
        assert_eq!(access.iat, NOW);
        assert_eq!(access.exp, NOW + 900);

        let refresh = keys.verify_refresh(&pair.refresh, NOW + 1).unwrap();
        assert_eq!(refresh.exp, NOW + 3600);
    }

    #[test]
    fn verification_holds_until_one_second_before_expiry() {
        let keys = keys();
        let pair = keys.mint_pair(Uuid::new_v4(), Role::Admin, NOW).unwrap();
        assert!(keys.verify_access(&pair.access, NOW + 899).is_ok());
        assert_eq!(
            keys.verify_access(&pair.access, NOW + 900),
            Err(TokenError::Expired)
        );
        assert_eq!(
            keys.verify_access(&pair.access, NOW + 901),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn access_token_is_rejected_by_the_refresh_key() {
        let keys = keys();
        let pair = keys.mint_pair(Uuid::new_v4(), Role::User, NOW).unwrap();
        assert_eq!(
            keys.verify_refresh(&pair.access, NOW + 1),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn tampered_token_fails_verification() {
        let keys = keys();
        let pair = keys.mint_pair(Uuid::new_v4(), Role::User, NOW).unwrap();
        let mut tampered = pair.access.clone();
        tampered.pop();
        tampered.push('A');
        assert!(matches!(
            keys.verify_access(&tampered, NOW + 1),
            Err(TokenError::InvalidSignature | TokenError::Malformed)
        ));
    }

    #[test]
    fn garbage_input_is_malformed() {
        let keys = keys();
        assert_eq!(
            keys.verify_access("definitely.not.a.token", NOW),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let claims = SessionClaims {
            sub: "not-a-uuid".to_string(),
            role: Role::User,
            iat: NOW,
            exp: NOW + 900,
        };
        assert_eq!(claims.subject(), Err(TokenError::InvalidSubject));
    }

    #[test]
    fn role_claim_uses_lowercase_wire_names() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, r#""admin""#);
        let parsed: Role = serde_json::from_str(r#""user""#).unwrap();
        assert_eq!(parsed, Role::User);
    }
}
