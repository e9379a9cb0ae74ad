//! Auth handlers and supporting modules.
//!
//! Registration and password recovery prove control of an email address
//! with short-lived one-time codes; login and refresh mint the session
//! token pair; the `/v1/me` handlers cover authenticated self-service.
//!
//! ## Abuse control
//!
//! Every code issuance runs three ledger-backed gates in priority order:
//! account lock (too many wrong guesses), spam lock (too many requests in
//! a rolling hour), and resend cooldown. The gates and counters live in
//! the shared ledger, so any number of service instances enforce them as
//! one. Counters are incremented atomically by the store, never via
//! read-modify-write from here.

pub(crate) mod credentials;
pub(crate) mod directory;
pub(crate) mod error;
pub(crate) mod ledger;
pub(crate) mod login;
pub(crate) mod otp;
pub(crate) mod principal;
pub(crate) mod profile;
pub(crate) mod recovery;
pub(crate) mod registration;
pub(crate) mod session;
mod state;
pub(crate) mod storage;
pub(crate) mod tokens;
pub(crate) mod types;

pub use otp::OtpPolicy;
pub use state::{AuthConfig, AuthState};
pub use storage::{spawn_expiry_sweeper, PgLedger, PgUserDirectory};
pub use tokens::TokenKeys;

#[cfg(test)]
pub(crate) mod support;
