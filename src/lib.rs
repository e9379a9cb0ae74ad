//! # Pordisto (Email OTP Authentication Authority)
//!
//! `pordisto` issues one-time codes over email for account registration and
//! password recovery, and mints the JWT session tokens the rest of the
//! platform consumes.
//!
//! ## Flows
//!
//! - **Registration:** accounts start unverified; a short numeric code sent to
//!   the address proves ownership before the first session is minted.
//! - **Login:** verified accounts exchange email and password for an
//!   access/refresh token pair; unverified accounts get a fresh code instead.
//! - **Recovery:** a code proves address ownership, and the resulting
//!   short-lived grant allows exactly one password reset.
//!
//! ## Abuse control
//!
//! Every code issue and verification runs through a shared expiring ledger
//! (Postgres-backed in production): resend cooldowns, rolling request windows
//! that end in a spam lock, and failure counters that lock verification.
//! Counters are incremented atomically by the store so concurrent requests
//! cannot undercount.
//!
//! ## Sessions
//!
//! Access and refresh tokens are HS256 JWTs signed with separate secrets.
//! Refresh rotates the pair and re-reads the account, so role changes and
//! deletions take effect at the next rotation.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
