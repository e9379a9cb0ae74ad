//! API handlers.
//!
//! `auth` carries the account flows together with their backing stores;
//! `health` is the unauthenticated liveness endpoint.

pub mod auth;

pub mod health;
pub use self::health::health;
