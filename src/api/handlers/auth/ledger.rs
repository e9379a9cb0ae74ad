//! Expiring key-value ledger shared by every service instance.
//!
//! All OTP state and rate-limit flags live behind this trait so the same
//! flow logic runs against the Postgres-backed store in production and an
//! in-memory map in tests. Keys are namespaced by purpose prefix plus the
//! normalized email, e.g. `otp_cooldown:{email}`; no key ever spans users.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The backing store could not serve the call.
#[derive(Debug, Error)]
#[error("ledger unavailable: {0}")]
pub struct LedgerError(pub(crate) String);

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch the live value for a key. Expired and absent keys are
    /// indistinguishable.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;

    /// Upsert a value, resetting its TTL.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl_seconds: i64)
        -> Result<(), LedgerError>;

    /// Atomically increment a counter, creating it at 1 when absent or
    /// expired. The TTL is refreshed on every call (rolling window).
    /// Returns the count after the increment. The increment happens at the
    /// store, never as a read-modify-write from the caller.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64, LedgerError>;

    /// Remove the listed keys, returning how many live entries were
    /// actually removed. For any single live key, exactly one concurrent
    /// caller observes a count of 1; everyone else sees 0.
    ///
    /// # Errors
    /// Returns an error if the store is unreachable.
    async fn delete(&self, keys: &[String]) -> Result<u64, LedgerError>;
}

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local ledger for tests and single-instance dev runs.
///
/// TTLs are tracked against `Instant`; a TTL of zero produces an entry
/// that is already expired, which tests use to simulate elapsed windows.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>, LedgerError> {
        self.entries
            .lock()
            .map_err(|_| LedgerError("poisoned ledger lock".to_string()))
    }
}

fn expiry(ttl_seconds: i64) -> Instant {
    let ttl = u64::try_from(ttl_seconds).unwrap_or(0);
    Instant::now() + Duration::from_secs(ttl)
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        if let Some(entry) = entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        entries.remove(key);
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), LedgerError> {
        let mut entries = self.lock()?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: expiry(ttl_seconds),
            },
        );
        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64, LedgerError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let count = match entries.get(key) {
            Some(entry) if entry.is_live(now) => entry.value.parse::<i64>().unwrap_or(0) + 1,
            _ => 1,
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at: expiry(ttl_seconds),
            },
        );
        Ok(count)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, LedgerError> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = entries.remove(key) {
                if entry.is_live(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}
