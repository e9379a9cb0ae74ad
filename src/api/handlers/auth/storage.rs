//! Postgres-backed ledger and user directory.
//!
//! Expected schema, applied out of band:
//!
//! ```sql
//! CREATE TABLE auth_kv (
//!     key        TEXT PRIMARY KEY,
//!     value      TEXT NOT NULL,
//!     expires_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE users (
//!     id            UUID PRIMARY KEY,
//!     name          TEXT NOT NULL,
//!     email         TEXT NOT NULL UNIQUE,
//!     password_hash TEXT,
//!     is_verified   BOOLEAN NOT NULL DEFAULT FALSE,
//!     role          TEXT NOT NULL DEFAULT 'user',
//!     provider      TEXT NOT NULL DEFAULT 'local',
//!     created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! Every ledger statement filters on `expires_at`, so expired rows are
//! invisible the moment they lapse; a background task sweeps them out
//! physically. Counter increments happen inside a single upsert, which is
//! what makes them safe across service instances.

use super::directory::{
    CreateOutcome, DirectoryError, NewUser, Provider, Role, UserDirectory, UserRecord,
};
use super::ledger::{Ledger, LedgerError};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self(err.to_string())
    }
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Ledger entries live in a single keyed table shared by all instances.
#[derive(Clone, Debug)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        let query = "SELECT value FROM auth_kv WHERE key = $1 AND expires_at > NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl_seconds: i64,
    ) -> Result<(), LedgerError> {
        let query = r"
            INSERT INTO auth_kv (key, value, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(ttl_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(())
    }

    async fn incr_with_ttl(&self, key: &str, ttl_seconds: i64) -> Result<i64, LedgerError> {
        // One statement so concurrent callers cannot under-count. A row
        // whose TTL lapsed restarts at 1 instead of resuming the old run.
        let query = r"
            INSERT INTO auth_kv AS kv (key, value, expires_at)
            VALUES ($1, '1', NOW() + ($2 * INTERVAL '1 second'))
            ON CONFLICT (key) DO UPDATE
            SET value = CASE
                    WHEN kv.expires_at <= NOW() THEN '1'
                    ELSE ((kv.value)::bigint + 1)::text
                END,
                expires_at = NOW() + ($2 * INTERVAL '1 second')
            RETURNING (value)::bigint AS count
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(ttl_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;

        Ok(row.get("count"))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, LedgerError> {
        let query = "DELETE FROM auth_kv WHERE key = ANY($1) AND expires_at > NOW()";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(keys)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Spawn a background task that physically removes lapsed ledger rows.
pub fn spawn_expiry_sweeper(pool: PgPool, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let poll_interval = if poll_interval.is_zero() {
            Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECONDS)
        } else {
            poll_interval
        };

        loop {
            sleep(poll_interval).await;
            match sweep_expired(&pool).await {
                Ok(0) => {}
                Ok(count) => debug!("Swept {count} expired ledger rows"),
                Err(err) => error!("Ledger sweep failed: {err}"),
            }
        }
    })
}

async fn sweep_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let query = "DELETE FROM auth_kv WHERE expires_at <= NOW()";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query).execute(pool).instrument(span).await?;
    Ok(result.rows_affected())
}

#[derive(Clone, Debug)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn record_from_row(row: &PgRow) -> Result<UserRecord, DirectoryError> {
    Ok(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_verified: row.get("is_verified"),
        role: Role::parse(&row.get::<String, _>("role"))?,
        provider: Provider::parse(&row.get::<String, _>("provider"))?,
    })
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let query = r"
            SELECT id, name, email, password_hash, is_verified, role, provider
            FROM users
            WHERE email = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        let query = r"
            SELECT id, name, email, password_hash, is_verified, role, provider
            FROM users
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn create(&self, new_user: NewUser) -> Result<CreateOutcome, DirectoryError> {
        let id = Uuid::new_v4();
        // The unique index on email is the race guard: the slower of two
        // concurrent registrations sees zero rows affected.
        let query = r"
            INSERT INTO users (id, name, email, password_hash, is_verified, role, provider)
            VALUES ($1, $2, $3, $4, TRUE, 'user', 'local')
            ON CONFLICT (email) DO NOTHING
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(&new_user.name)
            .bind(&new_user.email)
            .bind(&new_user.password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(CreateOutcome::EmailTaken);
        }

        Ok(CreateOutcome::Created(UserRecord {
            id,
            name: new_user.name,
            email: new_user.email,
            password_hash: Some(new_user.password_hash),
            is_verified: true,
            role: Role::User,
            provider: Provider::Local,
        }))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DirectoryError> {
        let query = "UPDATE users SET password_hash = $2 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound);
        }
        Ok(())
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<(), DirectoryError> {
        let query = "UPDATE users SET name = $2 WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .instrument(span)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlx_errors_surface_as_unavailable() {
        let ledger_err = LedgerError::from(sqlx::Error::RowNotFound);
        assert!(!ledger_err.to_string().is_empty());

        let directory_err = DirectoryError::from(sqlx::Error::PoolClosed);
        assert!(matches!(directory_err, DirectoryError::Unavailable(_)));
    }
}
