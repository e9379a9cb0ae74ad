//! User directory contract and the records it serves.
//!
//! The directory is an external collaborator with a narrow surface: lookup
//! by normalized email or id, create, and the two permitted updates. The
//! auth flows never reach past this trait into storage details.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }

    /// # Errors
    /// Returns an error for values outside the known set.
    pub fn parse(value: &str) -> Result<Self, DirectoryError> {
        match value {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(DirectoryError::Corrupt(format!("unknown role: {other}"))),
        }
    }
}

/// How the account authenticates. Only `local` accounts carry a password
/// hash; `oauth` marks accounts owned by an external identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Oauth,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Oauth => "oauth",
        }
    }

    /// # Errors
    /// Returns an error for values outside the known set.
    pub fn parse(value: &str) -> Result<Self, DirectoryError> {
        match value {
            "local" => Ok(Self::Local),
            "oauth" => Ok(Self::Oauth),
            other => Err(DirectoryError::Corrupt(format!("unknown provider: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub is_verified: bool,
    pub role: Role,
    pub provider: Provider,
}

/// Fields for a local registration; the directory fills in the rest
/// (fresh id, verified, role `user`, provider `local`).
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Outcome of a create attempt; the conflict case is data, not an error,
/// because it is the race guard concurrent registrations rely on.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(UserRecord),
    EmailTaken,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
    #[error("user record not found")]
    NotFound,
    #[error("corrupt user record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// # Errors
    /// Returns an error if the directory is unreachable.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError>;

    /// # Errors
    /// Returns an error if the directory is unreachable.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, DirectoryError>;

    /// # Errors
    /// Returns an error if the directory is unreachable.
    async fn create(&self, new_user: NewUser) -> Result<CreateOutcome, DirectoryError>;

    /// # Errors
    /// Returns `NotFound` if the id no longer exists.
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DirectoryError>;

    /// # Errors
    /// Returns `NotFound` if the id no longer exists.
    async fn update_name(&self, id: Uuid, name: &str) -> Result<(), DirectoryError>;
}

/// Process-local directory for tests and single-instance dev runs.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: Mutex<HashMap<Uuid, UserRecord>>,
}

impl InMemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pre-built record, e.g. an unverified or oauth account.
    pub fn seed(&self, record: UserRecord) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(record.id, record);
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, UserRecord>>, DirectoryError> {
        self.users
            .lock()
            .map_err(|_| DirectoryError::Unavailable("poisoned directory lock".to_string()))
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.lock()?;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, DirectoryError> {
        let users = self.lock()?;
        Ok(users.get(&id).cloned())
    }

    async fn create(&self, new_user: NewUser) -> Result<CreateOutcome, DirectoryError> {
        let mut users = self.lock()?;
        if users.values().any(|user| user.email == new_user.email) {
            return Ok(CreateOutcome::EmailTaken);
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            password_hash: Some(new_user.password_hash),
            is_verified: true,
            role: Role::User,
            provider: Provider::Local,
        };
        users.insert(record.id, record.clone());
        Ok(CreateOutcome::Created(record))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), DirectoryError> {
        let mut users = self.lock()?;
        let user = users.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        user.password_hash = Some(password_hash.to_string());
        Ok(())
    }

    async fn update_name(&self, id: Uuid, name: &str) -> Result<(), DirectoryError> {
        let mut users = self.lock()?;
        let user = users.get_mut(&id).ok_or(DirectoryError::NotFound)?;
        user.name = name.to_string();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Ada".to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
        }
    }

    #[tokio::test]
    async fn create_then_find_by_email_and_id() {
        let directory = InMemoryDirectory::new();
        let outcome = directory.create(new_user("ada@example.com")).await.unwrap();
        let CreateOutcome::Created(record) = outcome else {
            panic!("expected creation");
        };
        assert!(record.is_verified);
        assert_eq!(record.role, Role::User);
        assert_eq!(record.provider, Provider::Local);

        let by_email = directory
            .find_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, record.id);
        let by_id = directory.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_reports_taken() {
        let directory = InMemoryDirectory::new();
        directory.create(new_user("ada@example.com")).await.unwrap();
        let outcome = directory.create(new_user("ada@example.com")).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::EmailTaken));
    }

    #[tokio::test]
    async fn updates_against_missing_id_report_not_found() {
        let directory = InMemoryDirectory::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            directory.update_password(missing, "$argon2id$x").await,
            Err(DirectoryError::NotFound)
        ));
        assert!(matches!(
            directory.update_name(missing, "Ada").await,
            Err(DirectoryError::NotFound)
        ));
    }

    #[test]
    fn role_and_provider_round_trip_their_wire_names() {
        assert_eq!(Role::parse("user").unwrap(), Role::User);
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(Provider::parse("oauth").unwrap(), Provider::Oauth);
        assert!(Role::parse("root").is_err());
        assert!(Provider::parse("saml").is_err());
    }
}
