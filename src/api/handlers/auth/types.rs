//! Request and response bodies for the auth endpoints.

use super::directory::UserRecord;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterStartRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterVerifyRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoverStartRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoverVerifyRequest {
    pub email: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateProfileRequest {
    pub name: String,
}

/// Public view of a directory record. Never carries the password hash.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub is_verified: bool,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            role: user.role.as_str().to_string(),
            is_verified: user.is_verified,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::directory::{Provider, Role};
    use anyhow::Result;
    use uuid::Uuid;

    #[test]
    fn user_response_hides_the_hash() -> Result<()> {
        let record = UserRecord {
            id: Uuid::new_v4(),
            name: "Tuj".to_string(),
            email: "tuj@example.com".to_string(),
            password_hash: Some("$argon2id$...".to_string()),
            is_verified: true,
            role: Role::User,
            provider: Provider::Local,
        };

        let response = UserResponse::from(record);
        let value = serde_json::to_value(&response)?;
        assert_eq!(value["role"], "user");
        assert_eq!(value["is_verified"], true);
        assert!(value.get("password_hash").is_none());
        Ok(())
    }

    #[test]
    fn requests_deserialize_from_snake_case_json() -> Result<()> {
        let body: RegisterVerifyRequest = serde_json::from_str(
            r#"{"name":"Tuj","email":"tuj@example.com","password":"hunter42","code":"123456"}"#,
        )?;
        assert_eq!(body.code, "123456");

        let change: ChangePasswordRequest = serde_json::from_str(
            r#"{"current_password":"old-pass","new_password":"new-pass"}"#,
        )?;
        assert_eq!(change.new_password, "new-pass");
        Ok(())
    }
}
