//! OpenAPI document for the HTTP surface.
//!
//! The same document backs Swagger UI and the `openapi` binary, which
//! prints it for spec diffing in CI.

use crate::api::handlers::auth::{error, login, profile, recovery, registration, types};
use crate::api::handlers::health;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        registration::register,
        registration::register_verify,
        login::login,
        login::refresh,
        login::logout,
        recovery::recover,
        recovery::recover_verify,
        recovery::reset_password,
        profile::get_me,
        profile::update_me,
        profile::update_me_password,
    ),
    components(schemas(
        health::Health,
        error::ErrorBody,
        types::RegisterStartRequest,
        types::RegisterVerifyRequest,
        types::LoginRequest,
        types::RecoverStartRequest,
        types::RecoverVerifyRequest,
        types::ResetPasswordRequest,
        types::ChangePasswordRequest,
        types::UpdateProfileRequest,
        types::UserResponse,
        types::MessageResponse,
    )),
    tags(
        (name = "auth", description = "Registration, login, recovery, and session rotation"),
        (name = "me", description = "Authenticated self-service"),
        (name = "health", description = "Liveness and build info")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_covers_every_route() {
        let doc = openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/health",
            "/v1/auth/register",
            "/v1/auth/register/verify",
            "/v1/auth/login",
            "/v1/auth/refresh",
            "/v1/auth/logout",
            "/v1/auth/recover",
            "/v1/auth/recover/verify",
            "/v1/auth/recover/reset",
            "/v1/me",
            "/v1/me/password",
        ] {
            assert!(paths.contains_key(path), "missing path: {path}");
        }
    }
}
