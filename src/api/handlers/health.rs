use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{debug, error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    database: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database is reachable", body = [Health]),
        (status = 503, description = "Database is unreachable", body = [Health])
    ),
    tag = "health"
)]
// axum handler for health, also answers OPTIONS with an empty body
pub async fn health(method: Method, pool: Extension<PgPool>) -> impl IntoResponse {
    let database = database_status(&pool).await;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: if database.is_ok() { "ok" } else { "error" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let mut headers = HeaderMap::new();
    match x_app_value(&health.name, &health.version, &health.commit).parse::<HeaderValue>() {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => {
            error!("Failed to build X-App header: {}", err);
        }
    }

    if database.is_ok() {
        debug!("Database connection is healthy");
    } else {
        debug!("Database connection is unhealthy");
    }

    match database {
        Ok(()) => (StatusCode::OK, headers, body),
        Err(status) => (status, headers, body),
    }
}

async fn database_status(pool: &PgPool) -> Result<(), StatusCode> {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = match pool.acquire().instrument(acquire_span).await {
        Ok(conn) => conn,
        Err(error) => {
            error!("Failed to acquire database connection: {}", error);
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    if let Err(error) = conn.ping().instrument(ping_span).await {
        error!("Failed to ping database: {}", error);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(())
}

/// `name:version:short-commit`, truncating the commit to seven characters.
fn x_app_value(name: &str, version: &str, commit: &str) -> String {
    let short_hash = if commit.len() > 7 { &commit[0..7] } else { "" };
    format!("{name}:{version}:{short_hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x_app_value_shortens_the_commit() {
        let value = x_app_value("pordisto", "0.1.0", "0123456789abcdef");
        assert_eq!(value, "pordisto:0.1.0:0123456");
    }

    #[test]
    fn x_app_value_drops_short_commits() {
        let value = x_app_value("pordisto", "0.1.0", "unknown");
        assert_eq!(value, "pordisto:0.1.0:");
    }
}
