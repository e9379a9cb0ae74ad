use crate::api::handlers::{auth, health};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod mail;
mod openapi;

pub use openapi::openapi;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Connect to Postgres, assemble the router, and serve until ctrl-c.
///
/// # Errors
///
/// Returns an error if the database is unreachable, the frontend base URL
/// is not a usable origin, or the listener cannot bind
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    keys: auth::TokenKeys,
    mailer: Arc<dyn mail::Mailer>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(120))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let ledger = Arc::new(auth::PgLedger::new(pool.clone()));
    let directory = Arc::new(auth::PgUserDirectory::new(pool.clone()));

    // Background task deletes expired ledger rows so the table stays small.
    auth::spawn_expiry_sweeper(pool.clone(), Duration::ZERO);

    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        ledger,
        directory,
        mailer,
        keys,
    ));

    // Cookies require credentialed CORS, so the origin must be exact.
    let origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_origin(AllowOrigin::exact(origin))
        .allow_credentials(true);

    let app = router(auth_state, pool, cors);

    let listener = TcpListener::bind(("::", port)).await?;

    info!("Listening on [::]:{port}");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

fn router(auth_state: Arc<auth::AuthState>, pool: PgPool, cors: CorsLayer) -> Router {
    Router::new()
        .route("/v1/auth/register", post(auth::registration::register))
        .route(
            "/v1/auth/register/verify",
            post(auth::registration::register_verify),
        )
        .route("/v1/auth/login", post(auth::login::login))
        .route("/v1/auth/refresh", post(auth::login::refresh))
        .route("/v1/auth/logout", post(auth::login::logout))
        .route("/v1/auth/recover", post(auth::recovery::recover))
        .route(
            "/v1/auth/recover/verify",
            post(auth::recovery::recover_verify),
        )
        .route(
            "/v1/auth/recover/reset",
            post(auth::recovery::reset_password),
        )
        .route(
            "/v1/me",
            get(auth::profile::get_me).patch(auth::profile::update_me),
        )
        .route("/v1/me/password", post(auth::profile::update_me_password))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static(REQUEST_ID_HEADER),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    REQUEST_ID_HEADER,
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool.clone())),
        )
        .route("/health", get(health::health).options(health::health))
        .layer(Extension(pool))
}

fn make_span(request: &Request<Body>) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("none");

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = route,
        request_id
    )
}

fn frontend_origin(base_url: &str) -> Result<HeaderValue> {
    let url =
        Url::parse(base_url).with_context(|| format!("Invalid frontend base URL: {base_url}"))?;

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Frontend base URL must include a valid host: {base_url}"))?;

    let origin = match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    };

    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_paths() -> Result<()> {
        let origin = frontend_origin("https://app.example.com/welcome?x=1")?;
        assert_eq!(origin, HeaderValue::from_static("https://app.example.com"));
        Ok(())
    }

    #[test]
    fn frontend_origin_keeps_explicit_ports() -> Result<()> {
        let origin = frontend_origin("http://localhost:5173")?;
        assert_eq!(origin, HeaderValue::from_static("http://localhost:5173"));
        Ok(())
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
