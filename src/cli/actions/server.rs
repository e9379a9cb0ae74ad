use crate::api::{
    self,
    handlers::auth::{AuthConfig, OtpPolicy, TokenKeys},
    mail::{HttpMailer, LogMailer, Mailer},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::warn;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub min_password_length: usize,
    pub otp_code_digits: u32,
    pub otp_code_ttl_seconds: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_request_limit: u32,
    pub otp_request_window_seconds: i64,
    pub otp_spam_lock_seconds: i64,
    pub otp_failure_limit: u32,
    pub otp_failure_window_seconds: i64,
    pub otp_lock_seconds: i64,
    pub mail_endpoint: Option<String>,
    pub mail_api_key: Option<String>,
    pub mail_from: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the mail endpoint is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let keys = TokenKeys::new(
        SecretString::from(args.access_token_secret),
        SecretString::from(args.refresh_token_secret),
    )
    .with_access_ttl_seconds(args.access_token_ttl_seconds)
    .with_refresh_ttl_seconds(args.refresh_token_ttl_seconds);

    let policy = OtpPolicy::new()
        .with_code_digits(args.otp_code_digits)
        .with_code_ttl_seconds(args.otp_code_ttl_seconds)
        .with_cooldown_seconds(args.otp_resend_cooldown_seconds)
        .with_request_limit(args.otp_request_limit)
        .with_request_window_seconds(args.otp_request_window_seconds)
        .with_spam_lock_seconds(args.otp_spam_lock_seconds)
        .with_failure_limit(args.otp_failure_limit)
        .with_failure_window_seconds(args.otp_failure_window_seconds)
        .with_lock_seconds(args.otp_lock_seconds);

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_min_password_length(args.min_password_length)
        .with_otp_policy(policy);

    let mailer: Arc<dyn Mailer> = if let Some(endpoint) = args.mail_endpoint {
        let endpoint = Url::parse(&endpoint).context("Invalid mail endpoint URL")?;
        let api_key = args
            .mail_api_key
            .context("Mail API key is required when a mail endpoint is set")?;
        Arc::new(HttpMailer::new(
            endpoint,
            SecretString::from(api_key),
            args.mail_from,
        )?)
    } else {
        warn!("No mail endpoint configured, one-time codes will be logged instead of delivered");
        Arc::new(LogMailer)
    };

    api::new(args.port, args.dsn, auth_config, keys, mailer).await
}
