//! Command-line argument dispatch and server initialization.
//!
//! Maps validated CLI arguments onto the action that starts the API server
//! with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{
    auth::{ARG_ACCESS_TOKEN_SECRET, ARG_REFRESH_TOKEN_SECRET},
    mail::{ARG_MAIL_API_KEY, ARG_MAIL_ENDPOINT, ARG_MAIL_FROM},
};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    // Mail endpoint and API key are only accepted as a pair
    crate::cli::commands::validate(matches).map_err(|e| anyhow::anyhow!(e))?;

    let access_token_secret = matches
        .get_one::<String>(ARG_ACCESS_TOKEN_SECRET)
        .cloned()
        .context("missing required argument: --access-token-secret")?;
    let refresh_token_secret = matches
        .get_one::<String>(ARG_REFRESH_TOKEN_SECRET)
        .cloned()
        .context("missing required argument: --refresh-token-secret")?;

    let frontend_base_url = matches
        .get_one::<String>("frontend-base-url")
        .cloned()
        .context("missing required argument: --frontend-base-url")?;

    let mail_endpoint = matches.get_one::<String>(ARG_MAIL_ENDPOINT).cloned();
    let mail_api_key = matches.get_one::<String>(ARG_MAIL_API_KEY).cloned();
    let mail_from = matches
        .get_one::<String>(ARG_MAIL_FROM)
        .cloned()
        .context("missing required argument: --mail-from")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        access_token_secret,
        refresh_token_secret,
        access_token_ttl_seconds: matches
            .get_one::<i64>("access-token-ttl-seconds")
            .copied()
            .unwrap_or(900),
        refresh_token_ttl_seconds: matches
            .get_one::<i64>("refresh-token-ttl-seconds")
            .copied()
            .unwrap_or(604_800),
        frontend_base_url,
        min_password_length: matches
            .get_one::<usize>("min-password-length")
            .copied()
            .unwrap_or(6),
        otp_code_digits: matches
            .get_one::<u32>("otp-code-digits")
            .copied()
            .unwrap_or(6),
        otp_code_ttl_seconds: matches
            .get_one::<i64>("otp-code-ttl-seconds")
            .copied()
            .unwrap_or(300),
        otp_resend_cooldown_seconds: matches
            .get_one::<i64>("otp-resend-cooldown-seconds")
            .copied()
            .unwrap_or(60),
        otp_request_limit: matches
            .get_one::<u32>("otp-request-limit")
            .copied()
            .unwrap_or(5),
        otp_request_window_seconds: matches
            .get_one::<i64>("otp-request-window-seconds")
            .copied()
            .unwrap_or(3600),
        otp_spam_lock_seconds: matches
            .get_one::<i64>("otp-spam-lock-seconds")
            .copied()
            .unwrap_or(3600),
        otp_failure_limit: matches
            .get_one::<u32>("otp-failure-limit")
            .copied()
            .unwrap_or(2),
        otp_failure_window_seconds: matches
            .get_one::<i64>("otp-failure-window-seconds")
            .copied()
            .unwrap_or(300),
        otp_lock_seconds: matches
            .get_one::<i64>("otp-lock-seconds")
            .copied()
            .unwrap_or(1800),
        mail_endpoint,
        mail_api_key,
        mail_from,
    }))
}
