use clap::{Arg, Command};

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_account_args(command);
    with_otp_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long("access-token-secret")
                .help("Signing secret for access tokens")
                .env("PORDISTO_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long("refresh-token-secret")
                .help("Signing secret for refresh tokens")
                .env("PORDISTO_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new("access-token-ttl-seconds")
                .long("access-token-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("PORDISTO_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-token-ttl-seconds")
                .long("refresh-token-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("PORDISTO_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_account_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("frontend-base-url")
                .long("frontend-base-url")
                .help("Frontend base URL, used for CORS and cookie security")
                .env("PORDISTO_FRONTEND_BASE_URL")
                .default_value("https://pordisto.dev"),
        )
        .arg(
            Arg::new("min-password-length")
                .long("min-password-length")
                .help("Minimum accepted password length")
                .env("PORDISTO_MIN_PASSWORD_LENGTH")
                .default_value("6")
                .value_parser(clap::value_parser!(usize)),
        )
}

fn with_otp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("otp-code-digits")
                .long("otp-code-digits")
                .help("Number of digits in one-time codes")
                .env("PORDISTO_OTP_CODE_DIGITS")
                .default_value("6")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("otp-code-ttl-seconds")
                .long("otp-code-ttl-seconds")
                .help("One-time code TTL in seconds")
                .env("PORDISTO_OTP_CODE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-resend-cooldown-seconds")
                .long("otp-resend-cooldown-seconds")
                .help("Cooldown before a code can be requested again")
                .env("PORDISTO_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-request-limit")
                .long("otp-request-limit")
                .help("Code requests allowed per address within the request window")
                .env("PORDISTO_OTP_REQUEST_LIMIT")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("otp-request-window-seconds")
                .long("otp-request-window-seconds")
                .help("Rolling window for the request counter")
                .env("PORDISTO_OTP_REQUEST_WINDOW_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-spam-lock-seconds")
                .long("otp-spam-lock-seconds")
                .help("Lockout after exceeding the request limit")
                .env("PORDISTO_OTP_SPAM_LOCK_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-failure-limit")
                .long("otp-failure-limit")
                .help("Wrong guesses allowed before the account is locked")
                .env("PORDISTO_OTP_FAILURE_LIMIT")
                .default_value("2")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("otp-failure-window-seconds")
                .long("otp-failure-window-seconds")
                .help("Rolling window for the wrong-guess counter")
                .env("PORDISTO_OTP_FAILURE_WINDOW_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-lock-seconds")
                .long("otp-lock-seconds")
                .help("Lockout after exceeding the failure limit")
                .env("PORDISTO_OTP_LOCK_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
}
