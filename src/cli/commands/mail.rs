use clap::{Arg, Command};

pub const ARG_MAIL_ENDPOINT: &str = "mail-endpoint";
pub const ARG_MAIL_API_KEY: &str = "mail-api-key";
pub const ARG_MAIL_FROM: &str = "mail-from";

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAIL_ENDPOINT)
                .long("mail-endpoint")
                .help("Mail API endpoint; when unset, messages are logged instead of delivered")
                .env("PORDISTO_MAIL_ENDPOINT"),
        )
        .arg(
            Arg::new(ARG_MAIL_API_KEY)
                .long("mail-api-key")
                .help("Bearer token for the mail API")
                .env("PORDISTO_MAIL_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM)
                .long("mail-from")
                .help("Sender address for outgoing mail")
                .env("PORDISTO_MAIL_FROM")
                .default_value("no-reply@pordisto.dev"),
        )
}
