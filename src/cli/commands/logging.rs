use clap::{builder::ValueParser, Arg, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn parse_log_level(level: &str) -> std::result::Result<u8, String> {
    let wanted = level.to_lowercase();

    if let Some(index) = LEVEL_NAMES.iter().position(|name| *name == wanted) {
        return u8::try_from(index).map_err(|error| error.to_string());
    }

    match wanted.parse::<u8>() {
        Ok(count) if usize::from(count) < LEVEL_NAMES.len() => Ok(count),
        _ => Err(format!("invalid log level: {level}")),
    }
}

/// Accepts a level name or its numeric index, case-insensitive
#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(parse_log_level)
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Log verbosity, repeatable (-vv = info); the env var also takes a level name")
            .env("PORDISTO_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}
