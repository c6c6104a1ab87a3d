//! Logging setup.
//!
//! Log output goes to stderr. Data meant for the user (domain lists, dry-run mails) is written to
//! stdout and never passes through the logger.

use anyhow::format_err;

pub use tracing_subscriber::filter::LevelFilter;

/// Environment variable to change the log level of the `hedup` binary.
pub const LOG_ENV_VAR: &str = "HEDUP_LOG";

/// The log level set in `env_var`, or `default` if it is unset or not a level.
pub fn level_from_env(env_var: &str, default: LevelFilter) -> LevelFilter {
    match std::env::var(env_var) {
        Ok(value) => value.parse().unwrap_or_else(|err| {
            eprintln!("ignoring {env_var}={value:?} - {err}");
            default
        }),
        Err(_) => default,
    }
}

/// Log events up to `level` to stderr, one line each, without level, target or timestamp.
///
/// Can only be called once per process.
pub fn init(level: LevelFilter) -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact()
        .try_init()
        .map_err(|err| format_err!("unable to initialize logging - {err}"))
}
