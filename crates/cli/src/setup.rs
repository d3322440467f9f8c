//! Start-up steps shared by every program.

use std::path::Path;

use config::Config;
use logging::{LogLevel, LoggingError};
use tokio::runtime::Runtime;

use crate::error::CliError;

/// Loads `-cfg`; a missing flag means built-in defaults plus environment.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config, CliError> {
    Ok(Config::load(path)?)
}

/// The effective log level: `-logLevel` over the configuration, capped at
/// `warn` for quiet runs.
pub(crate) fn log_level(config: &Config, flag: Option<&str>, quiet: bool) -> Result<LogLevel, CliError> {
    let level = match flag.filter(|flag| !flag.is_empty()) {
        Some(flag) => flag.parse::<LogLevel>()?,
        None => config.common.log_level,
    };
    Ok(if quiet { level.min(LogLevel::Warn) } else { level })
}

/// Installs the subscriber. A subscriber installed earlier in the process
/// stays in place.
pub(crate) fn init_logging(level: LogLevel) -> Result<(), CliError> {
    match logging::init(level) {
        Ok(()) | Err(LoggingError::Init(_)) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn runtime() -> Result<Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)
}
