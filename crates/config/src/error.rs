use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("unable to read config file {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::Config`].
    #[error("unable to parse config file {path}: {source}")]
    Json {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A permission rule carries an invalid regular expression.
    #[error("invalid permission rule '{rule}': {source}")]
    Permission {
        /// The rule as written.
        rule: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
