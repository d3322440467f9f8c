#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` installs the process-wide [`tracing`] subscriber used by every
//! DTail program and defines the DTail log line layout:
//!
//! ```text
//! SEVERITY|YYYYMMDD-HHMMSS|message|key=value|…
//! ```
//!
//! # Design
//!
//! - [`LogLevel`] is the user-facing threshold (`error` … `trace`), parsed
//!   from `-logLevel` and the configuration file. It converts to an
//!   [`tracing_subscriber::EnvFilter`] directive; `RUST_LOG` wins when set.
//! - [`DtailFormat`] renders events in the layout above.
//! - Output always goes to stderr so stdout carries only streamed content.
//!
//! # Errors
//!
//! [`init`] fails when a subscriber is already installed or when the filter
//! directive does not parse; both surface as [`LoggingError`].
//!
//! # Examples
//!
//! ```
//! use logging::LogLevel;
//!
//! let level: LogLevel = "verbose".parse().unwrap();
//! assert!(level > LogLevel::Info);
//! assert!(level.directive().contains("server=debug"));
//! ```

mod levels;
mod tracing_bridge;

pub use levels::{LogLevel, WORKSPACE_TARGETS};
pub use tracing_bridge::{DtailFormat, TIME_FORMAT, env_filter, init, init_with_writer};

/// Errors raised while configuring logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A level name was not recognised.
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    /// The derived filter directive did not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    /// A global subscriber was already installed.
    #[error("unable to install log subscriber: {0}")]
    Init(String),
}
