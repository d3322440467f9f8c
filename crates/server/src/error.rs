use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop the server or one of its jobs.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The SSH layer failed.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// The listener could not be bound.
    #[error("unable to bind {address}: {source}")]
    Bind {
        /// Address that was requested.
        address: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A job's query did not parse.
    #[error("job '{job}': {source}")]
    JobQuery {
        /// Job name.
        job: String,
        /// Parser error.
        #[source]
        source: mapr::QueryError,
    },
    /// A job could not set up or finish its run.
    #[error("job '{job}': {source}")]
    Job {
        /// Job name.
        job: String,
        /// Client-side failure.
        #[source]
        source: client::ClientError,
    },
    /// Any other I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a file reader stopped.
#[derive(Debug, Error)]
pub(crate) enum ReadError {
    #[error("unable to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} was truncated", path.display())]
    Truncated { path: PathBuf },
    #[error("unable to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
