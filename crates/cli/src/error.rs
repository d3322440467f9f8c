use std::io;

use thiserror::Error;

/// Failures that end a program before or outside its sessions.
#[derive(Debug, Error)]
pub enum CliError {
    /// The flags do not describe a runnable request.
    #[error("{0}")]
    Usage(String),
    /// The configuration file is unusable.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Logging could not be set up.
    #[error(transparent)]
    Logging(#[from] logging::LoggingError),
    /// A client run could not be prepared or reported.
    #[error(transparent)]
    Client(#[from] client::ClientError),
    /// The `-regex` flag does not compile.
    #[error(transparent)]
    Filter(#[from] filters::FilterError),
    /// The `-query` flag does not parse.
    #[error(transparent)]
    Query(#[from] mapr::QueryError),
    /// The server stopped with an error.
    #[error(transparent)]
    Server(#[from] server::ServerError),
    /// The async runtime could not start.
    #[error("starting runtime: {0}")]
    Runtime(#[source] io::Error),
}

impl CliError {
    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}
