use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by a client run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server list could not be produced.
    #[error("discovery: {0}")]
    Discovery(String),
    /// A server list file could not be read.
    #[error("{}: {source}", path.display())]
    ServerList {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// Dialing or authentication failed.
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
    /// The server stream carried something undecodable.
    #[error(transparent)]
    Protocol(#[from] protocol::ProtocolError),
    /// Sending a command took longer than allowed.
    #[error("sending command to {0} timed out")]
    CommandTimeout(String),
    /// The map-reduce query is invalid.
    #[error(transparent)]
    Query(#[from] mapr::QueryError),
    /// Partial aggregates could not be merged.
    #[error(transparent)]
    Aggregate(#[from] mapr::AggregateError),
    /// The result file could not be written.
    #[error(transparent)]
    Output(#[from] mapr::OutputError),
    /// The regex does not compile.
    #[error(transparent)]
    Filter(#[from] filters::FilterError),
    /// Any other I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Whether the server was rejected by the host key check.
    pub const fn is_untrusted(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_untrusted())
    }
}
