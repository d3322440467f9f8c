use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while establishing or serving a session.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The SSH layer failed.
    #[error("ssh: {0}")]
    Ssh(#[from] russh::Error),

    /// A key could not be loaded or generated.
    #[error("ssh key: {0}")]
    Key(#[from] russh::keys::Error),

    /// A key could not be rendered in OpenSSH format.
    #[error("ssh key encoding: {0}")]
    KeyEncoding(String),

    /// Dialing did not complete within the configured timeout.
    #[error("connection to {0} timed out")]
    Timeout(String),

    /// The server refused every offered credential.
    #[error("authentication as {user} rejected by {address}")]
    AuthRejected {
        /// User that tried to log in.
        user: String,
        /// Server address.
        address: String,
    },

    /// The server's host key was rejected.
    #[error("host key of {0} is not trusted")]
    Untrusted(String),

    /// A key or known hosts file could not be read or written.
    #[error("{}: {source}", path.display())]
    File {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Plain I/O failure on a stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether this failure came from an untrusted host key verdict.
    pub const fn is_untrusted(&self) -> bool {
        matches!(self, Self::Untrusted(_))
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
