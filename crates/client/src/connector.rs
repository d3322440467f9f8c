//! Opening a session to one target, over SSH or in-process.

use std::fmt;
use std::sync::Arc;

use transport::{
    BoxedStream, DialOptions, SessionHandle, SessionHandler, SessionInfo, TrustStore,
    connect_serverless, dial,
};

use crate::discovery::Endpoint;
use crate::error::ClientError;

/// Name shown for the in-process target.
pub const SERVERLESS_NAME: &str = "serverless";

/// One place a session can be opened to.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Target {
    /// A remote server over SSH.
    Server(Endpoint),
    /// The server handler in this process.
    Serverless,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(endpoint) => endpoint.fmt(f),
            Self::Serverless => f.write_str(SERVERLESS_NAME),
        }
    }
}

/// Knows how to reach every kind of [`Target`].
#[derive(Clone)]
pub struct Connector {
    ssh: Option<(DialOptions, Arc<TrustStore>)>,
    local: Option<(Arc<dyn SessionHandler>, String)>,
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("ssh", &self.ssh.as_ref().map(|(options, _)| &options.user))
            .field("serverless", &self.local.is_some())
            .finish()
    }
}

/// An open session; dropping the handle closes the SSH connection.
pub struct OpenSession {
    /// The session byte stream.
    pub stream: BoxedStream,
    /// SSH connection, absent for serverless sessions.
    pub handle: Option<SessionHandle>,
}

impl Connector {
    /// Connects over SSH only.
    pub fn ssh(options: DialOptions, trust: Arc<TrustStore>) -> Self {
        Self {
            ssh: Some((options, trust)),
            local: None,
        }
    }

    /// Connects to `handler` in-process, as `user`.
    pub fn serverless(handler: Arc<dyn SessionHandler>, user: impl Into<String>) -> Self {
        Self {
            ssh: None,
            local: Some((handler, user.into())),
        }
    }

    /// Opens a session to `target`.
    ///
    /// # Errors
    ///
    /// Dial failures, or a target kind this connector was not set up for.
    pub async fn open(&self, target: &Target) -> Result<OpenSession, ClientError> {
        match target {
            Target::Server(endpoint) => {
                let (options, trust) = self.ssh.as_ref().ok_or_else(|| {
                    ClientError::Discovery(format!("no SSH settings to reach {endpoint}"))
                })?;
                let (stream, handle) = dial(&endpoint.host, endpoint.port, options, Arc::clone(trust)).await?;
                Ok(OpenSession {
                    stream,
                    handle: Some(handle),
                })
            }
            Target::Serverless => {
                let (handler, user) = self
                    .local
                    .as_ref()
                    .ok_or_else(|| ClientError::Discovery("serverless mode is not available".to_owned()))?;
                Ok(OpenSession {
                    stream: connect_serverless(Arc::clone(handler), SessionInfo::serverless(user.as_str())),
                    handle: None,
                })
            }
        }
    }
}
