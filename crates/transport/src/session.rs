//! The seam between a transport and the code serving a session.

use std::net::SocketAddr;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send {}

impl<T: AsyncRead + AsyncWrite + Send + ?Sized> AsyncStream for T {}

/// Owned, type-erased session stream.
pub type BoxedStream = Pin<Box<dyn AsyncStream>>;

/// What a session is allowed to do, decided at authentication time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionKind {
    /// A regular user session.
    Regular,
    /// The health check user; only `health` is accepted.
    Health,
    /// A scheduled or continuous job, by name.
    Job(String),
}

/// Facts about an authenticated session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SessionInfo {
    /// Authenticated user name.
    pub user: String,
    /// Remote address; `None` for serverless sessions.
    pub peer: Option<SocketAddr>,
    /// Session restrictions.
    pub kind: SessionKind,
}

impl SessionInfo {
    /// Info for an in-process session run as `user`.
    pub fn serverless(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            peer: None,
            kind: SessionKind::Regular,
        }
    }
}

/// Serves one session. Implemented by the server runtime and shared by the
/// SSH listener and the serverless pipe.
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Drives the session until either side closes it.
    async fn serve(&self, stream: BoxedStream, info: SessionInfo);
}
