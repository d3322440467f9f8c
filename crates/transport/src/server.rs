//! Serving DTail sessions over SSH.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::keys::{PrivateKey, PublicKey};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::auth::AuthPolicy;
use crate::error::TransportError;
use crate::session::{SessionHandler, SessionInfo, SessionKind};

/// Accepts SSH connections and hands each shell channel to a
/// [`SessionHandler`].
pub struct SshServer {
    config: Arc<server::Config>,
    auth: Arc<AuthPolicy>,
    handler: Arc<dyn SessionHandler>,
}

impl SshServer {
    /// Server presenting `host_key`.
    pub fn new(host_key: PrivateKey, auth: Arc<AuthPolicy>, handler: Arc<dyn SessionHandler>) -> Self {
        let config = server::Config {
            keys: vec![host_key],
            auth_rejection_time: Duration::from_millis(300),
            auth_rejection_time_initial: Some(Duration::ZERO),
            inactivity_timeout: None,
            ..server::Config::default()
        };
        Self {
            config: Arc::new(config),
            auth,
            handler,
        }
    }

    /// Runs the SSH protocol on an accepted connection until it closes.
    pub async fn serve_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), TransportError> {
        let connection = Connection {
            auth: Arc::clone(&self.auth),
            handler: Arc::clone(&self.handler),
            peer,
            info: None,
            pending: None,
        };
        let running = server::run_stream(Arc::clone(&self.config), stream, connection).await?;
        running.await?;
        debug!(%peer, "ssh connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for SshServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshServer").finish_non_exhaustive()
    }
}

struct Connection {
    auth: Arc<AuthPolicy>,
    handler: Arc<dyn SessionHandler>,
    peer: SocketAddr,
    info: Option<SessionInfo>,
    pending: Option<Channel<Msg>>,
}

const fn reject() -> Auth {
    Auth::Reject {
        proceed_with_methods: None,
        partial_success: false,
    }
}

impl Connection {
    fn accept(&mut self, user: &str, kind: SessionKind) -> Auth {
        info!(peer = %self.peer, %user, ?kind, "authenticated");
        self.info = Some(SessionInfo {
            user: user.to_owned(),
            peer: Some(self.peer),
            kind,
        });
        Auth::Accept
    }
}

impl server::Handler for Connection {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        match self.auth.password(user, password, Some(self.peer.ip())).await {
            Some(kind) => Ok(self.accept(user, kind)),
            None => Ok(reject()),
        }
    }

    async fn auth_publickey(&mut self, user: &str, public_key: &PublicKey) -> Result<Auth, Self::Error> {
        if self.auth.public_key(user, public_key).await {
            Ok(self.accept(user, SessionKind::Regular))
        } else {
            Ok(reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        if self.pending.is_some() || self.info.is_none() {
            return Ok(false);
        }
        self.pending = Some(channel);
        Ok(true)
    }

    async fn shell_request(&mut self, channel: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        let Some(pending) = self.pending.take_if(|c| c.id() == channel) else {
            return session.channel_failure(channel);
        };
        let Some(info) = self.info.clone() else {
            return session.channel_failure(channel);
        };
        session.channel_success(channel)?;
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            handler.serve(Box::pin(pending.into_stream()), info).await;
        });
        Ok(())
    }
}
