//! TCP accept loop feeding connections to the SSH layer.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transport::SshServer;

use crate::error::ServerError;

/// Accepts connections until cancelled; each one runs in its own task.
pub struct SshListener {
    listener: TcpListener,
    ssh: Arc<SshServer>,
}

impl SshListener {
    /// Binds `address` (`host:port`).
    ///
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is unusable.
    pub async fn bind(address: &str, ssh: Arc<SshServer>) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.to_owned(),
                source,
            })?;
        Ok(Self { listener, ssh })
    }

    /// The bound address, useful after binding port `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok` once `cancel` fires; accept errors are
    /// logged and the loop continues.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), ServerError> {
        if let Ok(address) = self.listener.local_addr() {
            info!(%address, "listening for SSH connections");
        }
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("listener shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let _ = stream.set_nodelay(true);
                        let ssh = Arc::clone(&self.ssh);
                        tokio::spawn(async move {
                            if let Err(err) = ssh.serve_connection(stream, peer).await {
                                debug!(%peer, %err, "connection ended with error");
                            }
                        });
                    }
                    Err(err) => warn!(%err, "failed to accept connection"),
                },
            }
        }
    }
}
