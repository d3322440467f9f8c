//! Dialing a DTail server over SSH.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use tracing::debug;

use crate::error::TransportError;
use crate::session::BoxedStream;
use crate::trust::TrustStore;

/// One way to prove the client's identity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClientAuth {
    /// An OpenSSH private key file.
    KeyFile(PathBuf),
    /// A password (health checks and jobs).
    Password(String),
}

/// How to reach and log into servers.
#[derive(Clone, Debug)]
pub struct DialOptions {
    /// Remote user.
    pub user: String,
    /// Methods tried in order until one succeeds.
    pub auth: Vec<ClientAuth>,
    /// Limit for connect, authentication and shell setup together.
    pub timeout: Duration,
}

struct HostKeyCheck {
    host: String,
    port: u16,
    trust: Arc<TrustStore>,
}

impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(self.trust.verify(&self.host, self.port, server_public_key).await)
    }
}

/// Keeps the SSH connection behind a session stream alive.
pub struct SessionHandle {
    handle: Handle<HostKeyCheck>,
}

impl SessionHandle {
    /// Ends the connection politely.
    pub async fn disconnect(self) {
        let _ = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

/// Connects to `host:port`, authenticates and opens a shell channel.
///
/// # Errors
///
/// [`TransportError::Untrusted`] when the host key was rejected,
/// [`TransportError::Timeout`] when `options.timeout` elapsed, and
/// [`TransportError::AuthRejected`] when no credential was accepted.
pub async fn dial(
    host: &str,
    port: u16,
    options: &DialOptions,
    trust: Arc<TrustStore>,
) -> Result<(BoxedStream, SessionHandle), TransportError> {
    let address = format!("{host}:{port}");
    let attempt = establish(host, port, options, Arc::clone(&trust));
    match tokio::time::timeout(options.timeout, attempt).await {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(_)) | Err(_) if trust.is_untrusted(&address) => Err(TransportError::Untrusted(address)),
        Ok(Err(err)) => Err(err),
        Err(_) => Err(TransportError::Timeout(address)),
    }
}

async fn establish(
    host: &str,
    port: u16,
    options: &DialOptions,
    trust: Arc<TrustStore>,
) -> Result<(BoxedStream, SessionHandle), TransportError> {
    let config = Arc::new(client::Config {
        keepalive_interval: Some(Duration::from_secs(15)),
        ..client::Config::default()
    });
    let checker = HostKeyCheck {
        host: host.to_owned(),
        port,
        trust,
    };
    let mut handle = client::connect(config, (host, port), checker).await?;

    let mut authenticated = false;
    for method in &options.auth {
        let result = match method {
            ClientAuth::KeyFile(path) => {
                let key = match load_secret_key(path, None) {
                    Ok(key) => key,
                    Err(err) => {
                        debug!(path = %path.display(), %err, "skipping unusable key");
                        continue;
                    }
                };
                let hash = handle.best_supported_rsa_hash().await?.flatten();
                handle
                    .authenticate_publickey(&options.user, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
                    .await?
            }
            ClientAuth::Password(password) => {
                handle
                    .authenticate_password(&options.user, password)
                    .await?
            }
        };
        if result.success() {
            authenticated = true;
            break;
        }
    }
    if !authenticated {
        return Err(TransportError::AuthRejected {
            user: options.user.clone(),
            address: format!("{host}:{port}"),
        });
    }

    let channel = handle.channel_open_session().await?;
    channel.request_shell(true).await?;
    let stream: BoxedStream = Box::pin(channel.into_stream());
    Ok((stream, SessionHandle { handle }))
}
