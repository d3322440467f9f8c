//! The [`Server`]: shared state plus the [`SessionHandler`] every SSH and
//! serverless session is handed to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::Config;
use futures::SinkExt;
use protocol::{Frame, FrameCodec, SYN_CLOSE_CONNECTION};
use tokio::sync::Semaphore;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use transport::{BoxedStream, SessionHandler, SessionInfo};

use crate::handler;
use crate::pools::ReaderPools;
use crate::stats::ServerStats;

/// Waits and retry counts used by sessions. The defaults are what a
/// production server uses; tests shrink them.
#[derive(Clone, Copy, Debug)]
pub struct Timing {
    /// Extra glob expansions when nothing matches.
    pub glob_retries: u32,
    /// Pause between glob expansions.
    pub glob_retry_interval: Duration,
    /// Tail readers sleep this long at end of file.
    pub eof_poll: Duration,
    /// How often tail readers compare their offset with the file size.
    pub truncate_check: Duration,
    /// Pause before reopening a tailed file that failed.
    pub tail_reopen_delay: Duration,
    /// Checks for an empty output queue before the closing handshake.
    pub drain_attempts: u32,
    /// Pause between those checks.
    pub drain_interval: Duration,
    /// How long to wait for `.ack close connection`.
    pub ack_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            glob_retries: 10,
            glob_retry_interval: Duration::from_secs(5),
            eof_poll: Duration::from_millis(100),
            truncate_check: Duration::from_secs(3),
            tail_reopen_delay: Duration::from_secs(2),
            drain_attempts: 10,
            drain_interval: Duration::from_millis(100),
            ack_timeout: Duration::from_secs(5),
        }
    }
}

/// State every session of one server reads.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: Arc<Config>,
    pub(crate) hostname: Arc<str>,
    pub(crate) timing: Timing,
    pub(crate) pools: ReaderPools,
    pub(crate) stats: Arc<ServerStats>,
    pub(crate) shutdown: CancellationToken,
    connections: Arc<Semaphore>,
}

/// Serves DTail sessions.
///
/// Cheap to clone; clones share limits, pools and counters.
#[derive(Clone, Debug)]
pub struct Server {
    shared: Arc<Shared>,
}

impl Server {
    /// A server with production timing.
    pub fn new(config: Arc<Config>, shutdown: CancellationToken) -> Self {
        Self::with_timing(config, shutdown, Timing::default())
    }

    /// A server with custom waits.
    pub fn with_timing(config: Arc<Config>, shutdown: CancellationToken, timing: Timing) -> Self {
        let hostname = Arc::from(config.common.hostname());
        let pools = ReaderPools::new(
            config.server.max_concurrent_cats,
            config.server.max_concurrent_tails,
        );
        let connections = Arc::new(Semaphore::new(config.server.max_connections.max(1)));
        Self {
            shared: Arc::new(Shared {
                config,
                hostname,
                timing,
                pools,
                stats: Arc::new(ServerStats::new()),
                shutdown,
                connections,
            }),
        }
    }

    /// Name this server reports in every frame.
    pub fn hostname(&self) -> &str {
        &self.shared.hostname
    }

    /// The server's configuration.
    pub fn config(&self) -> &Arc<Config> {
        &self.shared.config
    }

    /// Connection counters.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Fires when the server shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }
}

#[async_trait]
impl SessionHandler for Server {
    async fn serve(&self, stream: BoxedStream, info: SessionInfo) {
        let Ok(permit) = Arc::clone(&self.shared.connections).try_acquire_owned() else {
            warn!(user = %info.user, "connection limit reached, refusing session");
            refuse(stream, &self.shared.hostname).await;
            return;
        };
        let _counted = self.shared.stats.connection();
        debug!(user = %info.user, peer = ?info.peer, kind = ?info.kind, "session started");
        handler::serve_session(Arc::clone(&self.shared), stream, info).await;
        drop(permit);
    }
}

async fn refuse(stream: BoxedStream, hostname: &str) {
    let mut sink = FramedWrite::new(stream, FrameCodec::new());
    let _ = sink
        .send(Frame::server(
            hostname,
            "ERROR|Server limit reached, too many connections, try again later",
        ))
        .await;
    let _ = sink.send(Frame::hidden(SYN_CLOSE_CONNECTION)).await;
    let _ = sink.close().await;
}
