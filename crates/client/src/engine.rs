//! Fan-out of one command set to every target.
//!
//! Each target gets its own worker task. Dialing goes through a shared
//! throttle so that a large fleet is not hit with thousands of
//! simultaneous handshakes; the permit is released as soon as the
//! session is established.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OwnedSemaphorePermit;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::connector::{Connector, Target};
use crate::error::ClientError;
use crate::handler::HandlerFactory;
use crate::session::run_session;
use crate::stats::ClientStats;

/// Pause before reconnecting to a server that went away.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Connections per CPU when no explicit throttle is given.
pub const DEFAULT_CONNECTIONS_PER_CPU: usize = 10;

/// What a worker does once its session ends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryPolicy {
    /// One attempt; the run ends with the session.
    Once,
    /// Reconnect until cancelled. Used by tail and continuous modes.
    Reconnect,
}

/// Dial throttle for `connections_per_cpu` on this machine.
pub fn default_throttle(connections_per_cpu: usize) -> usize {
    connections_per_cpu.saturating_mul(num_cpus::get()).max(1)
}

/// Everything a run needs.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Where to connect.
    pub targets: Vec<Target>,
    /// Enveloped commands sent at the start of every session.
    pub commands: Vec<String>,
    /// Expect plain frames.
    pub spartan: bool,
    /// Retry behaviour.
    pub retry: RetryPolicy,
    /// Concurrent dials.
    pub throttle: usize,
    /// Pause between attempts under [`RetryPolicy::Reconnect`].
    pub reconnect_delay: Duration,
    /// How targets are reached.
    pub connector: Connector,
}

/// Result of [`Engine::run`].
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Targets attempted.
    pub total: usize,
    /// Sessions that ended cleanly.
    pub succeeded: usize,
    /// Sessions that ended with an error.
    pub failed: usize,
    /// Servers rejected by the host key check.
    pub untrusted: usize,
    /// `(target, error)` for every failure.
    pub errors: Vec<(String, String)>,
}

impl RunSummary {
    /// Whether every target finished cleanly.
    pub fn all_ok(&self) -> bool {
        self.failed == 0 && self.untrusted == 0
    }
}

enum Outcome {
    Done,
    Cancelled,
    Untrusted(String),
    Failed(String),
}

/// Runs sessions against every target.
#[derive(Debug)]
pub struct Engine {
    options: Arc<EngineOptions>,
    stats: Arc<ClientStats>,
}

impl Engine {
    /// An engine for `options`.
    pub fn new(options: EngineOptions) -> Self {
        let stats = Arc::new(ClientStats::new(options.targets.len(), options.throttle));
        Self {
            options: Arc::new(options),
            stats,
        }
    }

    /// Connection counters of this run.
    pub fn stats(&self) -> Arc<ClientStats> {
        Arc::clone(&self.stats)
    }

    /// Connects to every target and waits for all workers.
    pub async fn run(&self, factory: HandlerFactory, cancel: &CancellationToken) -> RunSummary {
        let mut workers = JoinSet::new();
        for target in &self.options.targets {
            let worker = Worker {
                target: target.clone(),
                options: Arc::clone(&self.options),
                stats: Arc::clone(&self.stats),
                factory: Arc::clone(&factory),
                cancel: cancel.clone(),
            };
            workers.spawn(async move {
                let name = worker.target.to_string();
                (name, worker.run().await)
            });
        }

        let mut summary = RunSummary {
            total: self.options.targets.len(),
            ..RunSummary::default()
        };
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Outcome::Done | Outcome::Cancelled)) => summary.succeeded += 1,
                Ok((name, Outcome::Untrusted(error))) => {
                    summary.untrusted += 1;
                    summary.errors.push((name, error));
                }
                Ok((name, Outcome::Failed(error))) => {
                    summary.failed += 1;
                    summary.errors.push((name, error));
                }
                Err(err) => {
                    summary.failed += 1;
                    summary.errors.push(("worker".to_owned(), err.to_string()));
                }
            }
        }
        summary
    }
}

struct Worker {
    target: Target,
    options: Arc<EngineOptions>,
    stats: Arc<ClientStats>,
    factory: HandlerFactory,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) -> Outcome {
        loop {
            let result = match self.attempt().await {
                Some(result) => result,
                None => return Outcome::Cancelled,
            };
            match result {
                Err(err) if err.is_untrusted() => {
                    warn!(target = %self.target, "host key not trusted, giving up");
                    return Outcome::Untrusted(err.to_string());
                }
                Ok(()) if self.options.retry == RetryPolicy::Once => return Outcome::Done,
                Err(err) if self.options.retry == RetryPolicy::Once => {
                    warn!(target = %self.target, error = %err, "session failed");
                    return Outcome::Failed(err.to_string());
                }
                Ok(()) => debug!(target = %self.target, "session ended, reconnecting"),
                Err(err) => warn!(target = %self.target, error = %err, "session failed, reconnecting"),
            }
            if self.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            tokio::select! {
                () = self.cancel.cancelled() => return Outcome::Cancelled,
                () = tokio::time::sleep(self.options.reconnect_delay) => {}
            }
        }
    }

    /// One connect-and-run cycle; `None` when cancelled while waiting
    /// for the throttle.
    async fn attempt(&self) -> Option<Result<(), ClientError>> {
        let permit = self.throttle_permit().await?;
        let opened = self.options.connector.open(&self.target).await;
        drop(permit);
        let session = match opened {
            Ok(session) => session,
            Err(err) => return Some(Err(err)),
        };

        let name = self.target.to_string();
        let guard = self.stats.session();
        let mut handler = (self.factory)(&name);
        let result = run_session(
            &name,
            session.stream,
            &self.options.commands,
            self.options.spartan,
            handler.as_mut(),
            &self.cancel,
        )
        .await;
        drop(guard);
        if let Some(handle) = session.handle {
            handle.disconnect().await;
        }
        Some(result)
    }

    async fn throttle_permit(&self) -> Option<OwnedSemaphorePermit> {
        let throttle = self.stats.throttle();
        tokio::select! {
            () = self.cancel.cancelled() => None,
            permit = throttle.acquire_owned() => permit.ok(),
        }
    }
}
