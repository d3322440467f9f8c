//! Client connection counters, periodic stats lines and Ctrl-C handling.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A second Ctrl-C within this window aborts the run.
pub const INTERRUPT_WINDOW: Duration = Duration::from_secs(1);

/// Counters of one client run.
#[derive(Debug)]
pub struct ClientStats {
    total: usize,
    connected: AtomicUsize,
    new_connections: AtomicUsize,
    throttle: Arc<Semaphore>,
    throttle_capacity: usize,
}

impl ClientStats {
    /// Counters for `total` targets sharing a throttle of `throttle` slots.
    pub fn new(total: usize, throttle: usize) -> Self {
        let throttle_capacity = throttle.max(1);
        Self {
            total,
            connected: AtomicUsize::new(0),
            new_connections: AtomicUsize::new(0),
            throttle: Arc::new(Semaphore::new(throttle_capacity)),
            throttle_capacity,
        }
    }

    /// The dial throttle.
    pub fn throttle(&self) -> Arc<Semaphore> {
        Arc::clone(&self.throttle)
    }

    /// Sessions currently established.
    pub fn connected(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }

    /// Counts an established session until the guard drops.
    pub fn session(self: &Arc<Self>) -> SessionGuard {
        self.connected.fetch_add(1, Ordering::Relaxed);
        self.new_connections.fetch_add(1, Ordering::Relaxed);
        SessionGuard {
            stats: Arc::clone(self),
        }
    }

    /// `connected=C/T(P%)|new=N|throttle=K|tasks=G`; resets the `new` count.
    pub fn report_line(&self) -> String {
        let connected = self.connected();
        let percent = if self.total == 0 {
            0
        } else {
            connected * 100 / self.total
        };
        let new = self.new_connections.swap(0, Ordering::Relaxed);
        let throttled = self
            .throttle_capacity
            .saturating_sub(self.throttle.available_permits());
        let tasks = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_alive_tasks())
            .unwrap_or_default();
        format!(
            "connected={connected}/{}({percent}%)|new={new}|throttle={throttled}|tasks={tasks}",
            self.total
        )
    }

    /// Logs a stats line every `interval` until cancelled.
    pub async fn report_periodically(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => info!("{}", self.report_line()),
            }
        }
    }

    /// First Ctrl-C logs the stats, a second one within
    /// [`INTERRUPT_WINDOW`] cancels the run.
    pub async fn watch_interrupts(self: Arc<Self>, cancel: CancellationToken) {
        let mut last: Option<Instant> = None;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                signal = tokio::signal::ctrl_c() => {
                    if signal.is_err() {
                        return;
                    }
                }
            }
            if last.is_some_and(|at| at.elapsed() < INTERRUPT_WINDOW) {
                info!("interrupted, shutting down");
                cancel.cancel();
                return;
            }
            last = Some(Instant::now());
            info!("{} (press Ctrl-C again to quit)", self.report_line());
        }
    }
}

/// Decrements the connected count on drop.
#[derive(Debug)]
pub struct SessionGuard {
    stats: Arc<ClientStats>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.stats.connected.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn report_line_layout() {
        let stats = Arc::new(ClientStats::new(4, 2));
        let _held = stats.throttle().try_acquire_owned().unwrap();
        let first = stats.session();
        let _second = stats.session();
        drop(first);
        let line = stats.report_line();
        assert!(line.starts_with("connected=1/4(25%)|new=2|throttle=1|tasks="), "{line}");
        assert!(stats.report_line().contains("|new=0|"));
    }
}
