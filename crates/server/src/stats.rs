//! Connection counters and the periodic `MAPREDUCE:STATS` log line.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Table name of the stats line, queryable with `from STATS`.
pub const STATS_TABLE: &str = "STATS";

/// Live and lifetime session counts.
#[derive(Debug)]
pub struct ServerStats {
    current: AtomicUsize,
    lifetime: AtomicU64,
    started: Instant,
}

impl Default for ServerStats {
    fn default() -> Self {
        Self {
            current: AtomicUsize::new(0),
            lifetime: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl ServerStats {
    /// Fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions currently being served.
    pub fn current_connections(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Sessions served since start.
    pub fn lifetime_connections(&self) -> u64 {
        self.lifetime.load(Ordering::Relaxed)
    }

    /// Counts a session until the guard drops.
    pub fn connection(self: &Arc<Self>) -> ConnectionGuard {
        self.current.fetch_add(1, Ordering::Relaxed);
        self.lifetime.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            stats: Arc::clone(self),
        }
    }

    /// The stats message in the positional layout the default log parser
    /// understands: `pid|caller|cpus|tasks|cgocalls|loadavg|uptime|MAPREDUCE:STATS|k=v…`.
    pub fn report_line(&self) -> String {
        let tasks = tokio::runtime::Handle::try_current()
            .map(|handle| handle.metrics().num_alive_tasks())
            .unwrap_or_default();
        format!(
            "{}|stats|{}|{}|0|{}|{}|MAPREDUCE:{STATS_TABLE}|concurrentConnections={}|lifetimeConnections={}",
            std::process::id(),
            num_cpus::get(),
            tasks,
            load_average(),
            self.started.elapsed().as_secs(),
            self.current_connections(),
            self.lifetime_connections(),
        )
    }
}

/// Decrements the live session count on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    stats: Arc<ServerStats>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.stats.current.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Logs [`ServerStats::report_line`] every `interval` until cancelled.
pub async fn report_stats(stats: Arc<ServerStats>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_secs(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => info!("{}", stats.report_line()),
        }
    }
}

fn load_average() -> String {
    std::fs::read_to_string("/proc/loadavg")
        .ok()
        .and_then(|raw| raw.split_whitespace().next().map(str::to_owned))
        .unwrap_or_else(|| "0".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_track_live_sessions() {
        let stats = Arc::new(ServerStats::new());
        let first = stats.connection();
        let second = stats.connection();
        assert_eq!(stats.current_connections(), 2);
        drop(first);
        drop(second);
        assert_eq!(stats.current_connections(), 0);
        assert_eq!(stats.lifetime_connections(), 2);
    }

    #[test]
    fn report_line_parses_as_a_stats_record() {
        let stats = Arc::new(ServerStats::new());
        let _guard = stats.connection();
        let line = stats.report_line();
        let fields: Vec<&str> = line.split('|').collect();
        assert_eq!(fields[1], "stats");
        assert_eq!(fields[7], "MAPREDUCE:STATS");
        assert_eq!(fields[8], "concurrentConnections=1");
        assert_eq!(fields[9], "lifetimeConnections=1");
    }

    #[test]
    fn logged_report_line_feeds_the_stats_query() {
        let stats = Arc::new(ServerStats::new());
        let _guard = stats.connection();
        let logged = format!("INFO|20211002-071947|{}", stats.report_line());

        let query = mapr::Query::parse(
            "from STATS select count($line),last($time),avg($goroutines),\
             min(concurrentConnections),max(lifetimeConnections) group by $hostname",
        )
        .unwrap();
        let mut parser = mapr::new_parser(&query.log_format, &query.table, "srv").unwrap();
        let fields = parser.parse(&logged).unwrap();
        let mut set = mapr::GroupSet::new();
        assert!(set.aggregate(&query, fields).unwrap());

        let rows = set.rows(&query);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "1");
        assert_eq!(rows[0][1], "20211002-071947");
        assert_eq!(rows[0][3], "1");
        assert_eq!(rows[0][4], "1");
    }
}
