//! The server half of map-reduce: parse, filter and group every line fed
//! by the session's reads, and ship partial results each interval.

use std::sync::Arc;

use filters::Line;
use mapr::{GroupSet, LogParser, ParserError, Query, new_parser};
use protocol::Frame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::messenger::Messenger;

const AGGREGATE_BUFFER: usize = 4096;

/// A running aggregate. Dropping every line sender ends it after a final
/// flush.
#[derive(Debug)]
pub(crate) struct Aggregate {
    lines: mpsc::Sender<Line>,
    task: JoinHandle<()>,
}

impl Aggregate {
    pub(crate) fn spawn(
        query: Arc<Query>,
        log_format: &str,
        hostname: &str,
        messenger: Messenger,
        cancel: CancellationToken,
    ) -> Result<Self, ParserError> {
        let parser = new_parser(log_format, &query.table, hostname)?;
        let (lines, rx) = mpsc::channel(AGGREGATE_BUFFER);
        let task = tokio::spawn(aggregate(query, parser, rx, messenger, cancel));
        Ok(Self { lines, task })
    }

    /// A feed for one read command.
    pub(crate) fn sender(&self) -> mpsc::Sender<Line> {
        self.lines.clone()
    }

    /// Closes the feed and waits for the last partial result.
    pub(crate) async fn finish(self) {
        drop(self.lines);
        let _ = self.task.await;
    }

    pub(crate) fn abort(self) {
        self.task.abort();
    }
}

async fn aggregate(
    query: Arc<Query>,
    mut parser: Box<dyn LogParser>,
    mut lines: mpsc::Receiver<Line>,
    messenger: Messenger,
    cancel: CancellationToken,
) {
    let mut groups = GroupSet::new();
    let mut ticker = tokio::time::interval(query.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    let mut reported_error = false;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            line = lines.recv() => {
                let Some(line) = line else { break };
                let text = String::from_utf8_lossy(&line.content);
                let Some(fields) = parser.parse(text.trim_end_matches(['\n', '\r'])) else {
                    continue;
                };
                if let Err(err) = groups.aggregate(&query, fields) {
                    if !reported_error {
                        messenger.warn(format!("unable to aggregate line {}: {err}", line.count)).await;
                        reported_error = true;
                    }
                }
            }
            _ = ticker.tick() => {
                if !flush(&mut groups, &messenger).await {
                    return;
                }
            }
        }
    }
    flush(&mut groups, &messenger).await;
    debug!(table = %query.table, "aggregate finished");
}

async fn flush(groups: &mut GroupSet, messenger: &Messenger) -> bool {
    let current = std::mem::take(groups);
    for payload in current.serialize() {
        let frame = Frame::Aggregate {
            host: messenger.host().to_owned(),
            payload,
        };
        if !messenger.send(frame).await {
            return false;
        }
    }
    true
}
