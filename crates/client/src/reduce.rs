//! Client half of map-reduce: merge server partials, report the result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mapr::{GlobalGroupSet, GroupSet, Query};
use protocol::Frame;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::RetryPolicy;
use crate::error::ClientError;
use crate::handler::{BaseHandler, Handler};
use crate::output::Printer;

/// Folds one server's `AGGREGATE` frames into the global result.
///
/// Partials collect in a local set first and move to the global set
/// whenever its lock is free, so a busy merge never stalls the session.
#[derive(Debug)]
pub struct MaprHandler {
    global: Arc<GlobalGroupSet>,
    local: GroupSet,
    base: BaseHandler,
}

impl MaprHandler {
    /// A handler merging into `global`; other frames go to `base`.
    pub fn new(global: Arc<GlobalGroupSet>, base: BaseHandler) -> Self {
        Self {
            global,
            local: GroupSet::new(),
            base,
        }
    }
}

#[async_trait]
impl Handler for MaprHandler {
    async fn handle(&mut self, frame: Frame) -> Result<(), ClientError> {
        match frame {
            Frame::Aggregate { payload, .. } => {
                self.local.merge_serialized(self.global.query(), &payload)?;
                self.global.merge_noblock(&mut self.local)?;
                Ok(())
            }
            other => self.base.handle(other).await,
        }
    }

    async fn finish(&mut self) -> Result<(), ClientError> {
        if !self.local.is_empty() {
            self.global.merge(&self.local).await?;
            self.local = GroupSet::new();
        }
        Ok(())
    }
}

/// What the periodic report shows while sessions are still running.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reporting {
    /// Only what arrived during the last interval; each report starts a
    /// new window.
    Windows,
    /// Everything merged so far. Empty results are not reported.
    Cumulative,
}

impl From<RetryPolicy> for Reporting {
    fn from(retry: RetryPolicy) -> Self {
        match retry {
            RetryPolicy::Reconnect => Self::Windows,
            RetryPolicy::Once => Self::Cumulative,
        }
    }
}

/// Presents the global result: as a table on stdout, or in the outfile.
#[derive(Debug)]
pub struct MaprReport {
    global: Arc<GlobalGroupSet>,
    printer: Printer,
}

impl MaprReport {
    /// A report over a fresh global set for `query`.
    pub fn new(query: Arc<Query>, printer: Printer) -> Self {
        Self {
            global: Arc::new(GlobalGroupSet::new(query)),
            printer,
        }
    }

    /// The set handlers merge into.
    pub fn global(&self) -> Arc<GlobalGroupSet> {
        Arc::clone(&self.global)
    }

    /// Awaits `run` while reporting every query interval, and stops
    /// reporting once `run` completes.
    pub async fn drive<T>(&self, reporting: Reporting, run: impl Future<Output = T>) -> T {
        let stop = CancellationToken::new();
        let (value, ()) = tokio::join!(
            async {
                let value = run.await;
                stop.cancel();
                value
            },
            self.report_periodically(reporting, &stop),
        );
        value
    }

    /// Reports every query interval until cancelled.
    pub async fn report_periodically(&self, reporting: Reporting, cancel: &CancellationToken) {
        let interval = self.global.query().interval.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let result = match reporting {
                Reporting::Windows => self.global.swap_out().await,
                Reporting::Cumulative => {
                    let merged = self.global.snapshot().await;
                    if merged.is_empty() {
                        continue;
                    }
                    merged
                }
            };
            if let Err(err) = self.emit(&result).await {
                warn!(error = %err, "cannot report mapreduce result");
            }
        }
    }

    /// Reports everything merged so far.
    ///
    /// # Errors
    ///
    /// Fails when the outfile or stdout cannot be written.
    pub async fn finish(&self) -> Result<(), ClientError> {
        let result = self.global.snapshot().await;
        self.emit(&result).await
    }

    async fn emit(&self, set: &GroupSet) -> Result<(), ClientError> {
        match self.global.write_outfile(set).await? {
            Some(path) => {
                info!(path = %path.display(), groups = set.len(), "wrote mapreduce result");
                Ok(())
            }
            None => {
                self.printer.content(self.global.render(set).as_bytes())?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Capture;

    fn printer(out: &Capture) -> Printer {
        Printer::new(Box::new(out.clone()), Box::new(Capture::default()))
    }

    #[tokio::test]
    async fn partials_from_two_servers_merge() {
        let query = Arc::new(Query::parse("select count($line),$hostname from T group by $hostname").unwrap());
        let out = Capture::default();
        let report = MaprReport::new(Arc::clone(&query), printer(&out));

        for (server, payload) in [("a", "a∥2∥count($line)≔2∥$hostname≔a"), ("b", "a∥3∥count($line)≔3∥$hostname≔a")] {
            let mut handler = MaprHandler::new(report.global(), BaseHandler::new(server, printer(&out)));
            handler
                .handle(Frame::Aggregate {
                    host: server.into(),
                    payload: payload.into(),
                })
                .await
                .unwrap();
            handler.finish().await.unwrap();
        }

        report.finish().await.unwrap();
        let table = out.text();
        let row = table.lines().nth(2).unwrap();
        assert!(row.contains('5'), "{table}");
        assert!(row.contains(" a "), "{table}");
    }

    fn counted(query: &Query, samples: u64) -> GroupSet {
        let mut set = GroupSet::new();
        set.merge_serialized(query, &format!("∥{samples}∥count($line)≔{samples}"))
            .unwrap();
        set
    }

    #[tokio::test(start_paused = true)]
    async fn cumulative_reports_keep_the_result() {
        let query = Arc::new(Query::parse("select count($line) from T interval 1").unwrap());
        let out = Capture::default();
        let report = MaprReport::new(Arc::clone(&query), printer(&out));
        let global = report.global();

        let value = report
            .drive(Reporting::Cumulative, async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                global.merge(&counted(&query, 2)).await.unwrap();
                tokio::time::sleep(Duration::from_secs(1)).await;
                global.merge(&counted(&query, 3)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(700)).await;
                "done"
            })
            .await;
        assert_eq!(value, "done");

        let text = out.text();
        let rows: Vec<&str> = text
            .lines()
            .filter(|line| !line.contains("count") && !line.starts_with('-'))
            .map(str::trim)
            .collect();
        assert_eq!(rows, ["2", "5"], "{text}");
        assert_eq!(global.snapshot().await.get("").unwrap().samples, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn windows_start_over_after_each_report() {
        let query = Arc::new(Query::parse("select count($line) from T interval 1").unwrap());
        let out = Capture::default();
        let report = MaprReport::new(Arc::clone(&query), printer(&out));
        let global = report.global();

        report
            .drive(Reporting::Windows, async {
                global.merge(&counted(&query, 2)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(1500)).await;
            })
            .await;

        assert!(global.is_empty().await);
        assert!(out.text().lines().any(|line| line.trim() == "2"));
    }

    #[test]
    fn tail_runs_report_in_windows() {
        assert_eq!(Reporting::from(RetryPolicy::Reconnect), Reporting::Windows);
        assert_eq!(Reporting::from(RetryPolicy::Once), Reporting::Cumulative);
    }

    #[tokio::test]
    async fn outfile_replaces_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let query = Arc::new(
            Query::parse(&format!("select count($line) from T outfile {}", path.display())).unwrap(),
        );
        let out = Capture::default();
        let report = MaprReport::new(query, printer(&out));
        report.finish().await.unwrap();
        assert!(out.text().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "count($line)\n");
        assert!(mapr::sidecar_path(&path).exists());
    }
}
