//! Scheduled and continuous map-reduce jobs run by the server itself.
//!
//! A job is an ordinary client run started from inside `dserver`. With no
//! servers configured it talks to this process through the serverless
//! connector; otherwise it dials the listed servers over SSH, logging in
//! with its own name as password.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use client::{
    BaseHandler, Connector, Discovery, DiscoveryRegistry, Engine, EngineOptions, Handler,
    HandlerFactory, MaprHandler, MaprReport, Printer, RECONNECT_DELAY, Reporting, RetryPolicy, Target,
    default_throttle, map_commands,
};
use config::{Config, ContinuousJob, ScheduledJob};
use mapr::Query;
use protocol::{Options, ReadMode};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use transport::{ClientAuth, DialOptions, KnownHosts, SessionHandler, TrustStore};

use crate::error::ServerError;

/// How often scheduled jobs check their window.
pub const SCHEDULE_CHECK: Duration = Duration::from_secs(60);

/// Pause before a continuous job starts over.
pub const RESTART_DELAY: Duration = Duration::from_secs(10);

const DATE_FORMAT: &str = "%Y%m%d";

/// What a job runs, independent of how it is scheduled.
#[derive(Clone, Debug)]
struct JobSpec {
    name: String,
    files: String,
    query: String,
    servers: String,
    discovery: String,
}

impl From<&ScheduledJob> for JobSpec {
    fn from(job: &ScheduledJob) -> Self {
        Self {
            name: job.name.clone(),
            files: job.files.clone(),
            query: job.query.clone(),
            servers: job.servers.clone(),
            discovery: job.discovery.clone(),
        }
    }
}

impl From<&ContinuousJob> for JobSpec {
    fn from(job: &ContinuousJob) -> Self {
        Self {
            name: job.name.clone(),
            files: job.files.clone(),
            query: job.query.clone(),
            servers: job.servers.clone(),
            discovery: job.discovery.clone(),
        }
    }
}

/// Spawns one task per enabled job onto `background`.
pub(crate) fn spawn_all(
    background: &mut JoinSet<()>,
    config: &Arc<Config>,
    handler: &Arc<dyn SessionHandler>,
    shutdown: &CancellationToken,
) {
    for job in config.server.schedule.iter().filter(|job| job.enable) {
        info!(job = %job.name, window = ?job.time_range, "scheduling job");
        background.spawn(run_scheduled(
            job.clone(),
            Arc::clone(config),
            Arc::clone(handler),
            shutdown.clone(),
        ));
    }
    for job in config.server.continuous.iter().filter(|job| job.enable) {
        info!(job = %job.name, "starting continuous job");
        background.spawn(run_continuous(
            job.clone(),
            Arc::clone(config),
            Arc::clone(handler),
            shutdown.clone(),
        ));
    }
}

async fn run_scheduled(
    job: ScheduledJob,
    config: Arc<Config>,
    handler: Arc<dyn SessionHandler>,
    shutdown: CancellationToken,
) {
    let spec = JobSpec::from(&job);
    let mut ticker = tokio::time::interval(SCHEDULE_CHECK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let now = Local::now();
        let hour = u8::try_from(now.hour()).unwrap_or_default();
        if !job.in_window(hour) {
            continue;
        }
        let date = now.format(DATE_FORMAT).to_string();
        let query = match prepare_query(&spec, &date) {
            Ok(query) => query,
            Err(err) => {
                warn!(error = %err, "scheduled job disabled");
                return;
            }
        };
        let Some(outfile) = query.outfile.as_ref().map(|o| o.path.clone()) else {
            warn!(job = %spec.name, "scheduled job has no outfile, disabling it");
            return;
        };
        if outfile.exists() {
            debug!(job = %spec.name, path = %outfile.display(), "already ran in this window");
            continue;
        }
        info!(job = %spec.name, path = %outfile.display(), "running scheduled job");
        if let Err(err) = run_job(&spec, query, &config, &handler, RetryPolicy::Once, &shutdown).await {
            warn!(error = %err, "scheduled job failed");
        }
    }
}

async fn run_continuous(
    job: ContinuousJob,
    config: Arc<Config>,
    handler: Arc<dyn SessionHandler>,
    shutdown: CancellationToken,
) {
    let spec = JobSpec::from(&job);
    while !shutdown.is_cancelled() {
        let date = Local::now().format(DATE_FORMAT).to_string();
        let query = match prepare_query(&spec, &date) {
            Ok(query) => query,
            Err(err) => {
                warn!(error = %err, "continuous job disabled");
                return;
            }
        };

        let run = shutdown.child_token();
        let watcher = job
            .restart_on_day_change
            .then(|| tokio::spawn(cancel_on_day_change(date, run.clone())));
        if let Err(err) = run_job(&spec, query, &config, &handler, RetryPolicy::Reconnect, &run).await {
            warn!(error = %err, "continuous job failed");
        }
        run.cancel();
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }

        tokio::select! {
            () = shutdown.cancelled() => return,
            () = tokio::time::sleep(RESTART_DELAY) => {}
        }
        info!(job = %spec.name, "restarting continuous job");
    }
}

async fn cancel_on_day_change(started: String, run: CancellationToken) {
    let mut ticker = tokio::time::interval(SCHEDULE_CHECK);
    loop {
        tokio::select! {
            () = run.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if Local::now().format(DATE_FORMAT).to_string() != started {
            info!("day changed, restarting continuous job");
            run.cancel();
            return;
        }
    }
}

/// Parses the job's query and resolves `$date` in its outfile.
fn prepare_query(spec: &JobSpec, date: &str) -> Result<Query, ServerError> {
    let mut query = Query::parse(&spec.query).map_err(|source| ServerError::JobQuery {
        job: spec.name.clone(),
        source,
    })?;
    if let Some(outfile) = query.outfile.as_mut() {
        outfile.path = ScheduledJob::resolve_outfile(&outfile.path, date);
    }
    Ok(query)
}

fn targets(spec: &JobSpec, config: &Config) -> Result<Vec<Target>, client::ClientError> {
    if spec.servers.is_empty() && spec.discovery.is_empty() {
        return Ok(vec![Target::Serverless]);
    }
    let endpoints = Discovery::from_flags(&spec.servers, &spec.discovery, config.common.ssh_port)?
        .resolve(&DiscoveryRegistry::new())?;
    Ok(endpoints.into_iter().map(Target::Server).collect())
}

async fn run_job(
    spec: &JobSpec,
    query: Query,
    config: &Config,
    handler: &Arc<dyn SessionHandler>,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), ServerError> {
    let job_error = |source| ServerError::Job {
        job: spec.name.clone(),
        source,
    };
    let targets = targets(spec, config).map_err(job_error)?;
    let serverless = targets == [Target::Serverless];
    let connector = if serverless {
        Connector::serverless(Arc::clone(handler), spec.name.as_str())
    } else {
        let dial = DialOptions {
            user: spec.name.clone(),
            auth: vec![ClientAuth::Password(spec.name.clone())],
            timeout: Duration::from_secs(config.client.dial_timeout_secs),
        };
        Connector::ssh(dial, TrustStore::accept_all(KnownHosts::new(config.common.known_hosts_path())))
    };

    let options = Options {
        quiet: true,
        serverless,
        ..Options::default()
    };
    let mode = match retry {
        RetryPolicy::Once => ReadMode::Cat,
        RetryPolicy::Reconnect => ReadMode::Tail,
    };
    let query = Arc::new(query);
    let commands = map_commands(&query, mode, &spec.files, None, &options).map_err(job_error)?;

    let printer = Printer::new(Box::new(io::sink()), Box::new(io::stderr()));
    let report = MaprReport::new(Arc::clone(&query), printer.clone());
    let global = report.global();
    let factory: HandlerFactory = Arc::new(move |server: &str| {
        Box::new(MaprHandler::new(
            Arc::clone(&global),
            BaseHandler::new(server, printer.clone()),
        )) as Box<dyn Handler>
    });
    let engine = Engine::new(EngineOptions {
        targets,
        commands,
        spartan: false,
        retry,
        throttle: default_throttle(config.client.connections_per_cpu),
        reconnect_delay: RECONNECT_DELAY,
        connector,
    });

    let summary = report
        .drive(Reporting::from(retry), engine.run(factory, cancel))
        .await;
    for (target, error) in &summary.errors {
        warn!(job = %spec.name, %target, %error, "job session failed");
    }
    report.finish().await.map_err(job_error)?;
    info!(
        job = %spec.name,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "job run finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(query: &str) -> JobSpec {
        JobSpec {
            name: "nightly".into(),
            files: "/var/log/app.log".into(),
            query: query.into(),
            servers: String::new(),
            discovery: String::new(),
        }
    }

    #[test]
    fn outfile_date_is_resolved() {
        let query = prepare_query(
            &spec("from STATS select count($line) outfile /tmp/stats.$date.csv"),
            "20240102",
        )
        .unwrap();
        assert_eq!(
            query.outfile.unwrap().path,
            std::path::PathBuf::from("/tmp/stats.20240102.csv")
        );
    }

    #[test]
    fn bad_queries_name_the_job() {
        let err = prepare_query(&spec("select"), "20240102").unwrap_err();
        assert!(err.to_string().starts_with("job 'nightly'"));
    }

    #[test]
    fn empty_server_list_runs_serverless() {
        let config = Config::default();
        assert_eq!(targets(&spec("select count($line) from T"), &config).unwrap(), [Target::Serverless]);

        let mut remote = spec("select count($line) from T");
        remote.servers = "a:1,b:2".into();
        assert_eq!(targets(&remote, &config).unwrap().len(), 2);
    }
}
