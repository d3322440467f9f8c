//! `dtail`, `dcat`, `dgrep` and `dmap`: one request sent to many servers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use client::{
    BaseHandler, Connector, Discovery, DiscoveryRegistry, Engine, EngineOptions, Handler,
    HandlerFactory, MaprHandler, MaprReport, Printer, RECONNECT_DELAY, Reporting, RetryPolicy, RunSummary,
    Target, default_throttle, map_commands, read_commands, spawn_prompter,
};
use config::{Config, home_dir};
use filters::{LineRegex, RegexFlag};
use mapr::Query;
use protocol::{Options, ReadMode};
use server::Server;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use transport::{ClientAuth, DialOptions, KnownHosts, SessionHandler, TrustStore};

use crate::arguments::{ClientArgs, Program};
use crate::error::CliError;
use crate::exit_code::ExitCode;
use crate::prompt;
use crate::setup::{init_logging, load_config, log_level, runtime};

const DEFAULT_KEYS: [&str; 3] = ["id_ed25519", "id_ecdsa", "id_rsa"];

/// What to send and how to treat the answers, derived from the flags.
#[derive(Debug)]
pub(crate) struct Plan {
    pub(crate) mode: ReadMode,
    pub(crate) retry: RetryPolicy,
    pub(crate) query: Option<Arc<Query>>,
    pub(crate) commands: Vec<String>,
}

pub(crate) const fn read_mode(program: Program) -> ReadMode {
    match program {
        Program::Tail => ReadMode::Tail,
        Program::Grep => ReadMode::Grep,
        _ => ReadMode::Cat,
    }
}

pub(crate) fn plan(program: Program, args: &ClientArgs, serverless: bool) -> Result<Plan, CliError> {
    if args.files.is_empty() {
        return Err(CliError::usage(format!("{}: no files given, use -files", program.name())));
    }
    let mode = read_mode(program);
    let retry = if mode == ReadMode::Tail {
        RetryPolicy::Reconnect
    } else {
        RetryPolicy::Once
    };
    let options = Options {
        quiet: args.quiet,
        spartan: args.spartan,
        serverless,
        before: args.before,
        after: args.after,
        max_count: args.max_count,
        ..Options::default()
    };
    let flag = if args.invert {
        RegexFlag::Invert
    } else {
        RegexFlag::Default
    };
    let regex = match args.regex.as_deref() {
        Some(pattern) => Some(LineRegex::new(pattern, flag)?),
        None if program == Program::Grep => {
            return Err(CliError::usage("dgrep: no regex given, use -regex"));
        }
        None => None,
    };

    let query = match args.query.as_deref().filter(|q| !q.trim().is_empty()) {
        Some(raw) => Some(Arc::new(Query::parse(raw)?)),
        None if program == Program::Map => {
            return Err(CliError::usage("dmap: no query given, use -query"));
        }
        None => None,
    };
    let commands = match &query {
        Some(query) => map_commands(query, mode, &args.files, regex.as_ref(), &options)?,
        None => read_commands(mode, &args.files, &regex.unwrap_or_else(LineRegex::noop), &options),
    };
    Ok(Plan {
        mode,
        retry,
        query,
        commands,
    })
}

/// `-user`, then `$USER`, then the account of the current uid.
pub(crate) fn default_user(flag: Option<&str>) -> String {
    flag.filter(|user| !user.is_empty())
        .map(str::to_owned)
        .or_else(|| std::env::var("USER").ok().filter(|user| !user.is_empty()))
        .or_else(|| {
            nix::unistd::User::from_uid(nix::unistd::getuid())
                .ok()
                .flatten()
                .map(|user| user.name)
        })
        .unwrap_or_else(|| "nobody".to_owned())
}

fn key_auth(key: Option<PathBuf>) -> Vec<ClientAuth> {
    match key {
        Some(key) => vec![ClientAuth::KeyFile(key)],
        None => {
            let ssh = home_dir().join(".ssh");
            DEFAULT_KEYS
                .iter()
                .map(|name| ssh.join(name))
                .filter(|path| path.is_file())
                .map(ClientAuth::KeyFile)
                .collect()
        }
    }
}

fn targets(args: &ClientArgs, config: &Config) -> Result<Vec<Target>, CliError> {
    if args.servers.is_empty() && args.discovery.is_empty() {
        return Ok(vec![Target::Serverless]);
    }
    let endpoints = Discovery::from_flags(&args.servers, &args.discovery, config.common.ssh_port)?
        .resolve(&DiscoveryRegistry::new())?;
    if endpoints.is_empty() {
        return Err(CliError::usage("no servers left after discovery"));
    }
    Ok(endpoints.into_iter().map(Target::Server).collect())
}

/// Applies the flags that override configuration values.
pub(crate) fn apply_overrides(config: &mut Config, args: &ClientArgs) {
    if let Some(port) = args.port {
        config.common.ssh_port = port;
    }
    if let Some(cpc) = args.connections_per_cpu {
        config.client.connections_per_cpu = cpc;
    }
    config.client.trust_all_hosts |= args.trust_all_hosts;
}

pub(crate) fn run(program: Program, args: &ClientArgs) -> Result<ExitCode, CliError> {
    let mut config = load_config(args.cfg.as_deref())?;
    apply_overrides(&mut config, args);
    init_logging(log_level(&config, args.log_level.as_deref(), args.quiet)?)?;
    if args.no_color {
        debug!("output is never coloured, ignoring -noColor");
    }
    runtime()?.block_on(fan_out(program, args, Arc::new(config)))
}

async fn fan_out(program: Program, args: &ClientArgs, config: Arc<Config>) -> Result<ExitCode, CliError> {
    let targets = targets(args, &config)?;
    let serverless = targets == [Target::Serverless];
    let plan = plan(program, args, serverless)?;
    let user = default_user(args.user.as_deref());
    let cancel = CancellationToken::new();

    let mut prompting = None;
    let connector = if serverless {
        let handler: Arc<dyn SessionHandler> = Arc::new(Server::new(Arc::clone(&config), cancel.clone()));
        Connector::serverless(handler, user)
    } else {
        let known_hosts = KnownHosts::new(config.common.known_hosts_path());
        let trust = if config.client.trust_all_hosts {
            TrustStore::accept_all(known_hosts)
        } else {
            let (prompts, task) = spawn_prompter(known_hosts.clone(), prompt::for_stdin(), cancel.clone());
            prompting = Some(task);
            TrustStore::new(known_hosts, prompts)
        };
        let dial = DialOptions {
            user,
            auth: key_auth(args.key.clone()),
            timeout: Duration::from_secs(config.client.dial_timeout_secs),
        };
        Connector::ssh(dial, trust)
    };

    info!(
        program = program.name(),
        servers = targets.len(),
        mode = plan.mode.as_str(),
        "starting"
    );
    let engine = Engine::new(EngineOptions {
        targets,
        commands: plan.commands,
        spartan: args.spartan,
        retry: plan.retry,
        throttle: default_throttle(config.client.connections_per_cpu),
        reconnect_delay: RECONNECT_DELAY,
        connector,
    });
    let stats = engine.stats();
    let interrupts = tokio::spawn(stats.clone().watch_interrupts(cancel.clone()));
    let reporting = (!args.quiet && !args.spartan).then(|| {
        tokio::spawn(
            stats.report_periodically(Duration::from_secs(config.client.stats_interval_secs), cancel.child_token()),
        )
    });

    let printer = Printer::stdio();
    let summary = match plan.query {
        Some(query) => run_mapreduce(&engine, query, printer, plan.retry, &cancel).await?,
        None => {
            let factory: HandlerFactory = Arc::new(move |server: &str| {
                Box::new(BaseHandler::new(server, printer.clone())) as Box<dyn Handler>
            });
            engine.run(factory, &cancel).await
        }
    };

    cancel.cancel();
    interrupts.abort();
    if let Some(reporting) = reporting {
        let _ = reporting.await;
    }
    if let Some(prompting) = prompting {
        let _ = prompting.await;
    }
    Ok(verdict(&summary))
}

async fn run_mapreduce(
    engine: &Engine,
    query: Arc<Query>,
    printer: Printer,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<RunSummary, CliError> {
    let report = MaprReport::new(query, printer.clone());
    let global = report.global();
    let factory: HandlerFactory = Arc::new(move |server: &str| {
        Box::new(MaprHandler::new(
            Arc::clone(&global),
            BaseHandler::new(server, printer.clone()),
        )) as Box<dyn Handler>
    });

    let summary = report
        .drive(Reporting::from(retry), engine.run(factory, cancel))
        .await;
    report.finish().await?;
    Ok(summary)
}

/// Exit status of a finished run; every failed session has been logged.
pub(crate) fn verdict(summary: &RunSummary) -> ExitCode {
    for (target, err) in &summary.errors {
        error!(%target, error = %err, "session failed");
    }
    if summary.all_ok() {
        ExitCode::Ok
    } else {
        ExitCode::Critical
    }
}
