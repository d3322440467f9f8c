//! `dtailhealth`: checks that one server answers the `health` command.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use client::{
    Connector, Endpoint, Engine, EngineOptions, Handler, HandlerFactory, HealthHandler, HealthStatus,
    RECONNECT_DELAY, RetryPolicy, RunSummary, Target, health_command,
};
use config::Config;
use tokio_util::sync::CancellationToken;
use transport::{ClientAuth, DialOptions, HEALTH_USER, KnownHosts, TrustStore};

use crate::arguments::HealthArgs;
use crate::error::CliError;
use crate::exit_code::ExitCode;
use crate::setup::{init_logging, load_config, log_level, runtime};

/// Upper bound for a whole check on top of the dial timeout.
const ANSWER_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn run(args: &HealthArgs, stdout: &mut dyn Write) -> Result<ExitCode, CliError> {
    let config = load_config(args.cfg.as_deref())?;
    init_logging(log_level(&config, args.log_level.as_deref(), true)?)?;

    let Some(server) = args.server.as_deref().filter(|server| !server.is_empty()) else {
        return report(stdout, ExitCode::Warning, "no server given, use -server HOST[:PORT]");
    };
    let endpoint = match Endpoint::parse(server, config.common.ssh_port) {
        Ok(endpoint) => endpoint,
        Err(err) => return report(stdout, ExitCode::Critical, &err.to_string()),
    };
    let (code, text) = runtime()?.block_on(check(endpoint, &config));
    report(stdout, code, &text)
}

fn report(stdout: &mut dyn Write, code: ExitCode, text: &str) -> Result<ExitCode, CliError> {
    let line = if code == ExitCode::Ok {
        code.to_string()
    } else {
        format!("{code}: {text}")
    };
    let _ = writeln!(stdout, "{line}");
    Ok(code)
}

async fn check(endpoint: Endpoint, config: &Config) -> (ExitCode, String) {
    let dial_timeout = Duration::from_secs(config.client.dial_timeout_secs);
    let connector = Connector::ssh(
        DialOptions {
            user: HEALTH_USER.to_owned(),
            auth: vec![ClientAuth::Password(HEALTH_USER.to_owned())],
            timeout: dial_timeout,
        },
        TrustStore::accept_all(KnownHosts::new(config.common.known_hosts_path())),
    );
    let engine = Engine::new(EngineOptions {
        targets: vec![Target::Server(endpoint.clone())],
        commands: vec![health_command()],
        spartan: false,
        retry: RetryPolicy::Once,
        throttle: 1,
        reconnect_delay: RECONNECT_DELAY,
        connector,
    });
    let status = Arc::new(HealthStatus::default());
    let factory: HandlerFactory = {
        let status = Arc::clone(&status);
        Arc::new(move |_: &str| Box::new(HealthHandler::new(Arc::clone(&status))) as Box<dyn Handler>)
    };

    let cancel = CancellationToken::new();
    match tokio::time::timeout(dial_timeout + ANSWER_TIMEOUT, engine.run(factory, &cancel)).await {
        Ok(summary) => verdict(&endpoint, &summary, &status),
        Err(_) => {
            cancel.cancel();
            (ExitCode::Critical, format!("{endpoint}: no answer in time"))
        }
    }
}

/// Turns the outcome of one check into a status and its explanation.
pub(crate) fn verdict(endpoint: &Endpoint, summary: &RunSummary, status: &HealthStatus) -> (ExitCode, String) {
    if status.is_ok() {
        return (ExitCode::Ok, String::new());
    }
    if let Some((_, err)) = summary.errors.first() {
        return (ExitCode::Critical, format!("{endpoint}: {err}"));
    }
    let messages = status.messages();
    if messages.is_empty() {
        (ExitCode::Critical, format!("{endpoint}: server did not report OK"))
    } else {
        (ExitCode::Critical, format!("{endpoint}: {}", messages.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("web01:2222", 2222).unwrap()
    }

    #[test]
    fn missing_server_is_a_warning() {
        let mut out = Vec::new();
        let code = run(&HealthArgs::default(), &mut out).unwrap();
        assert_eq!(code, ExitCode::Warning);
        assert!(String::from_utf8(out).unwrap().starts_with("WARN: "));
    }

    #[test]
    fn bad_address_is_critical() {
        let args = HealthArgs {
            server: Some("web01:notaport".into()),
            cfg: Some("none".into()),
            ..HealthArgs::default()
        };
        let mut out = Vec::new();
        assert_eq!(run(&args, &mut out).unwrap(), ExitCode::Critical);
        assert!(String::from_utf8(out).unwrap().starts_with("CRITICAL: "));
    }

    #[test]
    fn dial_errors_win_over_silence() {
        let status = HealthStatus::default();
        let mut summary = RunSummary::default();
        assert_eq!(verdict(&endpoint(), &summary, &status).0, ExitCode::Critical);
        summary.errors.push(("web01:2222".into(), "connection refused".into()));
        let (code, text) = verdict(&endpoint(), &summary, &status);
        assert_eq!(code, ExitCode::Critical);
        assert_eq!(text, "web01:2222: connection refused");
    }

    #[test]
    fn ok_lines_are_bare() {
        let mut out = Vec::new();
        report(&mut out, ExitCode::Ok, "ignored").unwrap();
        assert_eq!(out, b"OK\n");
    }
}
