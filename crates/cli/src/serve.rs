//! `dserver`.

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::arguments::ServerArgs;
use crate::error::CliError;
use crate::exit_code::ExitCode;
use crate::setup::{init_logging, load_config, log_level, runtime};

/// Time left to background tasks once the server has stopped.
const DRAIN: Duration = Duration::from_secs(1);

pub(crate) fn apply_overrides(config: &mut Config, args: &ServerArgs) -> Result<(), CliError> {
    if let Some(port) = args.port {
        config.common.ssh_port = port;
    }
    if let Some(address) = args.bind_address.as_deref().filter(|a| !a.is_empty()) {
        config.server.ssh_bind_address = address.to_owned();
    }
    config.validate()?;
    Ok(())
}

pub(crate) fn run(args: &ServerArgs) -> Result<ExitCode, CliError> {
    let mut config = load_config(args.cfg.as_deref())?;
    apply_overrides(&mut config, args)?;
    init_logging(log_level(&config, args.log_level.as_deref(), false)?)?;

    let runtime = runtime()?;
    let result = runtime.block_on(async {
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));
        if let Some(seconds) = args.shutdown_after.filter(|s| *s > 0) {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(seconds)).await;
                info!(seconds, "shutdown timer expired");
                shutdown.cancel();
            });
        }
        server::run(Arc::new(config), shutdown).await
    });
    runtime.shutdown_timeout(DRAIN);
    result?;
    info!("dserver stopped");
    Ok(ExitCode::Ok)
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => Some(terminate),
        Err(err) => {
            warn!(error = %err, "cannot watch SIGTERM");
            None
        }
    };
    let terminated = async {
        match terminate.as_mut() {
            Some(terminate) => {
                terminate.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        () = shutdown.cancelled() => return,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
        () = terminated => info!("terminated"),
    }
    shutdown.cancel();
}
