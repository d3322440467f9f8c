//! Wiring of a complete `dserver` process.

use std::sync::Arc;
use std::time::Duration;

use config::Config;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use transport::{AuthPolicy, SessionHandler, SshServer, load_or_generate};

use crate::error::ServerError;
use crate::jobs;
use crate::listener::SshListener;
use crate::server::Server;
use crate::stats::report_stats;

/// Runs the SSH listener, the stats reporter and every enabled job until
/// `shutdown` fires.
///
/// # Errors
///
/// Fails when the host key cannot be loaded or created, or the listener
/// cannot bind.
pub async fn run(config: Arc<Config>, shutdown: CancellationToken) -> Result<(), ServerError> {
    config.validate()?;
    let host_key = load_or_generate(&config.server.host_key_file)?;
    let server = Server::new(Arc::clone(&config), shutdown.clone());
    let handler: Arc<dyn SessionHandler> = Arc::new(server.clone());
    let auth = Arc::new(AuthPolicy::from_config(&config));
    let ssh = Arc::new(SshServer::new(host_key, auth, Arc::clone(&handler)));

    let address = format!("{}:{}", config.server.ssh_bind_address, config.common.ssh_port);
    let listener = SshListener::bind(&address, ssh).await?;
    info!(
        hostname = server.hostname(),
        %address,
        "dserver started"
    );

    let mut background = JoinSet::new();
    background.spawn(report_stats(
        server.stats(),
        Duration::from_secs(config.server.stats_interval_secs),
        shutdown.clone(),
    ));
    jobs::spawn_all(&mut background, &config, &handler, &shutdown);

    let result = listener.serve(shutdown.clone()).await;
    shutdown.cancel();
    while background.join_next().await.is_some() {}
    result
}
