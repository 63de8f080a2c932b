use crate::config::Config;
use crate::dispatcher::{Dispatcher, Pipeline};
use crate::observability::Metrics;
use crate::queue;
use crate::remote::{Credential, GraphClient, RemoteConverter};
use crate::watcher::DirectoryWatcher;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Run the conversion service until a shutdown signal arrives
pub async fn run(config: Config) -> Result<(), AnyError> {
    let metrics = Arc::new(Metrics::new());

    let credential = Credential::from_identity(&config.identity)?;
    let remote: Arc<dyn RemoteConverter> = Arc::new(GraphClient::new(&config.remote, credential)?);

    let pipeline = Pipeline::new(remote, metrics.clone()).with_settle(config.watch.settle());
    let dispatcher = Dispatcher::from_config(pipeline, &config.dispatch, metrics.clone());

    let (sender, receiver) = queue::channel();
    let watcher = DirectoryWatcher::start(&config.watch, sender, metrics.clone())?;

    let shutdown = CancellationToken::new();
    let dispatch = tokio::spawn(dispatcher.run(receiver, shutdown.clone()));

    info!("topdf service running");

    shutdown_signal().await;

    shutdown.cancel();
    watcher.stop().await;
    dispatch.await?;

    let snapshot = metrics.snapshot();
    info!(
        enqueued = snapshot.jobs_enqueued,
        converted = snapshot.jobs_converted,
        failed = snapshot.jobs_failed,
        failed_attempts = snapshot.attempts_failed,
        cleanup_failures = snapshot.cleanup_failures,
        "topdf service stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
