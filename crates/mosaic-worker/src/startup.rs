//! Worker startup utilities.

use mosaic_config::AppConfig;
use mosaic_render::CleanupManager;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    __  ___                 _
   /  |/  /___  _________ _(_)____
  / /|_/ / __ \/ ___/ __ `/ / ___/
 / /  / / /_/ (__  ) /_/ / / /__
/_/  /_/\____/____/\__,_/_/\___/   render worker
    "#);
}

/// Prints worker startup information.
pub fn print_startup_info(config: &AppConfig) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Environment:   {}", config.app.environment);
    info!("Workers:       {}", config.jobs.worker.concurrency);
    info!("Queue:         {} slots", config.jobs.queue.capacity);
    info!(
        "Retries:       {} x {:?} every {}s",
        config.jobs.queue.max_retries, config.jobs.retry.strategy, config.jobs.retry.delay_secs
    );
    info!(
        "Renderer:      {} {}",
        config.renderer.command,
        config.renderer.script_path.display()
    );
    info!("Deadline:      {}s", config.renderer.timeout_secs);
    info!("Runs:          {}", config.renderer.output_dir.display());
    info!("Delivery:      {}", config.delivery.dir.display());
    info!("{}", separator);
}

/// Resolves when the process receives Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}

/// Periodically removes stale run directories until `cancel` fires.
///
/// The first sweep runs immediately.
pub fn spawn_sweeper(
    output_dir: PathBuf,
    interval: Duration,
    stale_after: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let cleanup = CleanupManager::new();
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match cleanup.sweep(&output_dir, stale_after).await {
                        Ok(0) => {}
                        Ok(removed) => info!(removed, "Removed stale run directories"),
                        Err(e) => warn!(error = %e, "Stale run sweep failed"),
                    }
                }
            }
        }
    })
}
