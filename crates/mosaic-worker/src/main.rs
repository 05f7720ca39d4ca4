//! # Mosaic Render Worker
//!
//! Reads render jobs as newline-delimited JSON from stdin, runs them on a
//! bounded worker pool and delivers the packaged results.

use mosaic_config::{AppConfig, ConfigLoader};
use mosaic_core::{init_telemetry, MosaicResult, TelemetryConfig};
use mosaic_worker::app::AppBuilder;
use mosaic_worker::startup::{print_banner, print_startup_info, shutdown_signal};
use tokio::io::BufReader;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = init_telemetry(&TelemetryConfig::default());
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&config.telemetry) {
        eprintln!("Failed to initialise logging: {e}");
        std::process::exit(1);
    }

    print_banner();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let code = match run(config).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Application error: {}", e);
            1
        }
    };

    // The stdin reader may still be parked on a blocking read.
    std::process::exit(code);
}

fn load_config() -> MosaicResult<AppConfig> {
    let config_dir =
        std::env::var("MOSAIC_CONFIG_DIR").unwrap_or_else(|_| "./config".to_string());
    let loader = ConfigLoader::new(config_dir)?;
    Ok(loader.into_config())
}

async fn run(config: AppConfig) -> MosaicResult<()> {
    mosaic_jobs::register_metrics();
    mosaic_render::register_metrics();
    print_startup_info(&config);

    let app = AppBuilder::new().with_config(config).build()?;

    // A second signal during graceful shutdown kills running renders.
    let abort = app.abort_token();
    let shutdown = async move {
        shutdown_signal().await;
        tokio::spawn(async move {
            shutdown_signal().await;
            warn!("Second shutdown signal, aborting running renders");
            abort.cancel();
        });
    };

    let summary = app
        .run(BufReader::new(tokio::io::stdin()), shutdown)
        .await?;

    info!(
        succeeded = summary.jobs_succeeded,
        failed = summary.jobs_failed,
        "Worker shutdown complete"
    );
    Ok(())
}
