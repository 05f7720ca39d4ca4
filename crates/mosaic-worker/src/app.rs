//! Application wiring.

use crate::intake::{self, IntakeSummary};
use crate::startup;
use mosaic_config::{AppConfig, ConfigLoader};
use mosaic_core::{MosaicError, MosaicResult};
use mosaic_jobs::{JobError, JobEvent, JobStatus, WorkerPool, WorkerPoolConfig};
use mosaic_render::{LocalDirSink, RenderJob, RenderPipeline};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncBufRead;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Application builder for constructing the worker.
pub struct AppBuilder {
    config: Option<AppConfig>,
}

impl AppBuilder {
    /// Creates a new application builder.
    pub fn new() -> Self {
        Self { config: None }
    }

    /// Sets the configuration.
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the render pipeline and worker pool.
    pub fn build(self) -> MosaicResult<App> {
        let config = self.config.unwrap_or_default();
        ConfigLoader::validate_config(&config)?;
        let abort = CancellationToken::new();

        let sink = Arc::new(LocalDirSink::new(config.delivery.dir.clone()));
        let pipeline = RenderPipeline::new(config.renderer.clone(), sink)
            .with_cancellation(abort.clone());

        let pool = WorkerPool::new(WorkerPoolConfig::from(&config.jobs), Arc::new(pipeline))
            .map_err(job_error)?;

        Ok(App {
            config,
            pool: Arc::new(pool),
            abort,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A built worker, ready to run.
pub struct App {
    config: AppConfig,
    pool: Arc<WorkerPool<RenderJob>>,
    abort: CancellationToken,
}

/// What happened during one [`App::run`].
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Intake counts; `None` if shutdown came before the input ended.
    pub intake: Option<IntakeSummary>,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
}

impl App {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<WorkerPool<RenderJob>> {
        &self.pool
    }

    /// Token that kills running renders when cancelled.
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// Runs the worker until `input` is exhausted and every accepted job has
    /// finished, or until `shutdown` resolves.
    ///
    /// In both cases the pool is stopped gracefully: running renders finish,
    /// queued and pending-retry jobs are dropped.
    pub async fn run<R, S>(self, input: R, shutdown: S) -> MosaicResult<RunSummary>
    where
        R: AsyncBufRead + Unpin,
        S: Future<Output = ()>,
    {
        self.pool.start().map_err(job_error)?;

        let sweep_cancel = CancellationToken::new();
        let sweeper = self.config.renderer.sweep_interval().map(|interval| {
            startup::spawn_sweeper(
                self.config.renderer.output_dir.clone(),
                interval,
                self.config.renderer.stale_after(),
                sweep_cancel.clone(),
            )
        });
        let event_logger = spawn_event_logger(self.pool.subscribe());

        tokio::pin!(shutdown);
        let queue = self.pool.queue();
        let default_max_retries = self.config.jobs.queue.max_retries;

        let intake = tokio::select! {
            summary = intake::submit_lines(input, &queue, default_max_retries) => Some(summary),
            () = &mut shutdown => None,
        };

        if let Some(summary) = &intake {
            info!(
                accepted = summary.accepted,
                rejected = summary.rejected,
                invalid = summary.invalid,
                "Job input exhausted, waiting for accepted jobs"
            );
            tokio::select! {
                () = wait_for_drain(&self.pool, summary.accepted) => {
                    info!("All accepted jobs finished");
                }
                () = &mut shutdown => {}
            }
        }

        self.pool.stop().await;

        sweep_cancel.cancel();
        if let Some(sweeper) = sweeper {
            if let Err(e) = sweeper.await {
                warn!(error = %e, "Sweeper task failed");
            }
        }
        event_logger.abort();

        let stats = self.pool.stats();
        info!(
            succeeded = stats.jobs_succeeded,
            failed = stats.jobs_failed,
            "Worker finished"
        );

        Ok(RunSummary {
            intake,
            jobs_succeeded: stats.jobs_succeeded,
            jobs_failed: stats.jobs_failed,
        })
    }
}

async fn wait_for_drain(pool: &WorkerPool<RenderJob>, accepted: usize) {
    let accepted = accepted as u64;
    loop {
        let stats = pool.stats();
        if stats.jobs_succeeded + stats.jobs_failed >= accepted {
            return;
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
}

fn spawn_event_logger(mut events: broadcast::Receiver<JobEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Job event logger lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &JobEvent) {
    match event.status {
        JobStatus::Succeeded => info!(
            job_id = %event.job_id,
            attempts = event.attempts,
            "Render job succeeded"
        ),
        JobStatus::RetryScheduled => warn!(
            job_id = %event.job_id,
            attempts = event.attempts,
            next_retry_at = ?event.next_retry_at,
            error = event.error.as_deref().unwrap_or(""),
            "Render job will be retried"
        ),
        JobStatus::Failed => error!(
            job_id = %event.job_id,
            attempts = event.attempts,
            error = event.error.as_deref().unwrap_or(""),
            "Render job failed"
        ),
    }
}

fn job_error(err: JobError) -> MosaicError {
    match err {
        JobError::Configuration(msg) => MosaicError::configuration(msg),
        other => MosaicError::internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::BufReader;

    #[test]
    fn test_app_builder_default() {
        let app = AppBuilder::default().build().unwrap();
        assert_eq!(app.config().app.name, "mosaic-worker");
        assert!(!app.pool().is_running());
    }

    #[test]
    fn test_invalid_pool_config_rejected() {
        let mut config = AppConfig::default();
        config.jobs.worker.concurrency = 0;
        let result = AppBuilder::new().with_config(config).build();
        assert!(matches!(result, Err(MosaicError::Configuration(_))));
    }

    #[test]
    fn test_sweep_reaching_live_runs_rejected() {
        let mut config = AppConfig::default();
        config.renderer.stale_after_secs = config.renderer.timeout_secs;
        let result = AppBuilder::new().with_config(config).build();
        assert!(matches!(result, Err(MosaicError::Configuration(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_processes_input_then_stops() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("render.sh");
        let image = dir.path().join("in.png");
        std::fs::write(&script, "printf p > preview.png\nprintf s > scheme.png\n").unwrap();
        std::fs::write(&image, b"png").unwrap();

        let mut config = AppConfig::default();
        config.jobs.worker.concurrency = 2;
        config.renderer.command = "sh".to_string();
        config.renderer.script_path = script;
        config.renderer.output_dir = dir.path().join("runs");
        config.renderer.timeout_secs = 10;
        config.delivery.dir = dir.path().join("delivered");

        let line = format!(
            r#"{{"request":{{"image_path":"{}","stones_x":4,"stones_y":4,"stone_size_mm":2.0}}}}"#,
            image.display()
        );
        let input = format!("{line}\n{line}\n");

        let app = AppBuilder::new().with_config(config).build().unwrap();
        let summary = app
            .run(BufReader::new(input.as_bytes()), std::future::pending())
            .await
            .unwrap();

        assert_eq!(summary.intake.unwrap().accepted, 2);
        assert_eq!(summary.jobs_succeeded, 2);

        let delivered = std::fs::read_dir(dir.path().join("delivered"))
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .path()
                    .extension()
                    .is_some_and(|ext| ext == "zip")
            })
            .count();
        assert_eq!(delivered, 2);
    }

    #[tokio::test]
    async fn test_shutdown_before_input_ends() {
        let (_writer, reader) = tokio::io::duplex(64);
        let app = AppBuilder::new().build().unwrap();

        let summary = app
            .run(BufReader::new(reader), async {})
            .await
            .unwrap();
        assert!(summary.intake.is_none());
        assert_eq!(summary.jobs_succeeded, 0);
    }
}
