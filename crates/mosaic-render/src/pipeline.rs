//! End-to-end render job execution.

use crate::cleanup::CleanupManager;
use crate::collector::ArtifactCollector;
use crate::config::RendererConfig;
use crate::error::{RenderError, RenderResult};
use crate::metrics::RenderMetrics;
use crate::orchestrator::{ProcessOrchestrator, RunDir};
use crate::packager::ArchivePackager;
use crate::request::GenerationRequest;
use crate::sink::ArtifactSink;
use async_trait::async_trait;
use mosaic_jobs::{JobContext, JobError, JobExecutor, JobResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Payload of a render job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderJob {
    pub request: GenerationRequest,

    /// Who the finished archive is for.
    #[serde(default)]
    pub recipient: Option<String>,
}

impl RenderJob {
    pub fn new(request: GenerationRequest) -> Self {
        Self {
            request,
            recipient: None,
        }
    }

    #[must_use]
    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Files produced by one successful render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    /// Correlation id shared by the run directory and the archive.
    pub schema_uuid: Uuid,
    pub work_dir: PathBuf,
    pub preview_path: Option<PathBuf>,
    pub scheme_path: Option<PathBuf>,
    pub legend_path: Option<PathBuf>,
    pub archive_path: PathBuf,
}

impl GenerationResult {
    /// Every temporary path of the run, files before their directory.
    pub fn temp_paths(&self) -> Vec<PathBuf> {
        [
            self.preview_path.as_ref(),
            self.scheme_path.as_ref(),
            self.legend_path.as_ref(),
            Some(&self.archive_path),
            Some(&self.work_dir),
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }
}

/// Per-run progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderState {
    Pending,
    Executing,
    Completed,
    TimedOut,
    ExecutionFailed,
    Packaged,
    CleanedUp,
}

impl RenderState {
    /// Returns true if the run may move from `self` to `next`.
    pub fn can_transition_to(self, next: RenderState) -> bool {
        use RenderState::*;
        matches!(
            (self, next),
            (Pending, Executing)
                | (Executing, Completed | TimedOut | ExecutionFailed)
                | (Completed, Packaged)
                | (Packaged, CleanedUp)
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RenderState::TimedOut | RenderState::ExecutionFailed | RenderState::CleanedUp
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RenderState::Pending => "pending",
            RenderState::Executing => "executing",
            RenderState::Completed => "completed",
            RenderState::TimedOut => "timed_out",
            RenderState::ExecutionFailed => "execution_failed",
            RenderState::Packaged => "packaged",
            RenderState::CleanedUp => "cleaned_up",
        }
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct StateTracker {
    schema_uuid: Uuid,
    state: RenderState,
}

impl StateTracker {
    fn new(schema_uuid: Uuid) -> Self {
        Self {
            schema_uuid,
            state: RenderState::Pending,
        }
    }

    fn advance(&mut self, next: RenderState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid render transition {} -> {next}",
            self.state
        );
        debug!(
            schema_uuid = %self.schema_uuid,
            from = %self.state,
            to = %next,
            "Render state changed"
        );
        self.state = next;
    }
}

/// Runs a render job from request to delivered archive.
pub struct RenderPipeline {
    orchestrator: ProcessOrchestrator,
    collector: ArtifactCollector,
    packager: ArchivePackager,
    cleanup: CleanupManager,
    sink: Arc<dyn ArtifactSink>,
    shutdown: CancellationToken,
}

impl RenderPipeline {
    pub fn new(config: RendererConfig, sink: Arc<dyn ArtifactSink>) -> Self {
        Self {
            orchestrator: ProcessOrchestrator::new(config),
            collector: ArtifactCollector::new(),
            packager: ArchivePackager::new(),
            cleanup: CleanupManager::new(),
            sink,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use `token` to abort running renders, e.g. on forced shutdown.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn config(&self) -> &RendererConfig {
        self.orchestrator.config()
    }

    /// Render, package, deliver and clean up one job.
    ///
    /// Temporary files are removed on success and on failure after the run
    /// directory was created; a failed cleanup does not fail the render.
    pub async fn render(&self, job: &RenderJob) -> RenderResult<GenerationResult> {
        let run = self.orchestrator.prepare(&job.request).await?;
        let mut tracker = StateTracker::new(run.schema_uuid);

        tracker.advance(RenderState::Executing);
        let cancel = self.shutdown.child_token();
        if let Err(err) = self.orchestrator.execute(&run, &cancel).await {
            tracker.advance(match err {
                RenderError::Timeout(_) => RenderState::TimedOut,
                _ => RenderState::ExecutionFailed,
            });
            self.discard(&run.work_dir).await;
            return Err(err);
        }
        tracker.advance(RenderState::Completed);

        let result = match self.deliver(&run, job, &mut tracker).await {
            Ok(result) => result,
            Err(err) => {
                warn!(
                    schema_uuid = %run.schema_uuid,
                    error = %err,
                    state = %tracker.state,
                    "Render delivery failed"
                );
                self.discard(&run.work_dir).await;
                return Err(err);
            }
        };

        match self.cleanup.cleanup(&result.temp_paths()).await {
            Ok(_) => tracker.advance(RenderState::CleanedUp),
            Err(err) => warn!(
                schema_uuid = %run.schema_uuid,
                error = %err,
                "Cleanup after render failed"
            ),
        }

        Ok(result)
    }

    async fn deliver(
        &self,
        run: &RunDir,
        job: &RenderJob,
        tracker: &mut StateTracker,
    ) -> RenderResult<GenerationResult> {
        let artifacts = self.collector.collect(&run.work_dir).await?;
        if artifacts.is_empty() {
            warn!(
                schema_uuid = %run.schema_uuid,
                work_dir = %run.work_dir.display(),
                "ArtifactMissing: renderer produced no recognised output"
            );
            RenderMetrics::artifacts_missing();
        }

        let archive_path = self
            .packager
            .package(&run.work_dir, run.schema_uuid, &artifacts)
            .await?;

        let result = GenerationResult {
            schema_uuid: run.schema_uuid,
            work_dir: run.work_dir.clone(),
            preview_path: artifacts.preview,
            scheme_path: artifacts.scheme,
            legend_path: artifacts.legend,
            archive_path,
        };
        tracker.advance(RenderState::Packaged);

        let location = self.sink.persist(&result, job.recipient.clone()).await?;
        info!(
            schema_uuid = %result.schema_uuid,
            location = %location,
            "Render delivered"
        );
        Ok(result)
    }

    async fn discard(&self, work_dir: &Path) {
        if let Err(err) = self.cleanup.cleanup(&[work_dir.to_path_buf()]).await {
            warn!(
                work_dir = %work_dir.display(),
                error = %err,
                "Failed to remove run directory"
            );
        }
    }
}

#[async_trait]
impl JobExecutor<RenderJob> for RenderPipeline {
    async fn execute(&self, job: &RenderJob, ctx: JobContext) -> JobResult<()> {
        let span = tracing::info_span!(
            "render",
            job_id = %ctx.job_id,
            attempt = ctx.attempt,
            worker = %ctx.worker_id
        );
        self.render(job)
            .instrument(span)
            .await
            .map(|_| ())
            .map_err(JobError::from)
    }
}
