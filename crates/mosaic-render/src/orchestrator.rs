//! Renderer process orchestration.
//!
//! Each run gets its own working directory under the configured output
//! directory. The renderer is started in its own process group so a deadline
//! or cancellation can take down everything it spawned, and the child is
//! always reaped before the run returns.

use crate::config::RendererConfig;
use crate::error::{RenderError, RenderResult};
use crate::metrics::RenderMetrics;
use crate::request::{GenerationRequest, RenderInvocation};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every run directory name.
pub const RUN_DIR_PREFIX: &str = "run-";

/// How long to wait for output pipes to close after the child is gone.
const PIPE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A prepared run: inputs checked, working directory created.
#[derive(Debug, Clone)]
pub struct RunDir {
    /// Correlation id of the run.
    pub schema_uuid: Uuid,

    /// Working directory of the run.
    pub work_dir: PathBuf,

    /// Command line to execute.
    pub invocation: RenderInvocation,
}

/// Captured result of a successful renderer run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub schema_uuid: Uuid,
    pub work_dir: PathBuf,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Launches the renderer and enforces its deadline.
#[derive(Debug, Clone)]
pub struct ProcessOrchestrator {
    config: RendererConfig,
}

impl ProcessOrchestrator {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Prepare and execute a run in one step.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> RenderResult<RunOutput> {
        let run = self.prepare(request).await?;
        self.execute(&run, cancel).await
    }

    /// Validate the request, resolve its inputs and create the run directory.
    ///
    /// Nothing is created on disk unless every input exists.
    pub async fn prepare(&self, request: &GenerationRequest) -> RenderResult<RunDir> {
        request.validate()?;

        let script = resolve(&self.config.script_path, "renderer script").await?;
        let image = resolve(&request.image_path, "source image").await?;
        let palette = match &request.palette_path {
            Some(path) => Some(resolve(path, "palette").await?),
            None => None,
        };

        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let output_dir = tokio::fs::canonicalize(&self.config.output_dir).await?;

        let schema_uuid = Uuid::new_v4();
        let work_dir = output_dir.join(format!("{RUN_DIR_PREFIX}{schema_uuid}"));
        tokio::fs::create_dir(&work_dir).await?;

        let invocation = RenderInvocation::build(
            &self.config.command,
            &script,
            &image,
            palette.as_deref(),
            request,
        );

        debug!(
            schema_uuid = %schema_uuid,
            work_dir = %work_dir.display(),
            "Run directory prepared"
        );

        Ok(RunDir {
            schema_uuid,
            work_dir,
            invocation,
        })
    }

    /// Run the renderer inside `run.work_dir` until it exits, the deadline
    /// passes, or `cancel` fires.
    ///
    /// On timeout and cancellation the process group is killed and the
    /// child reaped; the working directory is left for the caller to clean.
    pub async fn execute(
        &self,
        run: &RunDir,
        cancel: &CancellationToken,
    ) -> RenderResult<RunOutput> {
        let deadline = self.config.timeout();
        let started = Instant::now();

        let mut command = run.invocation.command();
        command
            .current_dir(&run.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|err| {
            warn!(
                schema_uuid = %run.schema_uuid,
                error = %err,
                command = %run.invocation,
                "Failed to spawn renderer"
            );
            if err.kind() == ErrorKind::NotFound {
                RenderError::not_found("renderer command", &self.config.command)
            } else {
                RenderError::Spawn(err)
            }
        })?;

        let mut group = ProcessGroupGuard::new(child.id());
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        info!(
            schema_uuid = %run.schema_uuid,
            pid = child.id(),
            deadline_secs = deadline.as_secs(),
            command = %run.invocation,
            "Renderer started"
        );

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            () = tokio::time::sleep(deadline) => Outcome::TimedOut,
            () = cancel.cancelled() => Outcome::Cancelled,
        };

        // Stragglers left in the group are killed on every path.
        group.kill();
        if !matches!(outcome, Outcome::Exited(_)) {
            reap(&mut child).await;
        }

        let stdout = collect_output(stdout).await;
        let stderr = collect_output(stderr).await;
        let elapsed = started.elapsed();

        match outcome {
            Outcome::TimedOut => {
                warn!(
                    schema_uuid = %run.schema_uuid,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Renderer exceeded deadline, process group killed"
                );
                RenderMetrics::run_finished("timeout", elapsed);
                Err(RenderError::Timeout(deadline))
            }
            Outcome::Cancelled => {
                warn!(schema_uuid = %run.schema_uuid, "Renderer run cancelled");
                RenderMetrics::run_finished("cancelled", elapsed);
                Err(RenderError::Cancelled)
            }
            Outcome::Exited(Err(err)) => {
                RenderMetrics::run_finished("error", elapsed);
                Err(RenderError::Io(err))
            }
            Outcome::Exited(Ok(status)) if !status.success() => {
                warn!(
                    schema_uuid = %run.schema_uuid,
                    exit_code = status.code().map(i64::from).unwrap_or(-1),
                    elapsed_ms = elapsed.as_millis() as u64,
                    stderr = %stderr,
                    "Renderer failed"
                );
                RenderMetrics::run_finished("failed", elapsed);
                Err(RenderError::ExecutionFailed {
                    exit_code: status.code(),
                    stderr,
                })
            }
            Outcome::Exited(Ok(_)) => {
                info!(
                    schema_uuid = %run.schema_uuid,
                    elapsed_ms = elapsed.as_millis() as u64,
                    stdout_bytes = stdout.len(),
                    "Renderer finished"
                );
                RenderMetrics::run_finished("success", elapsed);
                Ok(RunOutput {
                    schema_uuid: run.schema_uuid,
                    work_dir: run.work_dir.clone(),
                    stdout,
                    stderr,
                    elapsed,
                })
            }
        }
    }
}

async fn resolve(path: &Path, kind: &'static str) -> RenderResult<PathBuf> {
    match tokio::fs::canonicalize(path).await {
        Ok(resolved) if resolved.is_file() => Ok(resolved),
        Ok(_) => Err(RenderError::not_found(kind, path)),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(RenderError::not_found(kind, path)),
        Err(err) => Err(RenderError::Io(err)),
    }
}

fn spawn_reader<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf).await;
        buf
    })
}

async fn collect_output(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    match tokio::time::timeout(PIPE_DRAIN_TIMEOUT, reader).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(err)) => {
            warn!(error = %err, "Renderer output reader failed");
            String::new()
        }
        Err(_) => {
            warn!("Renderer output pipe still open after kill, output discarded");
            String::new()
        }
    }
}

async fn reap(child: &mut Child) {
    if let Err(err) = child.kill().await {
        warn!(error = %err, "Failed to kill renderer");
    }
}

/// Kills the renderer's process group when dropped.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(err) => warn!(pgid, error = %err, "Failed to kill renderer process group"),
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}
