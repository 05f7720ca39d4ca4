//! Removal of temporary run files.

use crate::error::{RenderError, RenderResult};
use crate::metrics::RenderMetrics;
use crate::orchestrator::RUN_DIR_PREFIX;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Outcome of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Paths deleted by this pass.
    pub removed: Vec<PathBuf>,

    /// Paths that were already gone.
    pub missing: Vec<PathBuf>,

    /// Paths that could not be deleted, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Deletes temporary files and stale run directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupManager;

impl CleanupManager {
    pub fn new() -> Self {
        Self
    }

    /// Removes every path, file or directory tree.
    ///
    /// A path that no longer exists counts as removed, so repeating a call
    /// is harmless. All paths are attempted even if some fail; failures are
    /// returned together as [`RenderError::Cleanup`].
    pub async fn cleanup(&self, paths: &[PathBuf]) -> RenderResult<CleanupReport> {
        let mut report = CleanupReport::default();

        for path in paths {
            match remove_path(path).await {
                Ok(true) => report.removed.push(path.clone()),
                Ok(false) => report.missing.push(path.clone()),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to remove path");
                    report.failures.push((path.clone(), err.to_string()));
                }
            }
        }

        debug!(
            removed = report.removed.len(),
            missing = report.missing.len(),
            failed = report.failures.len(),
            "Cleanup finished"
        );

        if report.is_clean() {
            Ok(report)
        } else {
            RenderMetrics::cleanup_failures(report.failures.len());
            Err(RenderError::Cleanup(report))
        }
    }

    /// Deletes run directories under `output_dir` last modified more than
    /// `older_than` ago. Returns how many were removed.
    pub async fn sweep(&self, output_dir: &Path, older_than: Duration) -> RenderResult<usize> {
        let mut entries = match tokio::fs::read_dir(output_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let now = SystemTime::now();
        let mut stale = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let is_run = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(RUN_DIR_PREFIX));
            if !is_run {
                continue;
            }
            let metadata = entry.metadata().await?;
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if metadata.is_dir() && age >= older_than {
                stale.push(entry.path());
            }
        }

        if stale.is_empty() {
            return Ok(0);
        }

        let removed = match self.cleanup(&stale).await {
            Ok(report) => report.removed.len(),
            Err(RenderError::Cleanup(report)) => report.removed.len(),
            Err(err) => return Err(err),
        };
        info!(
            output_dir = %output_dir.display(),
            removed,
            "Stale run directories swept"
        );
        Ok(removed)
    }
}

/// Returns false if the path did not exist.
async fn remove_path(path: &Path) -> std::io::Result<bool> {
    let metadata = match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}
