//! Storage hand-off for finished archives.

use crate::error::{RenderError, RenderResult};
use crate::pipeline::GenerationResult;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

/// Destination for packaged archives.
///
/// Called once per successful run while the archive still exists on disk;
/// returns a location string identifying the stored copy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(
        &self,
        result: &GenerationResult,
        recipient: Option<String>,
    ) -> RenderResult<String>;
}

/// Copies archives into a local directory next to a JSON manifest.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    dir: PathBuf,
}

impl LocalDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

#[async_trait]
impl ArtifactSink for LocalDirSink {
    async fn persist(
        &self,
        result: &GenerationResult,
        recipient: Option<String>,
    ) -> RenderResult<String> {
        let sink_error = |e: std::io::Error| RenderError::Sink(format!("{}: {e}", self.dir.display()));

        tokio::fs::create_dir_all(&self.dir).await.map_err(sink_error)?;

        let target = self.dir.join(format!("{}.zip", result.schema_uuid));
        tokio::fs::copy(&result.archive_path, &target)
            .await
            .map_err(sink_error)?;

        let manifest = json!({
            "schema_uuid": result.schema_uuid,
            "archive": target,
            "recipient": recipient,
            "has_preview": result.preview_path.is_some(),
            "has_scheme": result.scheme_path.is_some(),
            "has_legend": result.legend_path.is_some(),
            "delivered_at": Utc::now(),
        });
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RenderError::Sink(e.to_string()))?;
        tokio::fs::write(
            self.dir.join(format!("{}.json", result.schema_uuid)),
            manifest_bytes,
        )
        .await
        .map_err(sink_error)?;

        info!(
            schema_uuid = %result.schema_uuid,
            target = %target.display(),
            recipient = recipient.as_deref().unwrap_or("-"),
            "Archive delivered"
        );
        Ok(target.display().to_string())
    }
}
