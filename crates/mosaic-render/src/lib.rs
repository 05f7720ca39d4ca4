//! Mosaic Render - Renderer Orchestration
//!
//! Drives the external mosaic renderer for one job at a time:
//! - Request validation and command-line building
//! - Process execution in an isolated run directory with a hard deadline
//! - Artifact discovery (preview, scheme, legend)
//! - ZIP packaging and hand-off to an [`ArtifactSink`]
//! - Idempotent cleanup and stale run sweeping
//!
//! [`RenderPipeline`] ties these together and implements
//! [`mosaic_jobs::JobExecutor`] so it can be driven by a worker pool.

pub mod cleanup;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod packager;
pub mod pipeline;
pub mod request;
pub mod sink;

pub use cleanup::{CleanupManager, CleanupReport};
pub use collector::{ArtifactCollector, Artifacts};
pub use config::{DeliveryConfig, RendererConfig};
pub use error::{RenderError, RenderResult};
pub use metrics::{register_metrics, RenderMetrics};
pub use orchestrator::{ProcessOrchestrator, RunDir, RunOutput, RUN_DIR_PREFIX};
pub use packager::ArchivePackager;
pub use pipeline::{GenerationResult, RenderJob, RenderPipeline, RenderState};
pub use request::{GenerationRequest, GenerationRequestBuilder, RenderInvocation};
pub use sink::{ArtifactSink, LocalDirSink};
