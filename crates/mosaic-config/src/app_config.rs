//! Application configuration structures.

use mosaic_core::TelemetryConfig;
use mosaic_jobs::JobsConfig;
use mosaic_render::{DeliveryConfig, RendererConfig};
use serde::{Deserialize, Serialize};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Queue, worker pool and retry settings.
    #[serde(default)]
    pub jobs: JobsConfig,

    /// External renderer settings.
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Archive delivery settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Application version.
    #[serde(default = "default_version")]
    pub version: String,
    /// Environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: default_name(),
            version: default_version(),
            environment: default_environment(),
        }
    }
}

fn default_name() -> String {
    "mosaic-worker".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl AppMetadata {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
