//! Configuration loader with layered sources.

use crate::AppConfig;
use config::{Config, ConfigError, Environment, File};
use mosaic_core::MosaicError;
use mosaic_jobs::JobError;
use mosaic_render::RenderError;
use std::path::Path;
use tracing::{debug, info, warn};

/// Environment variable selecting the environment overlay file.
pub const ENVIRONMENT_VAR: &str = "MOSAIC_ENVIRONMENT";

/// Prefix of environment variable overrides, e.g. `MOSAIC__JOBS__QUEUE__CAPACITY`.
pub const ENV_PREFIX: &str = "MOSAIC";

/// Layered configuration loader.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config: AppConfig,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `MOSAIC__` prefix
    pub fn new(config_dir: impl Into<String>) -> Result<Self, MosaicError> {
        let config = Self::load_config(&config_dir.into())?;
        Ok(Self { config })
    }

    /// Returns the loaded configuration.
    pub fn get(&self) -> &AppConfig {
        &self.config
    }

    /// Consumes the loader and returns the configuration.
    pub fn into_config(self) -> AppConfig {
        self.config
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str) -> Result<AppConfig, MosaicError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());
        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{config_dir}/{name}.toml");
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error)?;
        let mut app_config: AppConfig = config.try_deserialize().map_err(config_error)?;
        if std::env::var(ENVIRONMENT_VAR).is_ok() {
            app_config.app.environment = environment;
        }

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration.
    ///
    /// With sweeping enabled, the stale run age must exceed both the
    /// renderer deadline and the per-attempt job timeout.
    pub fn validate_config(config: &AppConfig) -> Result<(), MosaicError> {
        config.jobs.validate().map_err(job_config_error)?;
        config.renderer.validate().map_err(render_config_error)?;

        if config.renderer.sweep_interval().is_some() {
            let longest_run = config
                .renderer
                .timeout_secs
                .max(config.jobs.worker.job_timeout_secs);
            config
                .renderer
                .check_stale_after(longest_run)
                .map_err(render_config_error)?;
        }

        if config.jobs.worker.job_timeout_secs > 0
            && config.jobs.worker.job_timeout_secs < config.renderer.timeout_secs
        {
            warn!(
                job_timeout_secs = config.jobs.worker.job_timeout_secs,
                renderer_timeout_secs = config.renderer.timeout_secs,
                "Job timeout is shorter than the renderer deadline; renders may be cut off early"
            );
        }

        if !config.renderer.script_path.exists() {
            warn!(
                script = %config.renderer.script_path.display(),
                "Renderer script not found; every job will fail until it exists"
            );
        }

        if config.app.is_production() && config.renderer.output_dir.is_relative() {
            warn!(
                output_dir = %config.renderer.output_dir.display(),
                "Relative renderer output directory in production"
            );
        }

        Ok(())
    }
}

fn config_error(err: ConfigError) -> MosaicError {
    MosaicError::configuration(err.to_string())
}

fn job_config_error(err: JobError) -> MosaicError {
    match err {
        JobError::Configuration(msg) => MosaicError::configuration(msg),
        other => MosaicError::configuration(other.to_string()),
    }
}

fn render_config_error(err: RenderError) -> MosaicError {
    match err {
        RenderError::Configuration(msg) => MosaicError::configuration(msg),
        other => MosaicError::configuration(other.to_string()),
    }
}
