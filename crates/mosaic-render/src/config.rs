//! Renderer and delivery configuration.

use crate::error::{RenderError, RenderResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// External renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Interpreter or executable that runs the renderer script.
    #[serde(default = "default_command")]
    pub command: String,

    /// Renderer script passed as the first argument.
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,

    /// Parent directory of the per-run working directories.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Hard deadline for one renderer run in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Interval between stale run sweeps in seconds (0 disables sweeping).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Age after which a leftover run directory is considered stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            script_path: default_script_path(),
            output_dir: default_output_dir(),
            timeout_secs: default_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            stale_after_secs: default_stale_after(),
        }
    }
}

fn default_command() -> String {
    "python3".to_string()
}

fn default_script_path() -> PathBuf {
    PathBuf::from("scripts/mosaic_generator.py")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data/runs")
}

fn default_timeout() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_stale_after() -> u64 {
    86400
}

impl RendererConfig {
    /// Returns the run deadline as Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the sweep interval, if sweeping is enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Returns the stale run age as Duration.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    /// Rejects settings that cannot produce a run.
    ///
    /// With sweeping enabled, a run directory must outlive the run deadline
    /// before it counts as stale.
    pub fn validate(&self) -> RenderResult<()> {
        if self.command.trim().is_empty() {
            return Err(config_error("renderer.command must not be empty"));
        }
        if self.timeout_secs == 0 {
            return Err(config_error("renderer.timeout_secs must be greater than zero"));
        }
        if self.sweep_interval().is_some() {
            self.check_stale_after(self.timeout_secs)?;
        }
        Ok(())
    }

    /// Rejects a stale age that does not exceed `longest_run_secs`.
    pub fn check_stale_after(&self, longest_run_secs: u64) -> RenderResult<()> {
        if self.stale_after_secs <= longest_run_secs {
            return Err(config_error(format!(
                "renderer.stale_after_secs ({}) must exceed the longest run ({longest_run_secs}s)",
                self.stale_after_secs
            )));
        }
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> RenderError {
    RenderError::Configuration(msg.into())
}

/// Where finished archives are delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Destination directory for the local sink.
    #[serde(default = "default_delivery_dir")]
    pub dir: PathBuf,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            dir: default_delivery_dir(),
        }
    }
}

fn default_delivery_dir() -> PathBuf {
    PathBuf::from("data/delivered")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(600));
        assert_eq!(config.sweep_interval(), Some(Duration::from_secs(3600)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RendererConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_command_rejected() {
        let config = RendererConfig {
            command: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stale_age_must_exceed_deadline() {
        let config = RendererConfig {
            timeout_secs: 600,
            stale_after_secs: 600,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(RenderError::Configuration(_))
        ));

        let config = RendererConfig {
            stale_after_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stale_age_ignored_when_sweep_disabled() {
        let config = RendererConfig {
            sweep_interval_secs: 0,
            stale_after_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_command_is_configuration_error() {
        let config = RendererConfig {
            command: String::new(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert!(err.to_string().contains("renderer.command"));
    }

    #[test]
    fn test_sweep_disabled() {
        let config = RendererConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.sweep_interval(), None);
    }
}
