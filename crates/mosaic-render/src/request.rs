//! Generation requests and renderer argument building.

use crate::error::{RenderError, RenderResult};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Parameters of one mosaic render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Source image.
    pub image_path: PathBuf,

    /// Grid width in stones.
    pub stones_x: u32,

    /// Grid height in stones.
    pub stones_y: u32,

    /// Physical stone size in millimetres.
    pub stone_size_mm: f64,

    #[serde(default)]
    pub dpi: Option<u32>,

    #[serde(default)]
    pub preview_dpi: Option<u32>,

    #[serde(default)]
    pub scheme_dpi: Option<u32>,

    /// Renderer colour matching mode.
    #[serde(default)]
    pub mode: Option<String>,

    /// Renderer output style.
    #[serde(default)]
    pub style: Option<String>,

    /// Optional palette file restricting the available colours.
    #[serde(default)]
    pub palette_path: Option<PathBuf>,

    /// Ask the renderer for a colour legend CSV.
    #[serde(default)]
    pub with_legend: bool,

    /// Renderer worker thread count.
    #[serde(default)]
    pub threads: Option<u32>,
}

impl GenerationRequest {
    /// Starts a builder with the required parameters.
    pub fn builder(
        image_path: impl Into<PathBuf>,
        stones_x: u32,
        stones_y: u32,
        stone_size_mm: f64,
    ) -> GenerationRequestBuilder {
        GenerationRequestBuilder {
            request: Self {
                image_path: image_path.into(),
                stones_x,
                stones_y,
                stone_size_mm,
                dpi: None,
                preview_dpi: None,
                scheme_dpi: None,
                mode: None,
                style: None,
                palette_path: None,
                with_legend: false,
                threads: None,
            },
        }
    }

    /// Checks value ranges. File existence is checked at run time.
    pub fn validate(&self) -> RenderResult<()> {
        if self.image_path.as_os_str().is_empty() {
            return Err(invalid("image_path must not be empty"));
        }
        if self.stones_x == 0 || self.stones_y == 0 {
            return Err(invalid("grid dimensions must be positive"));
        }
        if !self.stone_size_mm.is_finite() || self.stone_size_mm <= 0.0 {
            return Err(invalid("stone_size_mm must be a positive number"));
        }
        for (name, value) in [
            ("dpi", self.dpi),
            ("preview_dpi", self.preview_dpi),
            ("scheme_dpi", self.scheme_dpi),
            ("threads", self.threads),
        ] {
            if value == Some(0) {
                return Err(invalid(format!("{name} must be greater than zero")));
            }
        }
        if self.mode.as_deref().is_some_and(|m| m.trim().is_empty()) {
            return Err(invalid("mode must not be blank"));
        }
        if self.style.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(invalid("style must not be blank"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> RenderError {
    RenderError::InvalidRequest(msg.into())
}

/// Builder for [`GenerationRequest`].
#[derive(Debug, Clone)]
pub struct GenerationRequestBuilder {
    request: GenerationRequest,
}

impl GenerationRequestBuilder {
    #[must_use]
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.request.dpi = Some(dpi);
        self
    }

    #[must_use]
    pub fn preview_dpi(mut self, dpi: u32) -> Self {
        self.request.preview_dpi = Some(dpi);
        self
    }

    #[must_use]
    pub fn scheme_dpi(mut self, dpi: u32) -> Self {
        self.request.scheme_dpi = Some(dpi);
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.request.mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn style(mut self, style: impl Into<String>) -> Self {
        self.request.style = Some(style.into());
        self
    }

    #[must_use]
    pub fn palette(mut self, path: impl Into<PathBuf>) -> Self {
        self.request.palette_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_legend(mut self, with_legend: bool) -> Self {
        self.request.with_legend = with_legend;
        self
    }

    #[must_use]
    pub fn threads(mut self, threads: u32) -> Self {
        self.request.threads = Some(threads);
        self
    }

    /// Validates and returns the request.
    pub fn build(self) -> RenderResult<GenerationRequest> {
        self.request.validate()?;
        Ok(self.request)
    }
}

/// Fully resolved renderer command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInvocation {
    program: OsString,
    args: Vec<OsString>,
}

impl RenderInvocation {
    /// Builds the renderer command line.
    ///
    /// `script`, `image` and `palette` are expected to be absolute, already
    /// resolved paths; optional flags are emitted only when set.
    pub fn build(
        command: &str,
        script: &Path,
        image: &Path,
        palette: Option<&Path>,
        request: &GenerationRequest,
    ) -> Self {
        let mut args: Vec<OsString> = vec![script.into(), image.into()];
        if let Some(palette) = palette {
            args.push(palette.into());
        }

        push_flag(&mut args, "--stones-x", request.stones_x);
        push_flag(&mut args, "--stones-y", request.stones_y);
        push_flag(&mut args, "--stone-size-mm", request.stone_size_mm);

        if let Some(dpi) = request.dpi {
            push_flag(&mut args, "--dpi", dpi);
        }
        if let Some(dpi) = request.preview_dpi {
            push_flag(&mut args, "--preview-dpi", dpi);
        }
        if let Some(dpi) = request.scheme_dpi {
            push_flag(&mut args, "--scheme-dpi", dpi);
        }
        if let Some(mode) = &request.mode {
            push_flag(&mut args, "--mode", mode);
        }
        if let Some(style) = &request.style {
            push_flag(&mut args, "--style", style);
        }
        if request.with_legend {
            args.push("--legend".into());
        }
        if let Some(threads) = request.threads {
            push_flag(&mut args, "--threads", threads);
        }

        Self {
            program: command.into(),
            args,
        }
    }

    /// Executable to launch.
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Arguments after the executable.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub(crate) fn command(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

fn push_flag(args: &mut Vec<OsString>, flag: &str, value: impl fmt::Display) {
    args.push(flag.into());
    args.push(value.to_string().into());
}

impl fmt::Display for RenderInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
