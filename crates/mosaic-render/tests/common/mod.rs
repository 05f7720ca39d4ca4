//! Fake renderer fixtures.

use mosaic_render::{GenerationRequest, RendererConfig};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Sandbox holding a fake renderer script, an input image and a run root.
pub struct Sandbox {
    pub dir: TempDir,
    pub script: PathBuf,
    pub image: PathBuf,
}

impl Sandbox {
    /// Creates a sandbox whose renderer runs `body` as a POSIX shell script.
    pub fn new(body: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let script = dir.path().join("fake-renderer.sh");
        fs::write(&script, format!("#!/bin/sh\nset -eu\n{body}")).expect("write script");
        make_executable(&script);

        let image = dir.path().join("photo.jpg");
        fs::write(&image, b"not really a jpeg").expect("write image");

        Self { dir, script, image }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.dir.path().join("runs")
    }

    pub fn config(&self, timeout_secs: u64) -> RendererConfig {
        RendererConfig {
            command: "sh".to_string(),
            script_path: self.script.clone(),
            output_dir: self.runs_dir(),
            timeout_secs,
            ..Default::default()
        }
    }

    pub fn request(&self) -> GenerationRequest {
        GenerationRequest::builder(&self.image, 20, 10, 2.5)
            .build()
            .expect("valid request")
    }

    /// Run directories currently present.
    pub fn run_dirs(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.runs_dir()) {
            Ok(entries) => entries.map(|e| e.expect("entry").path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn make_executable(path: &Path) {
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("set perms");
}

/// Returns true while a process with `pid` exists and is not a zombie.
pub fn process_alive(pid: i32) -> bool {
    if let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) {
        // State is the first field after the parenthesised command name.
        return stat
            .rsplit_once(')')
            .map_or(true, |(_, rest)| !rest.trim_start().starts_with('Z'));
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Polls until `pid` is gone or `attempts` x 50ms pass.
pub async fn wait_until_gone(pid: i32, attempts: u32) -> bool {
    for _ in 0..attempts {
        if !process_alive(pid) {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    !process_alive(pid)
}
