//! ZIP packaging of run artifacts.

use crate::collector::Artifacts;
use crate::error::{RenderError, RenderResult};
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds the delivery archive for a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchivePackager;

impl ArchivePackager {
    pub fn new() -> Self {
        Self
    }

    /// Writes `<schema_uuid>.zip` into `dir` holding every artifact present.
    ///
    /// Entries are named `preview.<ext>`, `scheme.<ext>` and `legend.csv`.
    /// The archive only appears under its final name once it is complete.
    pub async fn package(
        &self,
        dir: &Path,
        schema_uuid: Uuid,
        artifacts: &Artifacts,
    ) -> RenderResult<PathBuf> {
        let archive_path = dir.join(format!("{schema_uuid}.zip"));
        let partial_path = dir.join(format!("{schema_uuid}.zip.partial"));
        let entries = archive_entries(artifacts);

        let target = archive_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let written = write_archive(&partial_path, &entries)
                .and_then(|()| std::fs::rename(&partial_path, &target).map_err(archive_error));
            if written.is_err() {
                let _ = std::fs::remove_file(&partial_path);
            }
            written.map(|()| entries.len())
        })
        .await
        .map_err(|e| RenderError::Archive(format!("packaging task failed: {e}")))?;

        match result {
            Ok(count) => {
                debug!(
                    archive = %archive_path.display(),
                    entries = count,
                    "Archive written"
                );
                Ok(archive_path)
            }
            Err(err) => {
                warn!(archive = %archive_path.display(), error = %err, "Archive failed");
                Err(err)
            }
        }
    }
}

fn archive_entries(artifacts: &Artifacts) -> Vec<(String, PathBuf)> {
    let mut entries = Vec::with_capacity(3);
    for (name, path) in [("preview", &artifacts.preview), ("scheme", &artifacts.scheme)] {
        if let Some(path) = path {
            entries.push((format!("{name}.{}", extension_of(path)), path.clone()));
        }
    }
    if let Some(path) = &artifacts.legend {
        entries.push(("legend.csv".to_string(), path.clone()));
    }
    entries
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn archive_error(err: impl std::fmt::Display) -> RenderError {
    RenderError::Archive(err.to_string())
}

fn write_archive(path: &Path, entries: &[(String, PathBuf)]) -> RenderResult<()> {
    let file = File::create(path).map_err(archive_error)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, source) in entries {
        let mut reader = File::open(source)
            .map(BufReader::new)
            .map_err(|e| archive_error(format!("{}: {e}", source.display())))?;
        zip.start_file(name.as_str(), options).map_err(archive_error)?;
        io::copy(&mut reader, &mut zip).map_err(archive_error)?;
    }

    let mut writer = zip.finish().map_err(archive_error)?;
    io::Write::flush(&mut writer).map_err(archive_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_packages_present_artifacts() {
        let dir = TempDir::new().unwrap();
        let preview = dir.path().join("out_preview.PNG");
        let legend = dir.path().join("colors_legend.csv");
        std::fs::write(&preview, b"preview-bytes").unwrap();
        std::fs::write(&legend, b"id,color\n1,#fff\n").unwrap();

        let artifacts = Artifacts {
            preview: Some(preview),
            scheme: None,
            legend: Some(legend),
        };
        let uuid = Uuid::new_v4();
        let path = ArchivePackager::new()
            .package(dir.path(), uuid, &artifacts)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join(format!("{uuid}.zip")));
        assert_eq!(entry_names(&path), vec!["legend.csv", "preview.png"]);

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("preview.png")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "preview-bytes");
    }

    #[tokio::test]
    async fn test_empty_artifacts_give_empty_archive() {
        let dir = TempDir::new().unwrap();
        let path = ArchivePackager::new()
            .package(dir.path(), Uuid::new_v4(), &Artifacts::default())
            .await
            .unwrap();
        assert!(entry_names(&path).is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_source_leaves_no_archive() {
        let dir = TempDir::new().unwrap();
        let uuid = Uuid::new_v4();
        let artifacts = Artifacts {
            scheme: Some(dir.path().join("vanished_scheme.png")),
            ..Default::default()
        };

        let err = ArchivePackager::new()
            .package(dir.path(), uuid, &artifacts)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Archive(_)));
        assert!(!dir.path().join(format!("{uuid}.zip")).exists());
        assert!(!dir.path().join(format!("{uuid}.zip.partial")).exists());
    }
}
