//! Artifact discovery in a finished run directory.

use crate::error::RenderResult;
use std::path::{Path, PathBuf};
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Output files found for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Artifacts {
    pub preview: Option<PathBuf>,
    pub scheme: Option<PathBuf>,
    pub legend: Option<PathBuf>,
}

impl Artifacts {
    /// Returns true if the run produced nothing recognisable.
    pub fn is_empty(&self) -> bool {
        self.preview.is_none() && self.scheme.is_none() && self.legend.is_none()
    }

    /// Number of artifacts found.
    pub fn count(&self) -> usize {
        [&self.preview, &self.scheme, &self.legend]
            .into_iter()
            .filter(|p| p.is_some())
            .count()
    }
}

/// Artifact category a file name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Preview,
    Scheme,
    Legend,
}

impl Category {
    const ALL: [Category; 3] = [Category::Preview, Category::Scheme, Category::Legend];

    fn matches(self, stem: &str, extension: &str) -> bool {
        match self {
            Category::Preview => stem.contains("preview") && IMAGE_EXTENSIONS.contains(&extension),
            Category::Scheme => stem.contains("scheme") && IMAGE_EXTENSIONS.contains(&extension),
            Category::Legend => stem.contains("legend") && extension == "csv",
        }
    }
}

/// Scans run directories for renderer output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactCollector;

impl ArtifactCollector {
    pub fn new() -> Self {
        Self
    }

    /// Looks for preview, scheme and legend files directly inside `dir`.
    ///
    /// Matching ignores case. When several files fit a category the
    /// lexicographically smallest name is taken. Missing categories are not
    /// an error.
    pub async fn collect(&self, dir: &Path) -> RenderResult<Artifacts> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut artifacts = Artifacts::default();
        for name in &names {
            let path = Path::new(name);
            let (Some(stem), Some(extension)) = (path.file_stem(), path.extension()) else {
                continue;
            };
            let stem = stem.to_string_lossy().to_lowercase();
            let extension = extension.to_string_lossy().to_lowercase();

            for category in Category::ALL {
                let slot = match category {
                    Category::Preview => &mut artifacts.preview,
                    Category::Scheme => &mut artifacts.scheme,
                    Category::Legend => &mut artifacts.legend,
                };
                if slot.is_none() && category.matches(&stem, &extension) {
                    *slot = Some(dir.join(name));
                }
            }
        }

        debug!(
            dir = %dir.display(),
            files = names.len(),
            found = artifacts.count(),
            "Artifacts collected"
        );
        Ok(artifacts)
    }
}
