//! Native artifacts and the merged output directory.

use crate::error::OutputError;
use crate::matrix::TargetId;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The single executable produced by one native build.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFile {
    pub target: TargetId,
    pub file_name: String,
    pub contents: Bytes,
}

impl ArtifactFile {
    /// `<target>/<file name>`, the artifact's place in an [`OutputDirectory`]
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.target.as_str()).join(&self.file_name)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Write the artifact to `path`, creating parent directories and marking
    /// it executable on Unix.
    pub fn write_to(&self, path: &Path) -> Result<(), OutputError> {
        let io_err = |source| OutputError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, &self.contents).map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .map_err(io_err)?;
        }

        Ok(())
    }
}

/// Artifacts keyed by relative path, at most one per path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDirectory {
    entries: BTreeMap<PathBuf, ArtifactFile>,
}

impl OutputDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact under `<target>/<file name>`. An occupied path is an error.
    pub fn insert(&mut self, artifact: ArtifactFile) -> Result<(), OutputError> {
        let path = artifact.relative_path();
        if self.entries.contains_key(&path) {
            return Err(OutputError::Collision { path });
        }
        self.entries.insert(path, artifact);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, relative: impl AsRef<Path>) -> Option<&ArtifactFile> {
        self.entries.get(relative.as_ref())
    }

    /// Entries in path order
    pub fn entries(&self) -> impl Iterator<Item = (&Path, &ArtifactFile)> {
        self.entries.iter().map(|(p, a)| (p.as_path(), a))
    }

    /// Distinct top-level directory names (one per target)
    pub fn top_level(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .values()
            .map(|a| a.target.to_string())
            .collect();
        names.dedup();
        names
    }

    /// Write every entry below `dir`. Returns the written host paths.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>, OutputError> {
        let mut written = Vec::with_capacity(self.entries.len());
        for (relative, artifact) in &self.entries {
            let path = dir.join(relative);
            artifact.write_to(&path)?;
            log::info!("wrote {} ({} bytes)", path.display(), artifact.len());
            written.push(path);
        }
        Ok(written)
    }
}
