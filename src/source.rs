//! Source tree input.
//!
//! A [`SourceTree`] is a host directory plus ignore rules. Build output
//! directories (`obj`, `bin`) are ignored by default: they are never copied
//! into an environment and never contribute to the tree's fingerprint.

use glob::{MatchOptions, Pattern};
use path_absolutize::Absolutize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ignore globs applied to every source tree unless replaced
pub const DEFAULT_IGNORES: &[&str] = &["**/obj", "**/bin"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A host directory that build commands are pointed at.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTree {
    root: PathBuf,
    ignore: Vec<Pattern>,
}

impl SourceTree {
    /// Open `root` with the default ignore rules.
    ///
    /// The path is made absolute; it must be an existing directory.
    pub fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().absolutize()?.into_owned();
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("source tree is not a directory: {}", root.display()),
            ));
        }
        let ignore = DEFAULT_IGNORES
            .iter()
            .map(|p| Pattern::new(p).map_err(std::io::Error::other))
            .collect::<std::io::Result<Vec<_>>>()?;
        Ok(Self { root, ignore })
    }

    /// Add an extra ignore glob, matched against `/`-separated relative paths
    pub fn with_ignore(mut self, pattern: &str) -> Result<Self, glob::PatternError> {
        self.ignore.push(Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `relative` (a path inside the tree) is excluded
    pub fn is_ignored(&self, relative: &Path) -> bool {
        let rel = relative_str(relative);
        self.ignore
            .iter()
            .any(|p| p.matches_with(&rel, MATCH_OPTIONS))
    }

    /// Relative paths of every included regular file, sorted
    pub fn files(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| match entry.path().strip_prefix(&self.root) {
                Ok(rel) if rel.as_os_str().is_empty() => true,
                Ok(rel) => !self.is_ignored(rel),
                Err(_) => false,
            });

        for entry in walker {
            let entry = entry.map_err(std::io::Error::other)?;
            if entry.file_type().is_dir() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                files.push(rel.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Copy every included file into `dest`, preserving layout.
    ///
    /// Returns the number of files copied.
    pub fn stage(&self, dest: &Path) -> std::io::Result<usize> {
        std::fs::create_dir_all(dest)?;
        let files = self.files()?;
        for rel in &files {
            let target = dest.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(self.root.join(rel), &target)?;
        }
        Ok(files.len())
    }

    /// SHA-256 over the sorted relative paths and contents of included files
    pub fn fingerprint(&self) -> std::io::Result<String> {
        let mut hasher = Sha256::new();
        for rel in self.files()? {
            let contents = std::fs::read(self.root.join(&rel))?;
            hasher.update(relative_str(&rel).as_bytes());
            hasher.update([0u8]);
            hasher.update((contents.len() as u64).to_le_bytes());
            hasher.update(&contents);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

fn relative_str(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/Cli/obj")).unwrap();
        fs::create_dir_all(root.join("src/Cli/bin/Release")).unwrap();
        fs::create_dir_all(root.join("bin")).unwrap();
        fs::write(root.join("src/Cli/Program.cs"), "class Program {}").unwrap();
        fs::write(root.join("src/Cli/Cli.csproj"), "<Project />").unwrap();
        fs::write(root.join("src/Cli/obj/project.assets.json"), "{}").unwrap();
        fs::write(root.join("src/Cli/bin/Release/cli.dll"), "binary").unwrap();
        fs::write(root.join("bin/stale"), "x").unwrap();
        fs::write(root.join("README.md"), "readme").unwrap();
        dir
    }

    #[test]
    fn test_files_skip_build_output() {
        let dir = sample_tree();
        let tree = SourceTree::open(dir.path()).unwrap();
        let files: Vec<String> = tree.files().unwrap().iter().map(|p| relative_str(p)).collect();
        assert_eq!(
            files,
            vec!["README.md", "src/Cli/Cli.csproj", "src/Cli/Program.cs"]
        );
    }

    #[test]
    fn test_objbin_is_not_obj() {
        let dir = sample_tree();
        fs::create_dir_all(dir.path().join("objects")).unwrap();
        fs::write(dir.path().join("objects/keep.txt"), "keep").unwrap();
        let tree = SourceTree::open(dir.path()).unwrap();
        assert!(tree.files().unwrap().contains(&PathBuf::from("objects/keep.txt")));
    }

    #[test]
    fn test_fingerprint_ignores_build_output() {
        let dir = sample_tree();
        let tree = SourceTree::open(dir.path()).unwrap();
        let before = tree.fingerprint().unwrap();

        fs::write(dir.path().join("src/Cli/bin/Release/cli.dll"), "changed").unwrap();
        assert_eq!(before, tree.fingerprint().unwrap());

        fs::write(dir.path().join("src/Cli/Program.cs"), "class Program { }").unwrap();
        assert_ne!(before, tree.fingerprint().unwrap());
    }

    #[test]
    fn test_stage_copies_included_files() {
        let dir = sample_tree();
        let dest = tempfile::tempdir().unwrap();
        let tree = SourceTree::open(dir.path()).unwrap();

        let copied = tree.stage(dest.path()).unwrap();
        assert_eq!(copied, 3);
        assert!(dest.path().join("src/Cli/Program.cs").is_file());
        assert!(!dest.path().join("src/Cli/obj").exists());
        assert!(!dest.path().join("bin").exists());
    }

    #[test]
    fn test_extra_ignore() {
        let dir = sample_tree();
        let tree = SourceTree::open(dir.path())
            .unwrap()
            .with_ignore("*.md")
            .unwrap();
        assert!(!tree.files().unwrap().contains(&PathBuf::from("README.md")));
    }

    #[test]
    fn test_open_rejects_file() {
        let dir = sample_tree();
        assert!(SourceTree::open(dir.path().join("README.md")).is_err());
    }
}
