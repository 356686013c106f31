//! Build matrix: every platform a native artifact can be produced for.
//!
//! The standard table is compiled in. It is handed to the aggregate builder
//! as a value so tests can substitute synthetic matrices.

use crate::error::MatrixError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// SDK image used for linux native builds
pub const LINUX_NATIVE_IMAGE: &str = "mcr.microsoft.com/dotnet/sdk:10.0-preview-trixie-slim";

/// Image used for darwin native builds
pub const DARWIN_NATIVE_IMAGE: &str = "sickcodes/docker-osx:auto";

/// Operating-system family of a matrix entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Linux,
    Darwin,
}

impl OperatingSystem {
    /// Lowercase name, as used on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Darwin => "darwin",
        }
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linux" => Ok(OperatingSystem::Linux),
            "darwin" | "osx" | "macos" => Ok(OperatingSystem::Darwin),
            other => Err(format!(
                "unknown operating system '{}' (expected linux or darwin)",
                other
            )),
        }
    }
}

/// CPU architecture of a target or of a build environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X64,
    Arm64,
}

impl Architecture {
    /// Architecture of the machine running the container engine.
    ///
    /// Containers run images for the host architecture unless told otherwise,
    /// so this is the native architecture of every base image we pull.
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => Architecture::Arm64,
            _ => Architecture::X64,
        }
    }

    /// Suffix used in runtime identifiers
    pub fn rid_suffix(self) -> &'static str {
        match self {
            Architecture::X64 => "x64",
            Architecture::Arm64 => "arm64",
        }
    }

    /// Debian architecture name (`dpkg --add-architecture`)
    pub fn debian_arch(self) -> &'static str {
        match self {
            Architecture::X64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }

    /// GNU triple as used in Debian cross-toolchain package names
    pub fn gnu_triple(self) -> &'static str {
        match self {
            Architecture::X64 => "x86-64-linux-gnu",
            Architecture::Arm64 => "aarch64-linux-gnu",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.rid_suffix())
    }
}

/// Runtime identifier naming one (OS, architecture) pair, e.g. `linux-arm64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    /// Parse `<os>-<arch>`, where arch is `x64` or `arm64`
    pub fn parse(id: &str) -> Result<Self, MatrixError> {
        let id = id.trim();
        let Some((os, arch)) = id.rsplit_once('-') else {
            return Err(MatrixError::InvalidTarget {
                target: id.to_string(),
                reason: "expected <os>-<arch>".to_string(),
            });
        };
        if os.is_empty() {
            return Err(MatrixError::InvalidTarget {
                target: id.to_string(),
                reason: "missing operating system".to_string(),
            });
        }
        if !matches!(arch, "x64" | "arm64") {
            return Err(MatrixError::InvalidTarget {
                target: id.to_string(),
                reason: format!("unsupported architecture '{}'", arch),
            });
        }
        Ok(Self(id.to_string()))
    }

    /// The identifier string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Target CPU architecture
    pub fn architecture(&self) -> Architecture {
        if self.0.ends_with("-arm64") {
            Architecture::Arm64
        } else {
            Architecture::X64
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TargetId {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One row of the build matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    pub os: OperatingSystem,
    pub target: TargetId,
    pub image: String,
}

impl MatrixEntry {
    pub fn new(os: OperatingSystem, target: TargetId, image: impl Into<String>) -> Self {
        Self {
            os,
            target,
            image: image.into(),
        }
    }
}

/// Ordered set of matrix entries with unique target identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildMatrix {
    entries: Vec<MatrixEntry>,
}

impl BuildMatrix {
    /// Build a matrix, rejecting duplicate target identifiers.
    pub fn new(entries: Vec<MatrixEntry>) -> Result<Self, MatrixError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.target.as_str()) {
                return Err(MatrixError::DuplicateTarget {
                    target: entry.target.to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// The compiled-in matrix: linux x64/arm64 and darwin x64/arm64.
    pub fn standard() -> Self {
        let row = |os, id: &str, image: &str| MatrixEntry {
            os,
            target: TargetId(id.to_string()),
            image: image.to_string(),
        };
        Self {
            entries: vec![
                row(OperatingSystem::Linux, "linux-x64", LINUX_NATIVE_IMAGE),
                row(OperatingSystem::Linux, "linux-arm64", LINUX_NATIVE_IMAGE),
                row(OperatingSystem::Darwin, "osx-x64", DARWIN_NATIVE_IMAGE),
                row(OperatingSystem::Darwin, "osx-arm64", DARWIN_NATIVE_IMAGE),
            ],
        }
    }

    pub fn entries(&self) -> &[MatrixEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries for one operating-system family, in matrix order
    pub fn for_os(&self, os: OperatingSystem) -> Vec<&MatrixEntry> {
        self.entries.iter().filter(|e| e.os == os).collect()
    }

    /// Find the entry for `target`; an unknown target is an error, never a no-op.
    pub fn lookup(&self, target: &str) -> Result<&MatrixEntry, MatrixError> {
        self.entries
            .iter()
            .find(|e| e.target.as_str() == target)
            .ok_or_else(|| MatrixError::UnknownTarget {
                target: target.to_string(),
                known: self.entries.iter().map(|e| e.target.to_string()).collect(),
            })
    }

    /// Entries for an explicit list of targets. Every target must exist.
    ///
    /// A target named more than once is selected once, at its first position.
    pub fn select(&self, targets: &[TargetId]) -> Result<Vec<&MatrixEntry>, MatrixError> {
        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(targets.len());
        for target in targets {
            let entry = self.lookup(target.as_str())?;
            if seen.insert(target.as_str()) {
                selected.push(entry);
            }
        }
        Ok(selected)
    }
}

impl Default for BuildMatrix {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_matrix_targets_are_unique() {
        let matrix = BuildMatrix::standard();
        assert!(BuildMatrix::new(matrix.entries().to_vec()).is_ok());
        assert_eq!(matrix.entries().len(), 4);
    }

    #[test]
    fn test_for_os_partitions_matrix() {
        let matrix = BuildMatrix::standard();
        let linux: Vec<_> = matrix
            .for_os(OperatingSystem::Linux)
            .iter()
            .map(|e| e.target.as_str())
            .collect();
        let darwin: Vec<_> = matrix
            .for_os(OperatingSystem::Darwin)
            .iter()
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(linux, vec!["linux-x64", "linux-arm64"]);
        assert_eq!(darwin, vec!["osx-x64", "osx-arm64"]);
    }

    #[test]
    fn test_lookup_unknown_target_fails() {
        let matrix = BuildMatrix::standard();
        let err = matrix.lookup("win-x64").unwrap_err();
        match err {
            MatrixError::UnknownTarget { target, known } => {
                assert_eq!(target, "win-x64");
                assert!(known.contains(&"linux-arm64".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let entry = MatrixEntry::new(
            OperatingSystem::Linux,
            TargetId::parse("linux-x64").unwrap(),
            LINUX_NATIVE_IMAGE,
        );
        let err = BuildMatrix::new(vec![entry.clone(), entry]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::DuplicateTarget {
                target: "linux-x64".to_string()
            }
        );
    }

    #[test]
    fn test_select_drops_repeated_targets() {
        let matrix = BuildMatrix::standard();
        let targets = [
            TargetId::parse("osx-arm64").unwrap(),
            TargetId::parse("linux-x64").unwrap(),
            TargetId::parse("osx-arm64").unwrap(),
        ];
        let selected: Vec<_> = matrix
            .select(&targets)
            .unwrap()
            .iter()
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(selected, vec!["osx-arm64", "linux-x64"]);
    }

    #[test]
    fn test_target_architecture() {
        assert_eq!(
            TargetId::parse("linux-arm64").unwrap().architecture(),
            Architecture::Arm64
        );
        assert_eq!(
            TargetId::parse("osx-x64").unwrap().architecture(),
            Architecture::X64
        );
    }

    #[test]
    fn test_target_parse_rejects_malformed() {
        assert!(TargetId::parse("linux").is_err());
        assert!(TargetId::parse("-x64").is_err());
        assert!(TargetId::parse("linux-riscv64").is_err());
    }

    #[test]
    fn test_operating_system_from_str() {
        assert_eq!("Linux".parse::<OperatingSystem>(), Ok(OperatingSystem::Linux));
        assert_eq!("osx".parse::<OperatingSystem>(), Ok(OperatingSystem::Darwin));
        assert!("windows".parse::<OperatingSystem>().is_err());
    }
}
