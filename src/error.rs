//! Error types for pipeline operations.
//!
//! Errors are layered the same way the pipeline is: the execution layer
//! reports [`EnvError`], a single native build turns that into a
//! [`BuildError`] naming its target, and entry points surface everything as
//! [`PipelineError`] with recovery suggestions.

use crate::environment::Phase;
use crate::matrix::TargetId;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for all pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Single-target native build errors
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Execution environment errors outside of a native build
    #[error("Environment error: {0}")]
    Environment(#[from] EnvError),

    /// Build matrix errors
    #[error("Matrix error: {0}")]
    Matrix(#[from] MatrixError),

    /// Aggregate output errors
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// One or more targets failed in continue-on-error mode
    #[error("{} target(s) failed: {}", failures.len(), summarize(failures))]
    Aggregate {
        /// Every per-target failure, in completion order
        failures: Vec<BuildError>,
    },

    /// A command that must produce output printed nothing
    #[error("`{command}` succeeded but produced no output")]
    EmptyOutput {
        /// Command that ran
        command: String,
    },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// The caller-imposed deadline elapsed
    #[error("Operation exceeded its deadline of {seconds}s")]
    DeadlineExceeded {
        /// Deadline in seconds
        seconds: u64,
    },
}

fn summarize(failures: &[BuildError]) -> String {
    failures
        .iter()
        .map(|f| f.target().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised while realising an execution environment
#[derive(Error, Debug)]
pub enum EnvError {
    /// Base image could not be found or pulled
    #[error("Image '{image}' is unavailable: {reason}")]
    ImageUnavailable {
        /// Image address
        image: String,
        /// Reason for the error
        reason: String,
    },

    /// An exec step exited non-zero
    #[error("`{command}` failed during {phase} (exit code: {})", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed {
        /// Phase the step belongs to
        phase: Phase,
        /// Command line that failed
        command: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Captured stdout
        stdout: String,
        /// Captured stderr
        stderr: String,
    },

    /// A requested file does not exist inside the environment
    #[error("File not found in environment: {path}")]
    FileNotFound {
        /// In-environment path
        path: String,
    },

    /// The container engine itself failed
    #[error("Engine command failed: {command} - {reason}")]
    Engine {
        /// Engine command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },

    /// A mounted directory could not be staged
    #[error("Failed to stage {path}: {source}")]
    Staging {
        /// Host path being staged
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnvError {
    /// Captured stdout and stderr of a failed command, joined for display
    pub fn diagnostic_output(&self) -> Option<String> {
        match self {
            EnvError::CommandFailed { stdout, stderr, .. } => {
                let mut out = String::new();
                if !stdout.trim().is_empty() {
                    out.push_str("stdout:\n");
                    out.push_str(stdout.trim_end());
                }
                if !stderr.trim().is_empty() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str("stderr:\n");
                    out.push_str(stderr.trim_end());
                }
                Some(out)
            }
            _ => None,
        }
    }
}

/// Per-target native build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// Toolchain installation failed
    #[error("[{target}] toolchain provisioning failed running `{command}`:\n{output}")]
    Provisioning {
        /// Target being built
        target: TargetId,
        /// Command that failed
        command: String,
        /// Captured diagnostic output
        output: String,
    },

    /// Dependency restore failed
    #[error("[{target}] dependency restore failed running `{command}`:\n{output}")]
    Restore {
        /// Target being built
        target: TargetId,
        /// Command that failed
        command: String,
        /// Captured diagnostic output
        output: String,
    },

    /// Publish command exited non-zero
    #[error("[{target}] compile failed running `{command}` (exit code: {}):\n{output}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    Compile {
        /// Target being built
        target: TargetId,
        /// Command that failed
        command: String,
        /// Exit code of the publish command
        exit_code: Option<i32>,
        /// Captured diagnostic output
        output: String,
    },

    /// Publish succeeded but the expected binary is absent
    #[error("[{target}] artifact missing at {path}: {reason}")]
    ArtifactMissing {
        /// Target being built
        target: TargetId,
        /// Expected in-environment path
        path: String,
        /// Why the artifact was rejected
        reason: String,
    },

    /// The environment failed outside of any classified step
    #[error("[{target}] environment failure: {source}")]
    Environment {
        /// Target being built
        target: TargetId,
        /// Underlying error
        #[source]
        source: EnvError,
    },
}

impl BuildError {
    /// Classify an environment failure for `target` by the phase of the failing step
    pub fn from_env(target: &TargetId, error: EnvError) -> Self {
        let output = error.diagnostic_output().unwrap_or_default();
        match error {
            EnvError::CommandFailed {
                phase: Phase::Provision,
                command,
                ..
            } => BuildError::Provisioning {
                target: target.clone(),
                command,
                output,
            },
            EnvError::CommandFailed {
                phase: Phase::Restore,
                command,
                ..
            } => BuildError::Restore {
                target: target.clone(),
                command,
                output,
            },
            EnvError::CommandFailed {
                phase: Phase::Compile,
                command,
                exit_code,
                ..
            } => BuildError::Compile {
                target: target.clone(),
                command,
                exit_code,
                output,
            },
            other => BuildError::Environment {
                target: target.clone(),
                source: other,
            },
        }
    }

    /// Target this error belongs to
    pub fn target(&self) -> &TargetId {
        match self {
            BuildError::Provisioning { target, .. }
            | BuildError::Restore { target, .. }
            | BuildError::Compile { target, .. }
            | BuildError::ArtifactMissing { target, .. }
            | BuildError::Environment { target, .. } => target,
        }
    }

    /// Whether a retry could plausibly succeed (network/package failures only)
    pub fn is_transient(&self) -> bool {
        matches!(self, BuildError::Provisioning { .. })
    }
}

/// Build matrix errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// Target identifier not present in the matrix
    #[error("Unknown target '{target}'. Known targets: {}", known.join(", "))]
    UnknownTarget {
        /// Requested target
        target: String,
        /// Targets the matrix does contain
        known: Vec<String>,
    },

    /// Two matrix entries share a target identifier
    #[error("Duplicate target '{target}' in build matrix")]
    DuplicateTarget {
        /// Duplicated target
        target: String,
    },

    /// Target identifier is not of the form `<os>-<arch>`
    #[error("Invalid target identifier '{target}': {reason}")]
    InvalidTarget {
        /// Offending identifier
        target: String,
        /// Reason for the error
        reason: String,
    },
}

/// Aggregate output errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// Two artifacts resolved to the same relative path
    #[error("Output path '{path}' is already occupied")]
    Collision {
        /// Relative path that collided
        path: PathBuf,
    },

    /// Writing the output directory failed
    #[error("Failed to write {path}: {source}")]
    Io {
        /// Host path being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// A config value is out of range
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// Reason for the error
        reason: String,
    },
}

impl PipelineError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PipelineError::Build(BuildError::Provisioning { .. }) => vec![
                "Check network access from the Docker daemon (apt mirrors, dot.net)".to_string(),
                "Retry provisioning steps with CLAUSEWITZ_RETRY_PROVISION=3".to_string(),
            ],
            PipelineError::Build(BuildError::Restore { .. }) => vec![
                "Verify package references resolve for the requested runtime identifier"
                    .to_string(),
                "Remove the cache volume if it is corrupt: docker volume rm <prefix>-nuget"
                    .to_string(),
            ],
            PipelineError::Build(BuildError::ArtifactMissing { .. }) => vec![
                "Check the configured binary name matches the project's AssemblyName".to_string(),
                "Check PublishAot is enabled for the CLI project".to_string(),
            ],
            PipelineError::Environment(EnvError::Engine { .. })
            | PipelineError::Build(BuildError::Environment { .. }) => vec![
                "Ensure Docker is installed and the daemon is running: docker info".to_string(),
            ],
            PipelineError::Environment(EnvError::ImageUnavailable { image, .. }) => vec![
                format!("Pull the image manually: docker pull {}", image),
            ],
            PipelineError::Matrix(MatrixError::UnknownTarget { .. }) => vec![
                "List available targets: clausewitz_pipeline matrix".to_string(),
            ],
            PipelineError::Aggregate { .. } => vec![
                "Re-run a single failing target with publish-aot --target <rid>".to_string(),
            ],
            PipelineError::DeadlineExceeded { .. } => vec![
                "Increase --deadline or lower --concurrency".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Build(BuildError::ArtifactMissing { .. })
                | PipelineError::Matrix(_)
                | PipelineError::Output(OutputError::Collision { .. })
                | PipelineError::Config(_)
                | PipelineError::Cancelled
        )
    }
}
