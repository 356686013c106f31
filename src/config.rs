//! Pipeline configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `CLAUSEWITZ_*` environment variables. CLI flags are applied last by the
//! command layer.

use crate::error::ConfigError;
use crate::matrix::{Architecture, TargetId};
use crate::native::FailurePolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the source root when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "clausewitz-pipeline.toml";

/// Maximum backoff between provisioning attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Retry behaviour. Only provisioning steps are ever retried.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Extra attempts for each toolchain provisioning command
    pub provisioning: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { provisioning: 0 }
    }
}

impl RetryConfig {
    /// Parse retry count from environment variable with clamping to maximum
    fn parse_retry_env(var_name: &str, default: u32, max: u32) -> u32 {
        std::env::var(var_name)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .map(|v| v.min(max))
            .unwrap_or(default)
    }

    /// Override from `CLAUSEWITZ_RETRY_PROVISION` (clamped to 10)
    pub fn apply_env(&mut self) {
        self.provisioning = Self::parse_retry_env("CLAUSEWITZ_RETRY_PROVISION", self.provisioning, 10);
    }

    /// Wait before retry number `attempt` (1-based): 1s, 2s, 4s, ... capped at 60s
    pub fn backoff(attempt: u32) -> Duration {
        let seconds = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_secs(seconds).min(MAX_BACKOFF)
    }
}

/// Everything the pipeline needs to know about the wrapped project and host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// SDK image for build, test, tool and publish
    pub sdk_image: String,
    /// Dependency cache volume name
    pub cache_name: String,
    /// Package manager cache path inside environments
    pub cache_path: String,
    /// Where the source tree is mounted
    pub repo_path: String,
    /// Solution directory, relative to the repo
    pub solution_dir: String,
    /// CLI project directory, relative to the solution directory
    pub cli_project: String,
    /// Test project run by `vs-test`
    pub test_project: String,
    /// Name of the native binary produced by publish
    pub binary_name: String,
    /// Where the smoke-test fixture is mounted
    pub fixture_path: String,
    /// Prefix for named volumes
    pub volume_prefix: String,
    /// Host directory for staging copies of source trees
    pub scratch_dir: PathBuf,
    /// Maximum native builds running at once
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Architecture base images run as
    pub native_arch: Architecture,
    pub retries: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sdk_image: "mcr.microsoft.com/dotnet/sdk:10.0-preview".to_string(),
            cache_name: "nuget".to_string(),
            cache_path: "/root/.nuget/packages".to_string(),
            repo_path: "/repo".to_string(),
            solution_dir: "src".to_string(),
            cli_project: "MageeSoft.Paradox.Clausewitz.Save.Cli".to_string(),
            test_project: "MageeSoft.Paradox.Clausewitz.Save.Tests".to_string(),
            binary_name: "paradox-clausewitz-sav".to_string(),
            fixture_path: "/root/.paradoxlauncher/Stellaris/save games/my test empire/ironman.sav"
                .to_string(),
            volume_prefix: "clausewitz-pipeline".to_string(),
            scratch_dir: default_scratch_dir(),
            concurrency: (num_cpus::get() / 2).max(1),
            failure_policy: FailurePolicy::FailFast,
            native_arch: Architecture::host(),
            retries: RetryConfig::default(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("clausewitz-pipeline")
}

impl PipelineConfig {
    /// Load configuration for a source tree rooted at `source_root`.
    ///
    /// An explicit `path` must exist. Without one, `clausewitz-pipeline.toml`
    /// in the source root is used when present.
    pub fn load(path: Option<&Path>, source_root: &Path) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let candidate = source_root.join(DEFAULT_CONFIG_FILE);
                if candidate.is_file() {
                    Self::from_file(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply `CLAUSEWITZ_*` environment overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(value) = std::env::var("CLAUSEWITZ_CONCURRENCY") {
            self.concurrency = value.trim().parse().map_err(|_| ConfigError::Invalid {
                reason: format!("CLAUSEWITZ_CONCURRENCY must be a positive integer, got '{}'", value),
            })?;
        }
        if let Ok(value) = std::env::var("CLAUSEWITZ_SDK_IMAGE") {
            self.sdk_image = value;
        }
        if let Ok(value) = std::env::var("CLAUSEWITZ_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(value);
        }
        self.retries.apply_env();
        Ok(())
    }

    /// Validate values that would otherwise fail deep inside a build
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                reason: "concurrency must be at least 1".to_string(),
            });
        }
        let required = [
            ("sdk_image", &self.sdk_image),
            ("cache_name", &self.cache_name),
            ("binary_name", &self.binary_name),
            ("cli_project", &self.cli_project),
            ("volume_prefix", &self.volume_prefix),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    reason: format!("{} must not be empty", name),
                });
            }
        }
        for (name, value) in [
            ("repo_path", &self.repo_path),
            ("cache_path", &self.cache_path),
            ("fixture_path", &self.fixture_path),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::Invalid {
                    reason: format!("{} must be an absolute path, got '{}'", name, value),
                });
            }
        }
        Ok(())
    }

    /// `/repo/src`
    pub fn solution_workdir(&self) -> String {
        join_path(&self.repo_path, &self.solution_dir)
    }

    /// `/repo/src/<cli project>`
    pub fn cli_workdir(&self) -> String {
        join_path(&self.solution_workdir(), &self.cli_project)
    }

    /// `/repo/bin/Release/<target>`
    pub fn publish_output(&self, target: &TargetId) -> String {
        join_path(&self.repo_path, &format!("bin/Release/{}", target))
    }

    /// `/repo/bin/Release/<target>/<binary>`
    pub fn artifact_path(&self, target: &TargetId) -> String {
        join_path(&self.publish_output(target), &self.binary_name)
    }
}

fn join_path(base: &str, rel: &str) -> String {
    let rel = rel.trim_matches('/');
    if rel.is_empty() {
        return base.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), rel)
}
