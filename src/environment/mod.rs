//! Execution environment specifications.
//!
//! An [`Environment`] describes an isolated sandbox: a base image, what is
//! mounted into it, and the commands to run in order. Every `with_*` method
//! consumes the value and returns the next one, so configuring never mutates
//! a state some other step is holding; clone to branch. Nothing runs until an
//! [`Engine`] materialises the finished specification.
//!
//! # Module Structure
//!
//! - `engine` - The [`Engine`] and [`Realized`] traits implemented by backends

mod engine;

pub use engine::{Engine, Realized};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::source::SourceTree;

/// Named persistent volume shared by every environment that mounts it.
///
/// Identity is the name alone. Contents accumulate across runs and are never
/// cleared here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheVolume {
    name: String,
}

impl CacheVolume {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Something made visible inside the environment at `path`.
#[derive(Debug, Clone, PartialEq)]
pub enum Mount {
    /// A source tree, copied in (filtered by its ignore rules)
    Directory { path: String, source: SourceTree },
    /// A single host file, read-only
    File { path: String, host_file: PathBuf },
    /// A named cache volume, read-write
    Cache { path: String, cache: CacheVolume },
}

impl Mount {
    /// In-environment mount point
    pub fn path(&self) -> &str {
        match self {
            Mount::Directory { path, .. } | Mount::File { path, .. } | Mount::Cache { path, .. } => {
                path
            }
        }
    }
}

/// Pipeline phase an exec step belongs to. Used to classify failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Toolchain installation
    Provision,
    /// Dependency restore
    Restore,
    /// Compile / publish
    Compile,
    /// Build, test and run commands of the plain entry points
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Provision => "provisioning",
            Phase::Restore => "restore",
            Phase::Compile => "compile",
            Phase::Run => "run",
        })
    }
}

/// What the engine does with a non-zero exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Non-zero exit fails the materialisation
    Success,
    /// Exit status is recorded and execution continues
    Any,
}

/// One command to run, with the working directory and environment variables
/// that were in effect when it was declared.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecStep {
    pub phase: Phase,
    pub args: Vec<String>,
    pub workdir: Option<String>,
    pub env: BTreeMap<String, String>,
    pub expect: Expect,
    /// Extra attempts after the first failure
    pub retries: u32,
}

impl ExecStep {
    /// Command line for display and error messages
    pub fn command_line(&self) -> String {
        self.args.join(" ")
    }
}

/// Immutable specification of an execution environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    image: String,
    mounts: Vec<Mount>,
    workdir: Option<String>,
    env: BTreeMap<String, String>,
    steps: Vec<ExecStep>,
}

impl Environment {
    /// Start a specification from a base image address
    pub fn from_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            mounts: Vec::new(),
            workdir: None,
            env: BTreeMap::new(),
            steps: Vec::new(),
        }
    }

    /// Copy `source` into the environment at `path`
    pub fn with_mounted_directory(mut self, path: impl Into<String>, source: SourceTree) -> Self {
        self.push_mount(Mount::Directory {
            path: path.into(),
            source,
        });
        self
    }

    /// Mount the named cache read-write at `path`
    pub fn with_mounted_cache(mut self, path: impl Into<String>, cache: CacheVolume) -> Self {
        self.push_mount(Mount::Cache {
            path: path.into(),
            cache,
        });
        self
    }

    /// Mount a single host file read-only at `path`
    pub fn with_mounted_file(mut self, path: impl Into<String>, host_file: impl Into<PathBuf>) -> Self {
        self.push_mount(Mount::File {
            path: path.into(),
            host_file: host_file.into(),
        });
        self
    }

    /// Working directory for subsequent exec steps
    pub fn with_workdir(mut self, path: impl Into<String>) -> Self {
        self.workdir = Some(path.into());
        self
    }

    /// Environment variable for subsequent exec steps
    pub fn with_env_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Run a command; a non-zero exit fails the environment
    pub fn with_exec<I, S>(self, phase: Phase, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_exec(phase, args, Expect::Success)
    }

    /// Run a command and keep its output whatever the exit status
    pub fn with_exec_unchecked<I, S>(self, phase: Phase, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push_exec(phase, args, Expect::Any)
    }

    /// Allow the most recently added exec step `retries` extra attempts.
    ///
    /// No-op when there is no step yet.
    pub fn with_retries(mut self, retries: u32) -> Self {
        if let Some(step) = self.steps.last_mut() {
            step.retries = retries;
        }
        self
    }

    fn push_mount(&mut self, mount: Mount) {
        // A later mount at the same path replaces the earlier one.
        self.mounts.retain(|m| m.path() != mount.path());
        self.mounts.push(mount);
    }

    fn push_exec<I, S>(mut self, phase: Phase, args: I, expect: Expect) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps.push(ExecStep {
            phase,
            args: args.into_iter().map(Into::into).collect(),
            workdir: self.workdir.clone(),
            env: self.env.clone(),
            expect,
            retries: 0,
        });
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    pub fn workdir(&self) -> Option<&str> {
        self.workdir.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn steps(&self) -> &[ExecStep] {
        &self.steps
    }

    /// Whether a cache with `name` is mounted anywhere
    pub fn mounts_cache(&self, name: &str) -> bool {
        self.mounts
            .iter()
            .any(|m| matches!(m, Mount::Cache { cache, .. } if cache.name() == name))
    }
}
