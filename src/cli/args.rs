//! Command line argument parsing and validation.

use crate::matrix::OperatingSystem;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Containerised build, test and native release pipeline for the
/// paradox-clausewitz-sav save-game CLI
#[derive(Parser, Debug)]
#[command(
    name = "clausewitz_pipeline",
    version,
    about = "Containerised build, test and native release pipeline for paradox-clausewitz-sav",
    long_about = "Builds, tests and publishes the save-game CLI inside Docker containers.

Usage:
  clausewitz_pipeline --source ./repo build
  clausewitz_pipeline --source ./repo native --os linux --out dist
  clausewitz_pipeline --source ./repo publish-aot --target osx-arm64
  clausewitz_pipeline --source ./repo smoke-test --fixture ironman.sav
  clausewitz_pipeline matrix --json"
)]
pub struct Args {
    /// Source tree containing the solution
    #[arg(long, global = true, default_value = ".", value_name = "DIR")]
    pub source: PathBuf,

    /// Pipeline config file (defaults to clausewitz-pipeline.toml in the source tree)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum native builds running at once
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Abort the whole operation after this many seconds
    #[arg(long, global = true, value_name = "SECONDS")]
    pub deadline: Option<u64>,

    /// Container memory limit (e.g. "4g", "4096m"); auto-detected when omitted
    #[arg(long, global = true, value_name = "SIZE")]
    pub docker_memory: Option<String>,

    /// Container memory + swap limit; defaults to memory + 2GB
    #[arg(long, global = true, value_name = "SIZE")]
    pub docker_memory_swap: Option<String>,

    /// Container CPU limit (fractional allowed, e.g. "1.5")
    #[arg(long, global = true, value_name = "CPUS")]
    pub docker_cpus: Option<String>,

    /// Container process limit
    #[arg(long, global = true, default_value_t = 4096, value_name = "N")]
    pub docker_pids_limit: u32,

    /// Only print command results and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the solution
    Build,

    /// Run the test suite
    Test {
        /// Report test failures instead of failing the command
        #[arg(long)]
        allow_failure: bool,
    },

    /// Run the test project as an executable
    VsTest,

    /// Run the CLI under the managed runtime
    Run {
        /// Arguments passed to the CLI
        #[arg(last = true, value_name = "ARGS")]
        args: Vec<String>,
    },

    /// Package the CLI as a tool
    Tool,

    /// Framework-dependent publish of the CLI
    Publish,

    /// Build one native binary
    PublishAot {
        /// Runtime identifier from the build matrix (e.g. linux-arm64)
        #[arg(long, value_name = "RID")]
        target: String,

        /// Directory the binary is written to, as <target>/<binary>
        #[arg(long, default_value = "dist", value_name = "DIR")]
        out: PathBuf,
    },

    /// Build every native binary for one operating system
    Native {
        /// Operating-system family: linux or darwin
        #[arg(long)]
        os: OperatingSystem,

        /// Directory the binaries are written to, as <target>/<binary>
        #[arg(long, default_value = "dist", value_name = "DIR")]
        out: PathBuf,

        /// Keep building the other targets when one fails
        #[arg(long)]
        continue_on_error: bool,
    },

    /// Run `list` against a real save file
    SmokeTest {
        /// Save file to mount
        #[arg(long, value_name = "FILE")]
        fixture: PathBuf,
    },

    /// Show the build matrix
    Matrix {
        /// Only entries for this operating system
        #[arg(long)]
        os: Option<OperatingSystem>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

impl Command {
    /// Subcommand name as typed on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Command::Build => "build",
            Command::Test { .. } => "test",
            Command::VsTest => "vs-test",
            Command::Run { .. } => "run",
            Command::Tool => "tool",
            Command::Publish => "publish",
            Command::PublishAot { .. } => "publish-aot",
            Command::Native { .. } => "native",
            Command::SmokeTest { .. } => "smoke-test",
            Command::Matrix { .. } => "matrix",
        }
    }

    /// Whether the command needs a docker daemon
    pub fn needs_engine(&self) -> bool {
        !matches!(self, Command::Matrix { .. })
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == Some(0) {
            return Err("--concurrency must be at least 1".to_string());
        }
        if self.deadline == Some(0) {
            return Err("--deadline must be at least 1 second".to_string());
        }
        if let Command::SmokeTest { fixture } = &self.command
            && !fixture.is_file()
        {
            return Err(format!("fixture {} is not a file", fixture.display()));
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
}

impl RuntimeConfig {
    pub fn new(quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(quiet),
        }
    }

    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.quiet)
    }
}
