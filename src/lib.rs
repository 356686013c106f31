//! # Clausewitz Pipeline
//!
//! Containerised build, test and release pipeline for the
//! `paradox-clausewitz-sav` save-game CLI.
//!
//! Every operation runs in a fresh Docker container instead of on the
//! invoking machine's toolchain. The centre of the crate is the native build
//! orchestrator: one source tree becomes one ahead-of-time compiled binary per
//! OS/architecture target, each built in its own container with its own cross
//! toolchain, sharing only a named dependency cache, and merged into a single
//! output directory laid out as `<target>/<binary>`.
//!
//! ## Usage
//!
//! ```bash
//! clausewitz_pipeline --source ./repo test
//! clausewitz_pipeline --source ./repo native --os linux --out dist
//! clausewitz_pipeline --source ./repo publish-aot --target osx-arm64
//! clausewitz_pipeline --source ./repo smoke-test --fixture ironman.sav
//! ```

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod cli;
pub mod config;
pub mod docker;
pub mod environment;
pub mod error;
pub mod matrix;
pub mod native;
pub mod pipeline;
pub mod source;
pub mod toolchain;

pub use config::{PipelineConfig, RetryConfig};
pub use docker::{ContainerLimits, DockerEngine};
pub use environment::{CacheVolume, Engine, Environment, Phase, Realized};
pub use error::{BuildError, EnvError, MatrixError, PipelineError, Result};
pub use matrix::{Architecture, BuildMatrix, MatrixEntry, OperatingSystem, TargetId};
pub use native::{AggregateBuilder, AggregateReport, ArtifactFile, FailurePolicy, NativeBuilder, OutputDirectory};
pub use pipeline::{Pipeline, TestOutcome};
pub use source::SourceTree;
pub use toolchain::{Provisioners, ProvisioningStrategy};
