//! Pipeline entry points.
//!
//! Each operation builds an [`Environment`] from the SDK image (or a matrix
//! entry), has the engine materialise it, and returns the realised handle,
//! captured output or extracted artifacts. Operations run to completion
//! unless a [`CancellationToken`] attached with [`Pipeline::with_cancellation`]
//! fires, in which case the in-flight work is dropped (processes killed,
//! containers removed) and [`PipelineError::Cancelled`] is returned.

use crate::config::PipelineConfig;
use crate::environment::{CacheVolume, Engine, Environment, Phase, Realized};
use crate::error::{PipelineError, Result};
use crate::matrix::{BuildMatrix, OperatingSystem};
use crate::native::{AggregateBuilder, AggregateReport, ArtifactFile, NativeBuilder, OutputDirectory};
use crate::source::SourceTree;
use crate::toolchain::Provisioners;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome of a test run whose exit status is reported rather than enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Build, test and release operations over one engine.
#[derive(Debug)]
pub struct Pipeline<E: Engine> {
    engine: Arc<E>,
    config: Arc<PipelineConfig>,
    matrix: BuildMatrix,
    provisioners: Arc<Provisioners>,
    cancel: Option<CancellationToken>,
}

impl<E: Engine> Pipeline<E> {
    /// Pipeline with the standard build matrix and provisioners
    pub fn new(engine: E, config: PipelineConfig) -> Self {
        let provisioners = Provisioners::standard(config.retries.provisioning);
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            matrix: BuildMatrix::standard(),
            provisioners: Arc::new(provisioners),
            cancel: None,
        }
    }

    pub fn with_matrix(mut self, matrix: BuildMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_provisioners(mut self, provisioners: Provisioners) -> Self {
        self.provisioners = Arc::new(provisioners);
        self
    }

    /// Abort any running operation when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn matrix(&self) -> &BuildMatrix {
        &self.matrix
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// SDK image with the dependency cache and the source tree mounted
    fn sdk_environment(&self, source: &SourceTree) -> Environment {
        let config = &self.config;
        Environment::from_image(config.sdk_image.as_str())
            .with_mounted_cache(config.cache_path.as_str(), CacheVolume::new(config.cache_name.as_str()))
            .with_mounted_directory(config.repo_path.as_str(), source.clone())
    }

    async fn cancellable<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => {
                    log::warn!("operation cancelled");
                    Err(PipelineError::Cancelled)
                }
                result = work => result,
            },
            None => work.await,
        }
    }

    async fn realize(&self, env: Environment) -> Result<E::Handle> {
        self.cancellable(async {
            self.engine
                .materialize(&env)
                .await
                .map_err(PipelineError::from)
        })
        .await
    }

    /// `dotnet build` in the solution directory
    pub async fn build(&self, source: &SourceTree) -> Result<E::Handle> {
        log::info!("building solution");
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.solution_workdir())
            .with_exec(Phase::Run, ["dotnet", "build"]);
        self.realize(env).await
    }

    /// `dotnet test` in the solution directory; any failing test fails the call
    pub async fn test(&self, source: &SourceTree) -> Result<String> {
        log::info!("running tests");
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.solution_workdir())
            .with_exec(Phase::Run, ["dotnet", "test"]);
        Ok(self.realize(env).await?.stdout().to_string())
    }

    /// Runs the test project as an executable
    pub async fn vs_test(&self, source: &SourceTree) -> Result<String> {
        log::info!("running {}", self.config.test_project);
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.solution_workdir())
            .with_exec(
                Phase::Run,
                ["dotnet", "run", "--project", self.config.test_project.as_str()],
            );
        Ok(self.realize(env).await?.stdout().to_string())
    }

    /// `dotnet test`, reporting the exit status instead of failing on it
    pub async fn test_report(&self, source: &SourceTree) -> Result<TestOutcome> {
        log::info!("running tests (failures reported, not fatal)");
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.solution_workdir())
            .with_exec_unchecked(Phase::Run, ["dotnet", "test"]);
        let realized = self.realize(env).await?;
        Ok(TestOutcome {
            exit_code: realized.exit_code(),
            stdout: realized.stdout().to_string(),
            stderr: realized.stderr().to_string(),
        })
    }

    /// Run the CLI under the managed runtime with `args`
    pub async fn run(&self, source: &SourceTree, args: &[String]) -> Result<String> {
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.cli_workdir())
            .with_exec(Phase::Run, run_command(args));
        Ok(self.realize(env).await?.stdout().to_string())
    }

    /// Package the CLI as a tool
    pub async fn tool(&self, source: &SourceTree) -> Result<E::Handle> {
        log::info!("packing {} as a tool", self.config.cli_project);
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.cli_workdir())
            .with_exec(Phase::Run, ["dotnet", "publish", "-p:PackAsTool=true"]);
        self.realize(env).await
    }

    /// Framework-dependent publish of the CLI
    pub async fn publish(&self, source: &SourceTree) -> Result<E::Handle> {
        log::info!("publishing {}", self.config.cli_project);
        let env = self
            .sdk_environment(source)
            .with_workdir(self.config.cli_workdir())
            .with_exec(Phase::Run, ["dotnet", "publish"]);
        self.realize(env).await
    }

    fn native_builder(&self) -> NativeBuilder<E> {
        NativeBuilder::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.config),
            Arc::clone(&self.provisioners),
        )
    }

    fn aggregate_builder(&self) -> AggregateBuilder<E> {
        let aggregate = AggregateBuilder::new(self.matrix.clone(), self.native_builder());
        match &self.cancel {
            Some(token) => aggregate.with_cancellation(token.clone()),
            None => aggregate,
        }
    }

    /// Native binary for one target. Unknown targets fail before anything runs.
    pub async fn publish_aot(&self, source: &SourceTree, target: &str) -> Result<ArtifactFile> {
        let entry = self.matrix.lookup(target)?.clone();
        let builder = self.native_builder();
        self.cancellable(async {
            builder.source_fingerprint(source).await;
            builder.build(source, &entry).await.map_err(PipelineError::from)
        })
        .await
    }

    /// Every native binary for `os`, merged into one output directory
    pub async fn build_native(&self, source: &SourceTree, os: OperatingSystem) -> Result<OutputDirectory> {
        self.build_native_report(source, os).await?.into_result()
    }

    /// Like [`build_native`](Self::build_native), but under continue-on-error
    /// the partial output is returned alongside the failures
    pub async fn build_native_report(
        &self,
        source: &SourceTree,
        os: OperatingSystem,
    ) -> Result<AggregateReport> {
        // The aggregate watches the token itself so in-flight targets are torn down first.
        self.aggregate_builder().build_os(source, os).await
    }

    pub async fn build_native_linux(&self, source: &SourceTree) -> Result<OutputDirectory> {
        self.build_native(source, OperatingSystem::Linux).await
    }

    pub async fn build_native_darwin(&self, source: &SourceTree) -> Result<OutputDirectory> {
        self.build_native(source, OperatingSystem::Darwin).await
    }

    /// Run the CLI's `list` command against a real save file.
    ///
    /// The fixture is mounted where the game's launcher keeps saves. Empty
    /// output counts as a failure.
    pub async fn smoke_test(&self, source: &SourceTree, fixture: &Path) -> Result<String> {
        log::info!("smoke testing against {}", fixture.display());
        let args = vec!["list".to_string()];
        let command = run_command(&args);
        let env = self
            .sdk_environment(source)
            .with_mounted_file(self.config.fixture_path.as_str(), fixture)
            .with_workdir(self.config.cli_workdir())
            .with_exec(Phase::Run, command.iter().cloned());

        let stdout = self.realize(env).await?.stdout().to_string();
        if stdout.trim().is_empty() {
            return Err(PipelineError::EmptyOutput {
                command: command.join(" "),
            });
        }
        Ok(stdout)
    }
}

fn run_command(args: &[String]) -> Vec<String> {
    let mut command = vec!["dotnet".to_string(), "run".to_string(), "--".to_string()];
    command.extend(args.iter().cloned());
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_passes_args_after_separator() {
        let args = vec!["list".to_string(), "--json".to_string()];
        assert_eq!(run_command(&args), ["dotnet", "run", "--", "list", "--json"]);
    }

    #[test]
    fn test_outcome_passed() {
        let outcome = TestOutcome {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(!outcome.passed());
    }
}
