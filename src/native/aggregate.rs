//! Aggregate builder: every selected matrix entry, merged into one output.

use super::builder::NativeBuilder;
use super::output::{ArtifactFile, OutputDirectory};
use crate::environment::Engine;
use crate::error::{BuildError, PipelineError};
use crate::matrix::{BuildMatrix, MatrixEntry, OperatingSystem, TargetId};
use crate::source::SourceTree;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// What happens to the remaining targets when one fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Abort the remaining builds and return the first failure
    #[default]
    FailFast,
    /// Run every build and report all failures at the end
    ContinueOnError,
}

/// Outcome of an aggregate run.
#[derive(Debug, Default)]
pub struct AggregateReport {
    pub output: OutputDirectory,
    pub failures: Vec<BuildError>,
}

impl AggregateReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The output if every target built, otherwise all failures
    pub fn into_result(self) -> Result<OutputDirectory, PipelineError> {
        if self.failures.is_empty() {
            Ok(self.output)
        } else {
            Err(PipelineError::Aggregate {
                failures: self.failures,
            })
        }
    }
}

/// Runs the single-target builder over a build matrix, concurrently.
#[derive(Debug)]
pub struct AggregateBuilder<E: Engine> {
    matrix: BuildMatrix,
    builder: NativeBuilder<E>,
    concurrency: usize,
    policy: FailurePolicy,
    cancel: Option<CancellationToken>,
}

impl<E: Engine> AggregateBuilder<E> {
    pub fn new(matrix: BuildMatrix, builder: NativeBuilder<E>) -> Self {
        let concurrency = builder.config().concurrency.max(1);
        let policy = builder.config().failure_policy;
        Self {
            matrix,
            builder,
            concurrency,
            policy,
            cancel: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop every in-flight build when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn matrix(&self) -> &BuildMatrix {
        &self.matrix
    }

    /// Build every entry for one operating-system family.
    pub async fn build_os(
        &self,
        source: &SourceTree,
        os: OperatingSystem,
    ) -> Result<AggregateReport, PipelineError> {
        let entries: Vec<MatrixEntry> = self.matrix.for_os(os).into_iter().cloned().collect();
        if entries.is_empty() {
            log::warn!("build matrix has no {} entries; output is empty", os);
        }
        self.run(source, entries).await
    }

    /// Build an explicit set of targets. Unknown targets fail before anything runs.
    pub async fn build_targets(
        &self,
        source: &SourceTree,
        targets: &[TargetId],
    ) -> Result<AggregateReport, PipelineError> {
        let entries: Vec<MatrixEntry> = self.matrix.select(targets)?.into_iter().cloned().collect();
        self.run(source, entries).await
    }

    async fn run(
        &self,
        source: &SourceTree,
        entries: Vec<MatrixEntry>,
    ) -> Result<AggregateReport, PipelineError> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        log::info!(
            "building {} target(s), at most {} at a time",
            entries.len(),
            self.concurrency
        );
        self.builder.source_fingerprint(source).await;

        for entry in entries {
            let builder = self.builder.clone();
            let source = source.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                // The semaphore is never closed, so acquire only fails if it is dropped.
                let _permit = permits.acquire_owned().await;
                builder.build(&source, &entry).await
            });
        }

        let mut report = AggregateReport::default();

        loop {
            let next = match &self.cancel {
                Some(token) => tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    joined = tasks.join_next() => Some(joined),
                },
                None => Some(tasks.join_next().await),
            };
            let Some(joined) = next else {
                log::warn!("native build cancelled, stopping {} target(s)", tasks.len());
                tasks.shutdown().await;
                return Err(PipelineError::Cancelled);
            };
            let Some(joined) = joined else {
                break;
            };

            if let Err(e) = self.collect(&mut report, joined) {
                // Containers of the remaining targets are removed before the error surfaces.
                tasks.shutdown().await;
                return Err(e);
            }
        }

        Ok(report)
    }

    /// Fold one finished task into the report. An error stops the whole run.
    fn collect(
        &self,
        report: &mut AggregateReport,
        joined: Result<Result<ArtifactFile, BuildError>, JoinError>,
    ) -> Result<(), PipelineError> {
        let result = match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => return Ok(()),
            Err(e) => {
                return Err(PipelineError::Io(std::io::Error::other(format!(
                    "native build task panicked: {}",
                    e
                ))));
            }
        };

        match result {
            Ok(artifact) => {
                log::info!("{}: done", artifact.target);
                report.output.insert(artifact)?;
            }
            Err(e) => match self.policy {
                FailurePolicy::FailFast => {
                    log::error!("{}: failed, aborting remaining targets", e.target());
                    return Err(e.into());
                }
                FailurePolicy::ContinueOnError => {
                    log::error!("{}: failed, continuing with remaining targets", e.target());
                    report.failures.push(e);
                }
            },
        }
        Ok(())
    }
}
