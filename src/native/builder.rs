//! Single-target native builder.
//!
//! Produces one ahead-of-time compiled binary for one matrix entry in a fresh
//! environment: provision the toolchain, mount cache and source, restore,
//! publish, then extract the binary.

use super::output::ArtifactFile;
use crate::config::PipelineConfig;
use crate::environment::{CacheVolume, Engine, Environment, Phase, Realized};
use crate::error::{BuildError, EnvError};
use crate::matrix::MatrixEntry;
use crate::source::SourceTree;
use crate::toolchain::Provisioners;
use std::sync::Arc;

/// Builds native artifacts one target at a time.
///
/// Cheap to clone; the engine, config and provisioners are shared.
#[derive(Debug)]
pub struct NativeBuilder<E: Engine> {
    engine: Arc<E>,
    config: Arc<PipelineConfig>,
    provisioners: Arc<Provisioners>,
}

impl<E: Engine> Clone for NativeBuilder<E> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            config: Arc::clone(&self.config),
            provisioners: Arc::clone(&self.provisioners),
        }
    }
}

impl<E: Engine> NativeBuilder<E> {
    pub fn new(engine: Arc<E>, config: Arc<PipelineConfig>, provisioners: Arc<Provisioners>) -> Self {
        Self {
            engine,
            config,
            provisioners,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The full environment specification for `entry`, not yet materialised
    pub fn environment(&self, source: &SourceTree, entry: &MatrixEntry) -> Environment {
        let config = &self.config;
        let target = &entry.target;

        let env = Environment::from_image(entry.image.as_str());
        let env = self
            .provisioners
            .provision(entry.os, env, target, config.native_arch);

        env.with_mounted_cache(config.cache_path.as_str(), CacheVolume::new(config.cache_name.as_str()))
            .with_mounted_directory(config.repo_path.as_str(), source.clone())
            .with_workdir(config.cli_workdir())
            .with_exec(Phase::Restore, ["dotnet", "restore", "-r", target.as_str()])
            .with_exec(
                Phase::Compile,
                [
                    "dotnet".to_string(),
                    "publish".to_string(),
                    "-c".to_string(),
                    "Release".to_string(),
                    "-r".to_string(),
                    target.to_string(),
                    "-o".to_string(),
                    config.publish_output(target),
                ],
            )
    }

    /// Fingerprint of the tree about to be built, logged so a binary can be
    /// traced back to its sources. Build output is not part of it.
    pub async fn source_fingerprint(&self, source: &SourceTree) -> Option<String> {
        let tree = source.clone();
        match tokio::task::spawn_blocking(move || tree.fingerprint()).await {
            Ok(Ok(fingerprint)) => {
                log::info!("source {} at {}", source.root().display(), fingerprint);
                Some(fingerprint)
            }
            Ok(Err(e)) => {
                log::warn!("could not fingerprint {}: {}", source.root().display(), e);
                None
            }
            Err(e) => {
                log::warn!("fingerprint task failed: {}", e);
                None
            }
        }
    }

    /// Build `entry` from `source` and extract its binary.
    pub async fn build(&self, source: &SourceTree, entry: &MatrixEntry) -> Result<ArtifactFile, BuildError> {
        let target = &entry.target;
        let artifact_path = self.config.artifact_path(target);

        log::info!("{}: building native artifact from {}", target, entry.image);
        let env = self.environment(source, entry);

        let realized = self
            .engine
            .materialize(&env)
            .await
            .map_err(|e| BuildError::from_env(target, e))?;

        let contents = match realized.read_file(&artifact_path).await {
            Ok(contents) => contents,
            Err(EnvError::FileNotFound { path }) => {
                return Err(BuildError::ArtifactMissing {
                    target: target.clone(),
                    path,
                    reason: "publish succeeded but produced no binary".to_string(),
                });
            }
            Err(e) => return Err(BuildError::from_env(target, e)),
        };

        if contents.is_empty() {
            return Err(BuildError::ArtifactMissing {
                target: target.clone(),
                path: artifact_path,
                reason: "binary is empty (0 bytes)".to_string(),
            });
        }

        log::info!("{}: extracted {} ({} bytes)", target, self.config.binary_name, contents.len());

        Ok(ArtifactFile {
            target: target.clone(),
            file_name: self.config.binary_name.clone(),
            contents,
        })
    }
}
