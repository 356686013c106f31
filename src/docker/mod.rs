//! Docker-backed execution environments.
//!
//! [`DockerEngine`] realises an [`Environment`] with the docker CLI:
//!
//! 1. make sure the base image is present (pull if needed)
//! 2. `docker create` a long-lived container with resource limits, named
//!    cache volumes and read-only file binds
//! 3. `docker start`, then copy each mounted source tree in with `docker cp`
//!    (the host tree is never written to)
//! 4. `docker exec` every step in order, with the working directory and
//!    variables captured when the step was declared
//!
//! Docker fixes mounts at creation, so every step sees the final mount set.
//! The container is removed when the returned [`DockerContainer`] (or an
//! unfinished materialisation) is dropped.
//!
//! # Module Structure
//!
//! - `archive` - tar streams from `docker cp`
//! - `guard` - RAII cleanup for containers and staging directories
//! - `image` - daemon and base image availability
//! - `limits` - per-container resource limits
//! - `process` - running the docker CLI

mod archive;
mod guard;
mod image;
mod limits;
mod process;

pub use image::{check_docker_available, ensure_image, locate_docker};
pub use limits::ContainerLimits;

use crate::config::RetryConfig;
use crate::environment::{Engine, Environment, ExecStep, Expect, Mount, Realized};
use crate::error::EnvError;
use crate::source::SourceTree;
use bytes::Bytes;
use guard::{ContainerGuard, StagingDir};
use path_absolutize::Absolutize;
use process::{run_raw, run_streaming};
use std::path::PathBuf;
use uuid::Uuid;

/// Label put on every container this engine creates
pub const CONTAINER_LABEL: &str = "clausewitz-pipeline";

/// Execution engine driving the local docker daemon.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: PathBuf,
    limits: ContainerLimits,
    volume_prefix: String,
    scratch_dir: PathBuf,
}

impl DockerEngine {
    /// Locate docker and check the daemon responds.
    pub async fn connect(
        limits: ContainerLimits,
        volume_prefix: impl Into<String>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Result<Self, EnvError> {
        let docker = locate_docker()?;
        check_docker_available(&docker).await?;
        Ok(Self {
            docker,
            limits,
            volume_prefix: volume_prefix.into(),
            scratch_dir: scratch_dir.into(),
        })
    }

    pub fn limits(&self) -> &ContainerLimits {
        &self.limits
    }

    /// Docker volume backing the named cache
    pub fn volume_name(&self, cache: &str) -> String {
        format!("{}-{}", self.volume_prefix, cache)
    }

    fn create_args(&self, name: &str, env: &Environment) -> Result<Vec<String>, EnvError> {
        let mut args = vec![
            "create".to_string(),
            "--name".to_string(),
            name.to_string(),
            "--label".to_string(),
            CONTAINER_LABEL.to_string(),
        ];
        args.extend(self.limits.to_docker_args());

        for mount in env.mounts() {
            match mount {
                Mount::Cache { path, cache } => {
                    args.push("--mount".to_string());
                    args.push(format!(
                        "type=volume,source={},target={}",
                        self.volume_name(cache.name()),
                        path
                    ));
                }
                Mount::File { path, host_file } => {
                    let host = host_file.absolutize()?;
                    if !host.is_file() {
                        return Err(EnvError::Staging {
                            path: host.into_owned(),
                            source: std::io::Error::new(
                                std::io::ErrorKind::NotFound,
                                "mounted file does not exist",
                            ),
                        });
                    }
                    args.push("--mount".to_string());
                    args.push(format!(
                        "type=bind,source={},target={},readonly",
                        host.display(),
                        path
                    ));
                }
                // Copied in after start
                Mount::Directory { .. } => {}
            }
        }

        args.push("--entrypoint".to_string());
        args.push("sleep".to_string());
        args.push(env.image().to_string());
        args.push("infinity".to_string());
        Ok(args)
    }

    /// Run a docker command that must succeed, mapping failure to an engine error.
    async fn docker(&self, args: Vec<String>, label: &str) -> Result<(), EnvError> {
        let output = run_streaming(&self.docker, &args, label).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(EnvError::Engine {
                command: format!("docker {}", args.join(" ")),
                reason: output.stderr.trim().to_string(),
            })
        }
    }

    async fn copy_directory(
        &self,
        container: &str,
        path: &str,
        source: &SourceTree,
    ) -> Result<(), EnvError> {
        let staging = StagingDir::create(self.scratch_dir.join(format!("stage-{}", Uuid::new_v4())))
            .map_err(|e| EnvError::Staging {
                path: self.scratch_dir.clone(),
                source: e,
            })?;

        let tree = source.clone();
        let dest = staging.path().to_path_buf();
        let copied = tokio::task::spawn_blocking(move || tree.stage(&dest))
            .await
            .map_err(|e| EnvError::Engine {
                command: "stage source tree".to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| EnvError::Staging {
                path: source.root().to_path_buf(),
                source: e,
            })?;
        log::debug!("staged {} file(s) from {}", copied, source.root().display());

        self.docker(
            vec![
                "exec".to_string(),
                container.to_string(),
                "mkdir".to_string(),
                "-p".to_string(),
                path.to_string(),
            ],
            "mkdir",
        )
        .await?;

        // `<dir>/.` copies the directory's contents rather than the directory itself
        let from = format!("{}/.", staging.path().display());
        self.docker(
            vec![
                "cp".to_string(),
                from,
                format!("{}:{}", container, path),
            ],
            "cp",
        )
        .await
    }

    fn exec_args(container: &str, step: &ExecStep) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if let Some(workdir) = &step.workdir {
            args.push("-w".to_string());
            args.push(workdir.clone());
        }
        for (key, value) in &step.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(container.to_string());
        args.extend(step.args.iter().cloned());
        args
    }

    async fn run_step(&self, container: &str, step: &ExecStep) -> Result<StepResult, EnvError> {
        let args = Self::exec_args(container, step);
        let command = step.command_line();
        let mut attempt = 0;

        loop {
            log::info!("[{}] {}", step.phase, command);
            let output = run_streaming(&self.docker, &args, &step.phase.to_string()).await?;
            let exit_code = output.status.code();

            if output.status.success() || step.expect == Expect::Any {
                return Ok(StepResult {
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code,
                });
            }

            if attempt < step.retries {
                attempt += 1;
                let wait = RetryConfig::backoff(attempt);
                log::warn!(
                    "`{}` failed (attempt {}/{}), retrying in {}s",
                    command,
                    attempt,
                    step.retries + 1,
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(EnvError::CommandFailed {
                phase: step.phase,
                command,
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
    }
}

struct StepResult {
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
}

impl Engine for DockerEngine {
    type Handle = DockerContainer;

    async fn materialize(&self, env: &Environment) -> Result<DockerContainer, EnvError> {
        ensure_image(&self.docker, env.image()).await?;

        let name = format!("{}-{}", CONTAINER_LABEL, Uuid::new_v4());
        let args = self.create_args(&name, env)?;
        self.docker(args, "create").await?;

        let mut container = DockerContainer {
            docker: self.docker.clone(),
            guard: ContainerGuard::new(self.docker.clone(), name.clone()),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
        };

        self.docker(vec!["start".to_string(), name.clone()], "start").await?;

        for mount in env.mounts() {
            if let Mount::Directory { path, source } = mount {
                self.copy_directory(&name, path, source).await?;
            }
        }

        for step in env.steps() {
            let result = self.run_step(&name, step).await?;
            container.stdout = result.stdout;
            container.stderr = result.stderr;
            container.exit_code = result.exit_code;
        }

        Ok(container)
    }
}

/// A running container whose exec steps have completed.
#[derive(Debug)]
pub struct DockerContainer {
    docker: PathBuf,
    guard: ContainerGuard,
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
}

impl DockerContainer {
    pub fn name(&self) -> &str {
        self.guard.name()
    }
}

impl Realized for DockerContainer {
    fn stdout(&self) -> &str {
        &self.stdout
    }

    fn stderr(&self) -> &str {
        &self.stderr
    }

    fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    async fn read_file(&self, path: &str) -> Result<Bytes, EnvError> {
        let args = vec![
            "cp".to_string(),
            format!("{}:{}", self.name(), path),
            "-".to_string(),
        ];
        let output = run_raw(&self.docker, &args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_missing_path(&stderr) {
                return Err(EnvError::FileNotFound {
                    path: path.to_string(),
                });
            }
            return Err(EnvError::Engine {
                command: format!("docker {}", args.join(" ")),
                reason: stderr.trim().to_string(),
            });
        }

        archive::single_file(&output.stdout)?.ok_or_else(|| EnvError::FileNotFound {
            path: path.to_string(),
        })
    }
}

fn is_missing_path(stderr: &str) -> bool {
    let stderr = stderr.to_lowercase();
    stderr.contains("could not find the file") || stderr.contains("no such file or directory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{CacheVolume, Phase};

    fn engine() -> DockerEngine {
        DockerEngine {
            docker: PathBuf::from("docker"),
            limits: ContainerLimits::from_cli("4g".to_string(), None, Some("2".to_string()), 4096)
                .unwrap(),
            volume_prefix: "pfx".to_string(),
            scratch_dir: std::env::temp_dir(),
        }
    }

    #[test]
    fn test_create_args_mount_cache_and_file() {
        let fixture = tempfile::NamedTempFile::new().unwrap();
        let env = Environment::from_image("sdk:10")
            .with_mounted_cache("/root/.nuget/packages", CacheVolume::new("nuget"))
            .with_mounted_file("/root/save games/ironman.sav", fixture.path());

        let args = engine().create_args("c1", &env).unwrap();
        assert!(args.contains(&"type=volume,source=pfx-nuget,target=/root/.nuget/packages".to_string()));
        assert!(args.iter().any(|a| a.starts_with("type=bind,") && a.ends_with("target=/root/save games/ironman.sav,readonly")));
        assert_eq!(&args[args.len() - 4..], ["--entrypoint", "sleep", "sdk:10", "infinity"]);
    }

    #[test]
    fn test_create_args_missing_file_fails() {
        let env = Environment::from_image("sdk").with_mounted_file("/x", "/definitely/not/here.sav");
        assert!(matches!(
            engine().create_args("c1", &env),
            Err(EnvError::Staging { .. })
        ));
    }

    #[test]
    fn test_exec_args_carry_workdir_and_env() {
        let env = Environment::from_image("sdk")
            .with_workdir("/repo/src")
            .with_env_variable("DOTNET_ROOT", "/opt/dotnet")
            .with_exec(Phase::Run, ["dotnet", "build"]);
        let args = DockerEngine::exec_args("c1", &env.steps()[0]);
        assert_eq!(
            args,
            vec!["exec", "-w", "/repo/src", "-e", "DOTNET_ROOT=/opt/dotnet", "c1", "dotnet", "build"]
        );
    }

    #[test]
    fn test_missing_path_detection() {
        assert!(is_missing_path(
            "Error response from daemon: Could not find the file /repo/bin/x in container c1"
        ));
        assert!(!is_missing_path("Error response from daemon: No such container: c1"));
    }
}
