//! RAII guards for containers and staging directories.

use std::path::PathBuf;
use std::time::Duration;
use wait_timeout::ChildExt;

/// How long `docker rm -f` may take before we give up on it
const REMOVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Removes a container when dropped.
///
/// Covers every exit path: success (handle dropped), error, panic and
/// cancellation of the future that owns it.
#[derive(Debug)]
pub(super) struct ContainerGuard {
    docker: PathBuf,
    name: String,
}

impl ContainerGuard {
    pub(super) fn new(docker: PathBuf, name: String) -> Self {
        Self { docker, name }
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // spawn + wait_timeout so an unresponsive daemon cannot hang the drop
        let mut child = match std::process::Command::new(&self.docker)
            .args(["rm", "-f", &self.name])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::warn!("could not spawn docker to remove container '{}': {}", self.name, e);
                return;
            }
        };

        match child.wait_timeout(REMOVE_TIMEOUT) {
            Ok(Some(status)) if status.success() => {
                log::debug!("removed container {}", self.name);
            }
            Ok(Some(status)) => {
                log::warn!(
                    "failed to remove container '{}' (exit code: {})",
                    self.name,
                    status.code().unwrap_or(-1)
                );
            }
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!(
                    "timed out removing container '{}' after {}s; docker daemon may be down",
                    self.name,
                    REMOVE_TIMEOUT.as_secs()
                );
            }
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

/// Host directory holding a staged source copy; deleted when dropped.
#[derive(Debug)]
pub(super) struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    pub(super) fn create(path: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    pub(super) fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            log::warn!("failed to clean up staging directory {}: {}", self.path.display(), e);
        }
    }
}
