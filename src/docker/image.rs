//! Docker daemon and base image availability.

use super::process::{run_raw, run_streaming};
use crate::error::EnvError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for Docker info check (5 seconds)
/// Quick daemon availability check shouldn't take long
pub const DOCKER_INFO_TIMEOUT: Duration = Duration::from_secs(5);

/// Platform-specific Docker startup instructions
#[cfg(target_os = "macos")]
const DOCKER_START_HELP: &str = "Start Docker Desktop from Applications or Spotlight";

#[cfg(target_os = "linux")]
const DOCKER_START_HELP: &str = "Start Docker daemon: sudo systemctl start docker";

#[cfg(target_os = "windows")]
const DOCKER_START_HELP: &str = "Start Docker Desktop from the Start menu";

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const DOCKER_START_HELP: &str = "Start the Docker daemon";

/// Locate the docker binary on PATH.
pub fn locate_docker() -> Result<PathBuf, EnvError> {
    which::which("docker").map_err(|e| EnvError::Engine {
        command: "docker".to_string(),
        reason: format!(
            "Docker command not found: {}\n\
             Install from: https://docs.docker.com/get-docker/",
            e
        ),
    })
}

/// Checks the docker daemon is running and responsive.
pub async fn check_docker_available(docker: &Path) -> Result<(), EnvError> {
    let status = timeout(
        DOCKER_INFO_TIMEOUT,
        Command::new(docker)
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status(),
    )
    .await;

    match status {
        Err(_) => Err(EnvError::Engine {
            command: "docker info".to_string(),
            reason: format!(
                "Docker daemon check timed out after {} seconds.\n{}",
                DOCKER_INFO_TIMEOUT.as_secs(),
                DOCKER_START_HELP
            ),
        }),
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(status)) => Err(EnvError::Engine {
            command: "docker info".to_string(),
            reason: format!(
                "Docker daemon is not responding (exit code: {}).\n{}",
                status.code().unwrap_or(-1),
                DOCKER_START_HELP
            ),
        }),
        Ok(Err(e)) => Err(EnvError::Engine {
            command: "docker info".to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Make sure `image` is available locally, pulling it if it is not.
pub async fn ensure_image(docker: &Path, image: &str) -> Result<(), EnvError> {
    let inspect = run_raw(
        docker,
        &[
            "image".to_string(),
            "inspect".to_string(),
            "--format".to_string(),
            "{{.Id}}".to_string(),
            image.to_string(),
        ],
    )
    .await?;

    if inspect.status.success() {
        log::debug!("image {} present", image);
        return Ok(());
    }

    log::info!("pulling {}", image);
    let pull = run_streaming(docker, &["pull".to_string(), image.to_string()], "pull").await?;
    if !pull.status.success() {
        return Err(EnvError::ImageUnavailable {
            image: image.to_string(),
            reason: pull.stderr.trim().to_string(),
        });
    }
    Ok(())
}
