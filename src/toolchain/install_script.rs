//! Just-in-time SDK install for darwin native builds.
//!
//! The darwin base image ships without the managed-runtime SDK, so it is
//! installed with the vendor install script instead of a package manager.

use super::ProvisioningStrategy;
use crate::environment::{Environment, Phase};
use crate::matrix::{Architecture, TargetId};

pub const INSTALL_SCRIPT_URL: &str = "https://dot.net/v1/dotnet-install.sh";
const SCRIPT_PATH: &str = "/tmp/dotnet-install.sh";
const DEFAULT_INSTALL_DIR: &str = "/opt/dotnet";
/// Already on the image's PATH, so linking here needs no PATH override
const LINK_DIR: &str = "/usr/local/bin";

#[derive(Debug, Clone)]
pub struct InstallScriptToolchain {
    channel: String,
    quality: String,
    install_dir: String,
    retries: u32,
}

impl InstallScriptToolchain {
    pub fn new(retries: u32) -> Self {
        Self {
            channel: "10.0".to_string(),
            quality: "preview".to_string(),
            install_dir: DEFAULT_INSTALL_DIR.to_string(),
            retries,
        }
    }

    pub fn install_dir(&self) -> &str {
        &self.install_dir
    }
}

impl ProvisioningStrategy for InstallScriptToolchain {
    fn provision(&self, env: Environment, target: &TargetId, native: Architecture) -> Environment {
        log::debug!(
            "{}: installing SDK {} ({}) into {} on {} image",
            target,
            self.channel,
            self.quality,
            self.install_dir,
            native
        );

        env.with_exec(
            Phase::Provision,
            ["curl", "-fsSL", INSTALL_SCRIPT_URL, "-o", SCRIPT_PATH],
        )
        .with_retries(self.retries)
        .with_exec(
            Phase::Provision,
            [
                "bash",
                SCRIPT_PATH,
                "--channel",
                self.channel.as_str(),
                "--quality",
                self.quality.as_str(),
                "--install-dir",
                self.install_dir.as_str(),
            ],
        )
        .with_retries(self.retries)
        .with_exec(
            Phase::Provision,
            [
                "ln".to_string(),
                "-sf".to_string(),
                format!("{}/dotnet", self.install_dir),
                format!("{}/dotnet", LINK_DIR),
            ],
        )
        .with_env_variable("DOTNET_ROOT", self.install_dir.clone())
    }
}
