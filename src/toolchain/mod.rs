//! Toolchain provisioning for native builds.
//!
//! Each operating-system family gets a [`ProvisioningStrategy`] that adds the
//! exec steps needed to produce a binary for a target whose architecture may
//! differ from the environment's own. Strategies only extend the environment
//! specification; nothing runs until it is materialised.
//!
//! # Module Structure
//!
//! - `apt` - Debian package-manager cross toolchain (linux)
//! - `install_script` - Just-in-time SDK install script (darwin)

mod apt;
mod install_script;

pub use apt::AptCrossToolchain;
pub use install_script::InstallScriptToolchain;

use crate::environment::Environment;
use crate::matrix::{Architecture, OperatingSystem, TargetId};
use std::collections::HashMap;

/// Makes an environment capable of building for `target`.
pub trait ProvisioningStrategy: Send + Sync + std::fmt::Debug {
    /// Append provisioning steps to `env`.
    ///
    /// `native` is the architecture the environment itself runs as. Every
    /// step added must use [`Phase::Provision`](crate::environment::Phase) so
    /// a failure is reported as a provisioning error for this target only.
    fn provision(&self, env: Environment, target: &TargetId, native: Architecture) -> Environment;
}

/// Provisioning strategies keyed by operating-system family.
#[derive(Debug)]
pub struct Provisioners {
    strategies: HashMap<OperatingSystem, Box<dyn ProvisioningStrategy>>,
}

impl Provisioners {
    /// Registry with no strategies
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Linux uses apt cross toolchains; darwin installs the SDK by script.
    /// `retries` is applied to every provisioning command.
    pub fn standard(retries: u32) -> Self {
        Self::empty()
            .with(OperatingSystem::Linux, AptCrossToolchain::new(retries))
            .with(OperatingSystem::Darwin, InstallScriptToolchain::new(retries))
    }

    /// Register (or replace) the strategy for `os`
    pub fn with(mut self, os: OperatingSystem, strategy: impl ProvisioningStrategy + 'static) -> Self {
        self.strategies.insert(os, Box::new(strategy));
        self
    }

    pub fn get(&self, os: OperatingSystem) -> Option<&dyn ProvisioningStrategy> {
        self.strategies.get(&os).map(|s| s.as_ref())
    }

    /// Apply the strategy for `os`. Without one the environment is returned
    /// as is, and the build will rely on whatever the image ships.
    pub fn provision(
        &self,
        os: OperatingSystem,
        env: Environment,
        target: &TargetId,
        native: Architecture,
    ) -> Environment {
        match self.get(os) {
            Some(strategy) => strategy.provision(env, target, native),
            None => {
                log::warn!(
                    "{}: no provisioning strategy registered for {}, building without a toolchain",
                    target,
                    os
                );
                env
            }
        }
    }
}
