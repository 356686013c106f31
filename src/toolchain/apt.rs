//! Debian cross toolchain for linux native builds.

use super::ProvisioningStrategy;
use crate::environment::{Environment, Phase};
use crate::matrix::{Architecture, TargetId};

/// Packages native AOT compilation needs regardless of target architecture
const BASE_PACKAGES: &[&str] = &["clang", "llvm", "zlib1g-dev"];

/// Installs clang/llvm and, for foreign targets, the cross linker and
/// architecture-qualified system libraries.
#[derive(Debug, Clone, Default)]
pub struct AptCrossToolchain {
    retries: u32,
}

impl AptCrossToolchain {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    /// Packages to install for `target` on a `native` environment
    pub fn packages(target: Architecture, native: Architecture) -> Vec<String> {
        let mut packages: Vec<String> = BASE_PACKAGES.iter().map(|p| p.to_string()).collect();
        if target != native {
            let triple = target.gnu_triple();
            packages.push(format!("gcc-{}", triple));
            packages.push(format!("binutils-{}", triple));
            packages.push(format!("zlib1g-dev:{}", target.debian_arch()));
        }
        packages
    }
}

impl ProvisioningStrategy for AptCrossToolchain {
    fn provision(&self, env: Environment, target: &TargetId, native: Architecture) -> Environment {
        let arch = target.architecture();
        let mut env = env;

        if arch != native {
            log::debug!("{}: foreign architecture {} on {} image", target, arch, native);
            env = env
                .with_exec(Phase::Provision, ["dpkg", "--add-architecture", arch.debian_arch()])
                .with_retries(self.retries);
        }

        let mut install = vec![
            "apt-get".to_string(),
            "install".to_string(),
            "-y".to_string(),
        ];
        install.extend(Self::packages(arch, native));

        env.with_exec(Phase::Provision, ["apt-get", "update"])
            .with_retries(self.retries)
            .with_exec(Phase::Provision, install)
            .with_retries(self.retries)
            .with_exec(Phase::Provision, ["sh", "-c", "rm -rf /var/lib/apt/lists/*"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(env: &Environment) -> Vec<String> {
        env.steps().iter().map(|s| s.command_line()).collect()
    }

    #[test]
    fn test_foreign_target_registers_architecture() {
        let target = TargetId::parse("linux-arm64").unwrap();
        let env = AptCrossToolchain::new(0).provision(
            Environment::from_image("sdk"),
            &target,
            Architecture::X64,
        );

        assert_eq!(
            commands(&env),
            vec![
                "dpkg --add-architecture arm64",
                "apt-get update",
                "apt-get install -y clang llvm zlib1g-dev gcc-aarch64-linux-gnu binutils-aarch64-linux-gnu zlib1g-dev:arm64",
                "sh -c rm -rf /var/lib/apt/lists/*",
            ]
        );
        assert!(env.steps().iter().all(|s| s.phase == Phase::Provision));
    }

    #[test]
    fn test_native_target_skips_cross_packages() {
        let target = TargetId::parse("linux-x64").unwrap();
        let env = AptCrossToolchain::new(0).provision(
            Environment::from_image("sdk"),
            &target,
            Architecture::X64,
        );

        let cmds = commands(&env);
        assert_eq!(cmds[0], "apt-get update");
        assert_eq!(cmds[1], "apt-get install -y clang llvm zlib1g-dev");
        assert!(!cmds.iter().any(|c| c.contains("dpkg")));
    }

    #[test]
    fn test_x64_target_on_arm64_host() {
        let packages = AptCrossToolchain::packages(Architecture::X64, Architecture::Arm64);
        assert!(packages.contains(&"gcc-x86-64-linux-gnu".to_string()));
        assert!(packages.contains(&"zlib1g-dev:amd64".to_string()));
    }

    #[test]
    fn test_network_steps_get_retries() {
        let target = TargetId::parse("linux-arm64").unwrap();
        let env = AptCrossToolchain::new(2).provision(
            Environment::from_image("sdk"),
            &target,
            Architecture::X64,
        );
        let retries: Vec<u32> = env.steps().iter().map(|s| s.retries).collect();
        assert_eq!(retries, vec![2, 2, 2, 0]);
    }
}
