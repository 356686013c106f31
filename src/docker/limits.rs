//! Resource limits for build containers.
//!
//! Native builds run several containers at once, so the auto-detected
//! memory share is divided by the build concurrency.

use sysinfo::System;

/// Per-container memory, CPU and process limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLimits {
    /// Maximum memory (e.g., "4g", "2048m")
    pub memory: String,

    /// Maximum memory + swap (e.g., "6g", "3072m")
    pub memory_swap: String,

    /// Number of CPUs (fractional allowed, e.g., "2", "1.5")
    pub cpus: String,

    /// Maximum number of processes
    pub pids_limit: u32,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self::detect_safe_limits(1)
    }
}

impl ContainerLimits {
    /// Detects limits for `concurrency` containers sharing the host.
    ///
    /// - Memory: half of total RAM split across containers (2GB..16GB each)
    /// - Swap: memory + 2GB
    /// - CPUs: half of the cores split across containers (minimum 1)
    /// - PIDs: 4096 (compilers and MSBuild nodes fork a lot)
    pub fn detect_safe_limits(concurrency: usize) -> Self {
        let mut sys = System::new();
        sys.refresh_memory();

        let concurrency = concurrency.max(1) as u64;
        let total_ram_gb = sys.total_memory() / 1024 / 1024 / 1024;
        let memory_gb = (total_ram_gb / 2 / concurrency).clamp(2, 16);

        let cpus = ((num_cpus::get() as u64 / 2) / concurrency).max(1);

        Self {
            memory: format!("{}g", memory_gb),
            memory_swap: format!("{}g", memory_gb + 2),
            cpus: cpus.to_string(),
            pids_limit: 4096,
        }
    }

    /// Parse memory string like "4g", "4096m", "4G", "2048M" to megabytes.
    fn parse_memory_to_mb(memory: &str) -> Result<u64, String> {
        let memory = memory.trim().to_lowercase();
        let invalid = || format!("Invalid memory value: {}", memory);

        let (digits, factor) = if let Some(v) = memory.strip_suffix("gb") {
            (v, 1024)
        } else if let Some(v) = memory.strip_suffix('g') {
            (v, 1024)
        } else if let Some(v) = memory.strip_suffix("mb") {
            (v, 1)
        } else if let Some(v) = memory.strip_suffix('m') {
            (v, 1)
        } else {
            (memory.as_str(), 1)
        };

        digits
            .parse::<u64>()
            .map(|v| v * factor)
            .map_err(|_| invalid())
    }

    /// Creates limits from CLI arguments.
    ///
    /// Validates that memory_swap >= memory.
    pub fn from_cli(
        memory: String,
        memory_swap: Option<String>,
        cpus: Option<String>,
        pids_limit: u32,
    ) -> Result<Self, String> {
        let memory_mb = Self::parse_memory_to_mb(&memory)?;

        if memory_mb < 1024 {
            return Err(format!(
                "Memory limit too low: {} MB (minimum: 1024 MB)\n\
                 Native AOT compilation needs at least 1 GB.",
                memory_mb
            ));
        }

        if memory_mb > 1024 * 1024 {
            return Err(format!(
                "Memory limit too high: {} MB (maximum: 1 TB)",
                memory_mb
            ));
        }

        let memory_swap = match memory_swap {
            Some(swap) => {
                let swap_mb = Self::parse_memory_to_mb(&swap)?;
                if swap_mb < memory_mb {
                    return Err(format!(
                        "Memory swap ({} MB) must be >= memory ({} MB)",
                        swap_mb, memory_mb
                    ));
                }
                format!("{}m", swap_mb)
            }
            None => format!("{}m", memory_mb + 2048),
        };

        let cpus = match cpus {
            Some(cpus_str) => {
                let value: f32 = cpus_str.parse().map_err(|_| {
                    format!(
                        "Invalid --docker-cpus value: '{}' (expected number like '2' or '1.5')",
                        cpus_str
                    )
                })?;
                if value <= 0.0 {
                    return Err(format!("CPU limit must be positive, got: {}", value));
                }
                if value > 1024.0 {
                    return Err(format!("CPU limit too high: {} (maximum: 1024)", value));
                }
                cpus_str
            }
            None => num_cpus::get().to_string(),
        };

        if pids_limit < 64 {
            return Err(format!(
                "PID limit too low: {} (minimum: 64)\n\
                 Builds require many processes.",
                pids_limit
            ));
        }

        Ok(Self {
            memory,
            memory_swap,
            cpus,
            pids_limit,
        })
    }

    /// Flags for `docker create`
    pub fn to_docker_args(&self) -> Vec<String> {
        vec![
            "--memory".to_string(),
            self.memory.clone(),
            "--memory-swap".to_string(),
            self.memory_swap.clone(),
            "--cpus".to_string(),
            self.cpus.clone(),
            "--pids-limit".to_string(),
            self.pids_limit.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_memory_units() {
        assert_eq!(ContainerLimits::parse_memory_to_mb("4g"), Ok(4096));
        assert_eq!(ContainerLimits::parse_memory_to_mb("4GB"), Ok(4096));
        assert_eq!(ContainerLimits::parse_memory_to_mb("4096M"), Ok(4096));
        assert_eq!(ContainerLimits::parse_memory_to_mb("  4096mb "), Ok(4096));
        assert_eq!(ContainerLimits::parse_memory_to_mb("2048"), Ok(2048));
    }

    #[test]
    fn test_parse_memory_invalid() {
        assert!(ContainerLimits::parse_memory_to_mb("invalid").is_err());
        assert!(ContainerLimits::parse_memory_to_mb("4x").is_err());
    }

    #[test]
    fn test_from_cli_default_swap() {
        let limits = ContainerLimits::from_cli("4096m".to_string(), None, None, 4096).unwrap();
        assert_eq!(limits.memory, "4096m");
        assert_eq!(limits.memory_swap, "6144m");
    }

    #[test]
    fn test_from_cli_swap_below_memory() {
        let err = ContainerLimits::from_cli("8g".to_string(), Some("4g".to_string()), None, 4096)
            .unwrap_err();
        assert!(err.contains("must be >="));
    }

    #[test]
    fn test_from_cli_rejects_bad_cpus_and_pids() {
        assert!(ContainerLimits::from_cli("4g".to_string(), None, Some("0".to_string()), 4096).is_err());
        assert!(ContainerLimits::from_cli("4g".to_string(), None, Some("abc".to_string()), 4096).is_err());
        assert!(ContainerLimits::from_cli("4g".to_string(), None, None, 10).is_err());
        assert!(ContainerLimits::from_cli("512m".to_string(), None, None, 4096).is_err());
    }

    #[test]
    fn test_detect_limits_shrink_with_concurrency() {
        let one = ContainerLimits::detect_safe_limits(1);
        let many = ContainerLimits::detect_safe_limits(64);
        let gb = |s: &str| s.trim_end_matches('g').parse::<u64>().unwrap();
        assert!(gb(&many.memory) <= gb(&one.memory));
        assert_eq!(many.cpus, "1");
    }

    #[test]
    fn test_docker_args() {
        let limits = ContainerLimits::from_cli("4g".to_string(), None, Some("2".to_string()), 500)
            .unwrap();
        assert_eq!(
            limits.to_docker_args(),
            vec!["--memory", "4g", "--memory-swap", "6144m", "--cpus", "2", "--pids-limit", "500"]
        );
    }
}
