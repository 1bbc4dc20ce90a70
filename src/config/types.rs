use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Target platform passed to `docker build --platform` when none is given.
pub const DEFAULT_PLATFORM: &str = "linux/amd64";

/// Maximum number of repair/revalidation cycles per run.
pub const DEFAULT_MAX_REPAIR_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container CLI, e.g. `docker` or `podman`.
    pub docker_bin: String,
    pub platform: String,
    /// Seconds.
    pub build_timeout: u64,
    pub run_timeout: u64,
    pub logs_timeout: u64,
    pub follow_timeout: u64,
    pub probe_timeout: u64,
    /// Accelerator probe command line, split with shell-words.
    pub gpu_probe: String,
    /// May lower the cap; values above the default are clamped.
    pub max_repair_attempts: u32,
    pub log_tail: Option<usize>,
    /// Seconds to let the container produce output before collecting logs.
    pub log_settle: u64,
    pub follow_logs: bool,
    pub keep_container: bool,
    /// Bytes of output captured per process.
    pub capture_limit: usize,
    /// Directory depth searched for build files.
    pub search_depth: usize,
    /// External repair collaborator command line, split with shell-words.
    pub repair_command: Option<String>,
    pub repair_timeout: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            platform: DEFAULT_PLATFORM.to_string(),
            build_timeout: 30 * 60,
            run_timeout: 120,
            logs_timeout: 30,
            follow_timeout: 120,
            probe_timeout: 10,
            gpu_probe: "nvidia-smi".to_string(),
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            log_tail: None,
            log_settle: 5,
            follow_logs: false,
            keep_container: false,
            capture_limit: crate::docker::DEFAULT_CAPTURE_LIMIT,
            search_depth: 8,
            repair_command: None,
            repair_timeout: 15 * 60,
        }
    }
}

impl Config {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout)
    }

    pub fn logs_timeout(&self) -> Duration {
        Duration::from_secs(self.logs_timeout)
    }

    pub fn follow_timeout(&self) -> Duration {
        Duration::from_secs(self.follow_timeout)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    pub fn log_settle(&self) -> Duration {
        Duration::from_secs(self.log_settle)
    }

    pub fn repair_timeout(&self) -> Duration {
        Duration::from_secs(self.repair_timeout)
    }

    /// Probe command split into program and arguments. A malformed probe
    /// string yields an empty list, which the engine treats as "no GPU".
    pub fn gpu_probe_argv(&self) -> Vec<String> {
        shell_words::split(&self.gpu_probe).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.platform, "linux/amd64");
        assert_eq!(cfg.max_repair_attempts, 3);
        assert_eq!(cfg.build_timeout(), Duration::from_secs(1800));
        assert!(cfg.follow_timeout() > cfg.logs_timeout());
        assert!(cfg.capture_limit >= 1024 * 1024);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str("platform: linux/arm64\nlog_tail: 50\n").unwrap();
        assert_eq!(cfg.platform, "linux/arm64");
        assert_eq!(cfg.log_tail, Some(50));
        assert_eq!(cfg.docker_bin, "docker");
    }

    #[test]
    fn gpu_probe_is_shell_split() {
        let cfg = Config {
            gpu_probe: "nvidia-smi -L".into(),
            ..Config::default()
        };
        assert_eq!(cfg.gpu_probe_argv(), vec!["nvidia-smi", "-L"]);
    }

    #[test]
    fn unbalanced_probe_quotes_disable_probe() {
        let cfg = Config {
            gpu_probe: "nvidia-smi 'oops".into(),
            ..Config::default()
        };
        assert!(cfg.gpu_probe_argv().is_empty());
    }
}
