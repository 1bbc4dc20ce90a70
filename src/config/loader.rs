use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::Config;

pub const CONFIG_FILE: &str = ".shipshape.yaml";

/// Keys as they appear on disk; absent keys leave the base value untouched.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub docker_bin: Option<String>,
    pub platform: Option<String>,
    pub build_timeout: Option<u64>,
    pub run_timeout: Option<u64>,
    pub logs_timeout: Option<u64>,
    pub follow_timeout: Option<u64>,
    pub probe_timeout: Option<u64>,
    pub gpu_probe: Option<String>,
    pub max_repair_attempts: Option<u32>,
    pub log_tail: Option<usize>,
    pub log_settle: Option<u64>,
    pub follow_logs: Option<bool>,
    pub keep_container: Option<bool>,
    pub capture_limit: Option<usize>,
    pub search_depth: Option<usize>,
    pub repair_command: Option<String>,
    pub repair_timeout: Option<u64>,
}

impl RawConfig {
    /// Load a `.shipshape.yaml` file from the given directory.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let raw: RawConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Overlay every key present in `self` onto `cfg`.
    pub fn apply(self, cfg: &mut Config) {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = self.$field { cfg.$field = v; })*
            };
        }
        overlay!(
            docker_bin,
            platform,
            build_timeout,
            run_timeout,
            logs_timeout,
            follow_timeout,
            probe_timeout,
            gpu_probe,
            max_repair_attempts,
            log_settle,
            follow_logs,
            keep_container,
            capture_limit,
            search_depth,
            repair_timeout,
        );
        if self.log_tail.is_some() {
            cfg.log_tail = self.log_tail;
        }
        if self.repair_command.is_some() {
            cfg.repair_command = self.repair_command;
        }
    }
}
