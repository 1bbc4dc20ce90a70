mod loader;
mod types;

use std::path::Path;

use anyhow::Result;

pub use loader::{CONFIG_FILE, RawConfig};
pub use types::{Config, DEFAULT_MAX_REPAIR_ATTEMPTS, DEFAULT_PLATFORM};

/// Build the effective config for `dirs`, later directories overriding earlier ones.
///
/// Missing files are skipped; a file that exists but fails to parse is an error.
pub fn load(dirs: &[&Path]) -> Result<Config> {
    let mut cfg = Config::default();
    for dir in dirs {
        if let Some(raw) = RawConfig::load(dir)? {
            raw.apply(&mut cfg);
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn no_files_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load(&[dir.path()]).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn later_directory_wins() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        fs::write(
            a.path().join(CONFIG_FILE),
            "platform: linux/arm64\nkeep_container: true\n",
        )
        .unwrap();
        fs::write(b.path().join(CONFIG_FILE), "platform: linux/riscv64\n").unwrap();

        let cfg = load(&[a.path(), b.path()]).unwrap();
        assert_eq!(cfg.platform, "linux/riscv64");
        assert!(cfg.keep_container);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "plaform: typo\n").unwrap();
        assert!(load(&[dir.path()]).is_err());
    }

    #[test]
    fn optional_keys_overlay() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "log_tail: 100\nrepair_command: ./fix.sh --fast\n",
        )
        .unwrap();
        let cfg = load(&[dir.path()]).unwrap();
        assert_eq!(cfg.log_tail, Some(100));
        assert_eq!(cfg.repair_command.as_deref(), Some("./fix.sh --fast"));
    }
}
