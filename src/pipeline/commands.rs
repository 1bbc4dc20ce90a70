use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::docker::ProcessCommand;

use super::types::PortMapping;

/// `docker build` rooted at the build file's directory.
pub fn build_command(
    cfg: &Config,
    dockerfile: &Path,
    image_tag: &str,
    platform: &str,
) -> ProcessCommand {
    let context = dockerfile.parent().unwrap_or(Path::new("."));
    let args = vec![
        "build".into(),
        "--platform".into(),
        platform.to_string(),
        "-t".into(),
        image_tag.to_string(),
        "-f".into(),
        dockerfile.display().to_string(),
        ".".into(),
    ];
    ProcessCommand::new(cfg.docker_bin.clone(), args, cfg.build_timeout()).current_dir(context)
}

/// Container launch options beyond the image itself.
pub struct RunSpec<'a> {
    pub image_tag: &'a str,
    pub container_name: &'a str,
    pub platform: &'a str,
    pub gpu: bool,
    pub ports: &'a [PortMapping],
    pub env: &'a [(String, String)],
    pub command: Option<&'a [String]>,
}

/// Detached `docker run`; the container id is printed on stdout.
pub fn run_command(cfg: &Config, opts: &RunSpec<'_>) -> ProcessCommand {
    let mut args = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        opts.container_name.to_string(),
        "--platform".into(),
        opts.platform.to_string(),
    ];
    if opts.gpu {
        args.extend(["--gpus".into(), "all".into()]);
    }
    for port in opts.ports {
        args.extend(["-p".into(), port.to_string()]);
    }
    for (key, value) in opts.env {
        args.extend(["-e".into(), format!("{key}={value}")]);
    }
    args.push(opts.image_tag.to_string());
    if let Some(command) = opts.command {
        args.extend(command.iter().cloned());
    }
    ProcessCommand::new(cfg.docker_bin.clone(), args, cfg.run_timeout())
}

/// Filters for a log retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub tail: Option<usize>,
    /// Anything `docker logs --since` accepts: RFC 3339, Unix time, or a relative duration like `10m`.
    pub since: Option<String>,
    pub until: Option<String>,
    pub follow: bool,
}

/// `docker logs --timestamps`, bounded by the short or follow timeout.
pub fn logs_command(cfg: &Config, container_id: &str, opts: &LogOptions) -> ProcessCommand {
    let mut args = vec!["logs".into(), "--timestamps".into()];
    if let Some(tail) = opts.tail {
        args.extend(["--tail".into(), tail.to_string()]);
    }
    if let Some(since) = &opts.since {
        args.extend(["--since".into(), since.clone()]);
    }
    if let Some(until) = &opts.until {
        args.extend(["--until".into(), until.clone()]);
    }
    if opts.follow {
        args.push("--follow".into());
    }
    args.push(container_id.to_string());

    let timeout = if opts.follow {
        cfg.follow_timeout()
    } else {
        cfg.logs_timeout()
    };
    ProcessCommand::new(cfg.docker_bin.clone(), args, timeout)
}

pub fn stop_command(cfg: &Config, container_id: &str) -> ProcessCommand {
    ProcessCommand::new(
        cfg.docker_bin.clone(),
        vec!["stop".into(), container_id.to_string()],
        Duration::from_secs(30),
    )
}

pub fn remove_command(cfg: &Config, container_id: &str) -> ProcessCommand {
    ProcessCommand::new(
        cfg.docker_bin.clone(),
        vec!["rm".into(), container_id.to_string()],
        Duration::from_secs(30),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts<'a>(ports: &'a [PortMapping], env: &'a [(String, String)]) -> RunSpec<'a> {
        RunSpec {
            image_tag: "shipshape/app",
            container_name: "app-1",
            platform: "linux/amd64",
            gpu: false,
            ports,
            env,
            command: None,
        }
    }

    #[test]
    fn build_command_builds_correct_args() {
        let cfg = Config::default();
        let cmd = build_command(
            &cfg,
            Path::new("/repo/services/api/Dockerfile.prod"),
            "shipshape/api",
            "linux/arm64",
        );
        assert_eq!(cmd.program, "docker");
        assert_eq!(
            cmd.args,
            vec![
                "build",
                "--platform",
                "linux/arm64",
                "-t",
                "shipshape/api",
                "-f",
                "/repo/services/api/Dockerfile.prod",
                "."
            ]
        );
        assert_eq!(
            cmd.working_dir.as_deref(),
            Some(Path::new("/repo/services/api"))
        );
        assert_eq!(cmd.timeout, cfg.build_timeout());
    }

    #[test]
    fn run_command_is_detached_and_named() {
        let cfg = Config::default();
        let cmd = run_command(&cfg, &opts(&[], &[]));
        assert_eq!(cmd.subcommand(), Some("run"));
        assert!(cmd.args.contains(&"-d".into()));
        assert!(cmd.args.windows(2).any(|w| w == ["--name", "app-1"]));
        assert_eq!(cmd.args.last().map(String::as_str), Some("shipshape/app"));
        assert!(!cmd.args.contains(&"--gpus".into()));
    }

    #[test]
    fn run_command_includes_ports_env_and_gpu() {
        let cfg = Config::default();
        let ports = vec!["8080:80".parse().unwrap()];
        let env = vec![("MODE".to_string(), "test".to_string())];
        let mut s = opts(&ports, &env);
        s.gpu = true;
        let cmd = run_command(&cfg, &s);
        assert!(cmd.args.windows(2).any(|w| w == ["--gpus", "all"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-p", "8080:80"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-e", "MODE=test"]));
    }

    #[test]
    fn run_command_appends_override_after_image() {
        let cfg = Config::default();
        let command = vec!["python".to_string(), "serve.py".to_string()];
        let mut s = opts(&[], &[]);
        s.command = Some(&command);
        let cmd = run_command(&cfg, &s);
        let n = cmd.args.len();
        assert_eq!(cmd.args[n - 3..], ["shipshape/app", "python", "serve.py"]);
    }

    #[test]
    fn logs_command_uses_short_timeout_without_follow() {
        let cfg = Config::default();
        let cmd = logs_command(
            &cfg,
            "abc123",
            &LogOptions {
                tail: Some(50),
                since: Some("10m".into()),
                ..LogOptions::default()
            },
        );
        assert_eq!(
            cmd.args,
            vec!["logs", "--timestamps", "--tail", "50", "--since", "10m", "abc123"]
        );
        assert_eq!(cmd.timeout, cfg.logs_timeout());
    }

    #[test]
    fn logs_command_follow_is_bounded() {
        let cfg = Config::default();
        let cmd = logs_command(
            &cfg,
            "abc123",
            &LogOptions {
                follow: true,
                until: Some("2024-01-01T00:00:00Z".into()),
                ..LogOptions::default()
            },
        );
        assert!(cmd.args.contains(&"--follow".into()));
        assert!(cmd.args.windows(2).any(|w| w == ["--until", "2024-01-01T00:00:00Z"]));
        assert_eq!(cmd.timeout, cfg.follow_timeout());
    }

    #[test]
    fn docker_bin_is_configurable() {
        let cfg = Config {
            docker_bin: "podman".into(),
            ..Config::default()
        };
        assert_eq!(stop_command(&cfg, "x").program, "podman");
        assert_eq!(remove_command(&cfg, "x").args, vec!["rm", "x"]);
    }
}
