use tracing::{info, warn};

use crate::config::Config;
use crate::docker::{self, CancelToken, ProcessRunner};
use crate::error::RunError;

use super::commands::{RunSpec, remove_command, run_command, stop_command};
use super::sanitize::{generate_container_name, repair_container_name};
use super::types::{RunResult, StepResult, ValidationRequest};

/// Start a detached container from `image_tag`.
pub fn run_container(
    runner: &dyn ProcessRunner,
    cfg: &Config,
    request: &ValidationRequest,
    image_tag: &str,
    cancel: &CancelToken,
) -> StepResult<RunResult> {
    let wanted = request
        .container_name
        .clone()
        .unwrap_or_else(|| generate_container_name(image_tag));
    let Some(container_name) = repair_container_name(&wanted) else {
        return StepResult::Failure(RunError::InvalidName { name: wanted }.into());
    };
    if container_name != wanted {
        info!(from = %wanted, to = %container_name, "adjusted container name");
    }

    let gpu = docker::gpu_available(runner, &cfg.gpu_probe_argv(), cfg.probe_timeout());

    let spec = RunSpec {
        image_tag,
        container_name: &container_name,
        platform: &request.platform,
        gpu,
        ports: &request.ports,
        env: &request.env,
        command: request.command.as_deref(),
    };
    let cmd = run_command(cfg, &spec);
    info!(image = %image_tag, container = %container_name, gpu, "starting container");

    let out = match runner.run(&cmd, cancel) {
        Ok(out) => out,
        Err(e) => {
            return StepResult::Failure(
                RunError::Spawn {
                    message: format!("{e:#}"),
                }
                .into(),
            );
        }
    };

    if out.timed_out {
        return StepResult::Failure(
            RunError::TimedOut {
                secs: cmd.timeout.as_secs(),
                output: out.log,
            }
            .into(),
        );
    }
    if out.cancelled {
        return StepResult::Failure(RunError::Cancelled { output: out.log }.into());
    }
    if !out.success() {
        warn!(container = %container_name, exit_code = ?out.exit_code, "container failed to start");
        return StepResult::Failure(
            RunError::NonZeroExit {
                code: out.exit_code,
                output: out.log,
            }
            .into(),
        );
    }

    // Pull progress may precede the id; the id is the last stdout line.
    let Some(container_id) = out
        .stdout
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .map(str::to_string)
    else {
        return StepResult::Failure(RunError::MissingId { output: out.log }.into());
    };

    info!(container_id = %container_id, container = %container_name, "container started");
    StepResult::Success(RunResult {
        container_id,
        container_name,
        gpu,
    })
}

/// What cleanup managed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cleanup {
    pub stopped: bool,
    pub removed: bool,
}

/// Stop then remove a container. Failures are logged, never escalated.
pub fn cleanup_container(runner: &dyn ProcessRunner, cfg: &Config, container_id: &str) -> Cleanup {
    let cancel = CancelToken::new();
    let attempt = |cmd: docker::ProcessCommand, action: &str| match runner.run(&cmd, &cancel) {
        Ok(out) if out.success() => true,
        Ok(out) => {
            warn!(
                container_id,
                action,
                exit_code = ?out.exit_code,
                timed_out = out.timed_out,
                output = %out.log.trim(),
                "container cleanup step failed"
            );
            false
        }
        Err(e) => {
            warn!(container_id, action, error = %e, "container cleanup step could not run");
            false
        }
    };

    let stopped = attempt(stop_command(cfg, container_id), "stop");
    let removed = attempt(remove_command(cfg, container_id), "remove");
    if stopped && removed {
        info!(container_id, "container cleaned up");
    }
    Cleanup { stopped, removed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::pipeline::fake::{self, ScriptedRunner};

    fn request(name: Option<&str>) -> ValidationRequest {
        let mut req = ValidationRequest::new("octo/hello", "/tmp/hello");
        req.container_name = name.map(str::to_string);
        req
    }

    fn run_args(runner: &ScriptedRunner) -> Vec<String> {
        runner
            .calls()
            .into_iter()
            .find(|c| c.subcommand() == Some("run"))
            .map(|c| c.args)
            .unwrap_or_default()
    }

    #[test]
    fn invalid_name_is_repaired_before_run() {
        let runner = ScriptedRunner::new();
        let result = run_container(
            &runner,
            &Config::default(),
            &request(Some("my app!")),
            "shipshape/hello",
            &CancelToken::new(),
        );
        let started = result.ok().unwrap();
        assert_eq!(started.container_name, "my-app-");
        let args = run_args(&runner);
        let at = args.iter().position(|a| a == "--name").unwrap();
        assert_eq!(args[at + 1], "my-app-");
    }

    #[test]
    fn empty_name_is_rejected_without_running() {
        let runner = ScriptedRunner::new();
        let result = run_container(
            &runner,
            &Config::default(),
            &request(Some("")),
            "shipshape/hello",
            &CancelToken::new(),
        );
        assert!(matches!(
            result.error(),
            Some(StepError::Run(RunError::InvalidName { .. }))
        ));
        assert_eq!(runner.count("run"), 0);
    }

    #[test]
    fn container_id_is_last_stdout_line() {
        let runner = ScriptedRunner::new();
        runner.push("run", fake::ok("Unable to find image locally\nPulling\n\nfeedbeef\n\n"));
        let result = run_container(
            &runner,
            &Config::default(),
            &request(None),
            "shipshape/hello",
            &CancelToken::new(),
        );
        assert_eq!(result.ok().unwrap().container_id, "feedbeef");
    }

    #[test]
    fn empty_stdout_means_missing_id() {
        let runner = ScriptedRunner::new();
        runner.push("run", fake::ok("\n"));
        let result = run_container(
            &runner,
            &Config::default(),
            &request(None),
            "shipshape/hello",
            &CancelToken::new(),
        );
        assert!(matches!(
            result.error(),
            Some(StepError::Run(RunError::MissingId { .. }))
        ));
    }

    #[test]
    fn gpu_flag_follows_probe() {
        let runner = ScriptedRunner::new();
        runner.push("nvidia-smi", fake::ok("GPU 0"));
        let result = run_container(
            &runner,
            &Config::default(),
            &request(None),
            "shipshape/hello",
            &CancelToken::new(),
        );
        assert!(result.ok().unwrap().gpu);
        assert!(run_args(&runner).windows(2).any(|w| w == ["--gpus", "all"]));
    }

    #[test]
    fn no_gpu_flag_when_probe_missing() {
        let runner = ScriptedRunner::new();
        let result = run_container(
            &runner,
            &Config::default(),
            &request(None),
            "shipshape/hello",
            &CancelToken::new(),
        );
        assert!(!result.ok().unwrap().gpu);
        assert!(!run_args(&runner).iter().any(|a| a == "--gpus"));
    }

    #[test]
    fn nonzero_exit_keeps_output() {
        let runner = ScriptedRunner::new();
        runner.push("run", fake::exit(125, "port is already allocated"));
        let result = run_container(
            &runner,
            &Config::default(),
            &request(None),
            "shipshape/hello",
            &CancelToken::new(),
        );
        let err = result.error().unwrap();
        assert!(matches!(
            err,
            StepError::Run(RunError::NonZeroExit { code: Some(125), .. })
        ));
        assert_eq!(err.raw_output(), Some("port is already allocated"));
    }

    #[test]
    fn timeout_is_reported() {
        let runner = ScriptedRunner::new();
        runner.push("run", fake::timed_out(""));
        let result = run_container(
            &runner,
            &Config::default(),
            &request(None),
            "shipshape/hello",
            &CancelToken::new(),
        );
        assert!(matches!(
            result.error(),
            Some(StepError::Run(RunError::TimedOut { .. }))
        ));
    }

    #[test]
    fn cleanup_stops_then_removes() {
        let runner = ScriptedRunner::new();
        let done = cleanup_container(&runner, &Config::default(), "feedbeef");
        assert_eq!(
            done,
            Cleanup {
                stopped: true,
                removed: true
            }
        );
        let order: Vec<_> = runner
            .calls()
            .iter()
            .map(|c| c.args.clone())
            .collect();
        assert_eq!(
            order,
            vec![
                vec!["stop".to_string(), "feedbeef".to_string()],
                vec!["rm".to_string(), "feedbeef".to_string()],
            ]
        );
    }

    #[test]
    fn cleanup_failure_is_not_fatal() {
        let runner = ScriptedRunner::new();
        runner.push("stop", fake::exit(1, "No such container"));
        let done = cleanup_container(&runner, &Config::default(), "gone");
        assert!(!done.stopped);
        assert!(done.removed);
    }
}
