use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info};

use super::{CancelToken, ProcessCommand, ProcessRunner};

/// Verify that the container daemon behind `docker_bin` is reachable.
pub fn ensure_available(runner: &dyn ProcessRunner, docker_bin: &str) -> Result<()> {
    let cmd = ProcessCommand::new(
        docker_bin,
        vec![
            "version".into(),
            "--format".into(),
            "{{.Server.Version}}".into(),
        ],
        Duration::from_secs(15),
    );
    let out = runner.run(&cmd, &CancelToken::new()).map_err(|e| {
        e.context(format!(
            "failed to invoke `{docker_bin}`; is it installed and on PATH?"
        ))
    })?;

    if !out.success() {
        bail!(
            "{docker_bin} daemon is not running (exit {:?}): {}",
            out.exit_code,
            out.stderr.trim()
        );
    }
    debug!(version = %out.stdout.trim(), "container daemon reachable");
    Ok(())
}

/// Probe for accelerator support by running a short diagnostic command.
///
/// Any failure (missing binary, non-zero exit, timeout) means "unavailable";
/// the probe never fails the pipeline.
pub fn gpu_available(runner: &dyn ProcessRunner, probe: &[String], timeout: Duration) -> bool {
    let Some((program, args)) = probe.split_first() else {
        return false;
    };
    let cmd = ProcessCommand::new(program.clone(), args.to_vec(), timeout);
    match runner.run(&cmd, &CancelToken::new()) {
        Ok(out) if out.success() => {
            info!(probe = %cmd.display(), "GPU detected");
            true
        }
        Ok(out) => {
            debug!(
                probe = %cmd.display(),
                exit_code = ?out.exit_code,
                timed_out = out.timed_out,
                "GPU probe negative"
            );
            false
        }
        Err(e) => {
            debug!(probe = %cmd.display(), error = %e, "GPU probe could not run");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::SystemRunner;

    #[test]
    fn ensure_available_does_not_panic() {
        // We only assert it doesn't panic; CI may or may not have Docker.
        let _ = ensure_available(&SystemRunner::new(), "docker");
    }

    #[test]
    fn empty_probe_is_unavailable() {
        assert!(!gpu_available(
            &SystemRunner::new(),
            &[],
            Duration::from_secs(1)
        ));
    }

    #[test]
    fn missing_probe_binary_is_unavailable() {
        let probe = vec!["shipshape-no-such-probe".to_string()];
        assert!(!gpu_available(
            &SystemRunner::new(),
            &probe,
            Duration::from_secs(1)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn successful_probe_is_available() {
        let probe = vec!["true".to_string()];
        assert!(gpu_available(
            &SystemRunner::new(),
            &probe,
            Duration::from_secs(5)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn slow_probe_times_out_as_unavailable() {
        let probe = vec!["sleep".to_string(), "30".to_string()];
        assert!(!gpu_available(
            &SystemRunner::new(),
            &probe,
            Duration::from_millis(300)
        ));
    }
}
