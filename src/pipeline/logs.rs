use tracing::{debug, warn};

use crate::config::Config;
use crate::docker::{CancelToken, ProcessRunner};
use crate::error::StepError;
use crate::log_parser;

use super::commands::{LogOptions, logs_command};
use super::types::{LogsResult, StepResult};

/// Retrieve and parse a container's timestamped output.
///
/// No output at all is a success. Hitting the timeout is a failure in both
/// modes; follow mode only gets the longer bound.
pub fn collect_logs(
    runner: &dyn ProcessRunner,
    cfg: &Config,
    container_id: &str,
    opts: &LogOptions,
    cancel: &CancelToken,
) -> StepResult<LogsResult> {
    let cmd = logs_command(cfg, container_id, opts);
    debug!(container_id, follow = opts.follow, "collecting logs");

    let out = match runner.run(&cmd, cancel) {
        Ok(out) => out,
        Err(e) => {
            return StepResult::Failure(StepError::LogCollection {
                message: format!("{e:#}"),
                output: String::new(),
            });
        }
    };

    if out.cancelled {
        return StepResult::Failure(StepError::LogCollection {
            message: "cancelled".to_string(),
            output: out.log,
        });
    }
    if out.timed_out {
        warn!(container_id, follow = opts.follow, "log retrieval timed out");
        return StepResult::Failure(StepError::LogCollection {
            message: format!("timed out after {}s", cmd.timeout.as_secs()),
            output: out.log,
        });
    }
    if out.exit_code != Some(0) {
        warn!(container_id, exit_code = ?out.exit_code, "log retrieval failed");
        return StepResult::Failure(StepError::LogCollection {
            message: format!("`{}` exited with {:?}", cmd.display(), out.exit_code),
            output: out.log,
        });
    }

    if out.truncated {
        warn!(container_id, "container output exceeded the capture limit");
    }
    let text = out.captured().to_string();
    let lines = log_parser::parse_logs(&text);
    debug!(container_id, lines = lines.len(), "logs collected");
    StepResult::Success(LogsResult {
        line_count: lines.len(),
        truncated: out.truncated,
        text,
        lines,
    })
}
