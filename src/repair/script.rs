use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use super::{RepairCollaborator, RepairContext, RepairOutcome};
use crate::docker::{CancelToken, ProcessCommand, ProcessRunner};
use crate::error::RepairError;

/// Runs an external command as the repair collaborator.
///
/// The [`RepairContext`] is written to the command's stdin as JSON; the
/// command must print a JSON object with `fixes_applied` and
/// `needs_revalidation` on stdout. It runs inside the repository checkout.
pub struct ScriptRepair {
    argv: Vec<String>,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl ScriptRepair {
    /// `command` is a shell-style command line, e.g. `./fix.sh --aggressive`.
    pub fn new(command: &str, timeout: Duration, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        let argv = shell_words::split(command)?;
        if argv.is_empty() {
            anyhow::bail!("repair command cannot be blank");
        }
        Ok(Self {
            argv,
            timeout,
            runner,
        })
    }
}

impl RepairCollaborator for ScriptRepair {
    fn repair(&self, context: &RepairContext) -> Result<RepairOutcome, RepairError> {
        let input = serde_json::to_string(context).map_err(|e| RepairError::Unreachable {
            message: format!("failed to encode repair context: {e}"),
        })?;
        let cmd = ProcessCommand::new(self.argv[0].clone(), self.argv[1..].to_vec(), self.timeout)
            .current_dir(&context.path)
            .stdin(input);

        debug!(command = %cmd.display(), attempt = context.attempt, "invoking repair command");
        let out = self
            .runner
            .run(&cmd, &CancelToken::new())
            .map_err(|e| RepairError::Unreachable {
                message: format!("{e:#}"),
            })?;

        if out.timed_out {
            return Err(RepairError::Unreachable {
                message: format!("`{}` timed out after {}s", cmd.display(), self.timeout.as_secs()),
            });
        }
        if !out.success() {
            warn!(exit_code = ?out.exit_code, "repair command failed");
            return Err(RepairError::Unreachable {
                message: format!(
                    "`{}` exited with {:?}:\n{}",
                    cmd.display(),
                    out.exit_code,
                    out.log
                ),
            });
        }

        parse_outcome(&out.stdout)
    }
}

/// Accepts either a bare JSON object or output whose last non-empty line is one.
fn parse_outcome(stdout: &str) -> Result<RepairOutcome, RepairError> {
    let trimmed = stdout.trim();
    if let Ok(outcome) = serde_json::from_str::<RepairOutcome>(trimmed) {
        return Ok(outcome);
    }
    let last = trimmed.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
    serde_json::from_str::<RepairOutcome>(last.trim()).map_err(|e| RepairError::Malformed {
        message: format!("{e}; output was: {trimmed}"),
    })
}
