// Process execution surface: subprocess lifecycle, streaming output, timeouts, cancellation.

pub mod engine;
pub mod run;
pub mod types;

use anyhow::Result;

pub use engine::{ensure_available, gpu_available};
pub use run::{DEFAULT_CAPTURE_LIMIT, SystemRunner};
pub use types::{CancelToken, OutputLine, ProcessCommand, ProcessOutput};

/// Runs external commands on behalf of the pipeline.
///
/// `Err` means the process could not be started at all; a process that ran
/// and failed, timed out, or was cancelled is reported through
/// [`ProcessOutput`].
pub trait ProcessRunner: Send + Sync {
    /// Run to completion, forwarding every output line to `on_line` as it arrives.
    fn stream(
        &self,
        cmd: &ProcessCommand,
        cancel: &CancelToken,
        on_line: &mut dyn FnMut(&OutputLine),
    ) -> Result<ProcessOutput>;

    /// Run to completion and return the buffered output.
    fn run(&self, cmd: &ProcessCommand, cancel: &CancelToken) -> Result<ProcessOutput> {
        self.stream(cmd, cancel, &mut |_| {})
    }
}
