use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Cooperative cancellation token backed by an `AtomicBool`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Describes one subprocess invocation. The pipeline layer assembles `args`;
/// the runner never adds flags of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
            timeout,
            stdin: None,
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// First argument, e.g. `build` for `docker build ...`.
    pub fn subcommand(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    /// Human-readable command line for logs and error messages.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.as_str());
        parts.extend(self.args.iter().map(String::as_str));
        shell_words::join(parts)
    }
}

/// Outcome of a finished (or killed) subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// stdout and stderr interleaved in arrival order.
    pub log: String,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Capture hit the configured ceiling; `log` ends with a marker line.
    pub truncated: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.cancelled
    }

    /// `log` without the trailing truncation marker line.
    pub fn captured(&self) -> &str {
        if !self.truncated {
            return &self.log;
        }
        let body = self.log.strip_suffix('\n').unwrap_or(&self.log);
        match body.rfind('\n') {
            Some(end) => &self.log[..=end],
            None => "",
        }
    }
}

/// Streamed output from a running subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

impl OutputLine {
    pub fn text(&self) -> &str {
        match self {
            Self::Stdout(s) | Self::Stderr(s) => s,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_drops_only_the_marker() {
        let mut out = ProcessOutput {
            log: "one\ntwo\n[output truncated: 3 further lines dropped after 8 bytes]\n".into(),
            truncated: true,
            ..ProcessOutput::default()
        };
        assert_eq!(out.captured(), "one\ntwo\n");
        out.truncated = false;
        assert_eq!(out.captured(), out.log);
    }

    #[test]
    fn cancel_token_starts_uncancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_token_transitions_once() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        // Idempotent; calling again is fine.
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_is_visible_across_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn display_quotes_arguments_with_spaces() {
        let cmd = ProcessCommand::new(
            "docker",
            vec!["run".into(), "img".into(), "echo hi".into()],
            Duration::from_secs(1),
        );
        assert_eq!(cmd.display(), "docker run img 'echo hi'");
        assert_eq!(cmd.subcommand(), Some("run"));
    }

    #[test]
    fn timed_out_output_is_never_success() {
        let out = ProcessOutput {
            exit_code: Some(0),
            timed_out: true,
            ..ProcessOutput::default()
        };
        assert!(!out.success());
    }
}
