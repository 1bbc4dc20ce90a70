use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::ProcessRunner;
use super::types::{CancelToken, OutputLine, ProcessCommand, ProcessOutput};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long to keep draining pipes after a kill. Grandchildren may hold the
/// pipes open, so the reader threads are detached after this.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Default capture ceiling per process.
pub const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024 * 1024;

/// [`ProcessRunner`] backed by real subprocesses.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    capture_limit: usize,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capture_limit(capture_limit: usize) -> Self {
        Self {
            capture_limit: capture_limit.max(1),
        }
    }
}

impl ProcessRunner for SystemRunner {
    fn stream(
        &self,
        cmd: &ProcessCommand,
        cancel: &CancelToken,
        on_line: &mut dyn FnMut(&OutputLine),
    ) -> Result<ProcessOutput> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(if cmd.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.working_dir {
            command.current_dir(dir);
        }

        debug!(command = %cmd.display(), "spawning process");
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", cmd.program))?;

        let (tx, rx) = mpsc::channel();
        let readers = attach_readers(&mut child, &tx)?;
        drop(tx);

        if let Some(input) = cmd.stdin.clone()
            && let Some(mut stdin) = child.stdin.take()
        {
            // A child that exits without reading stdin is not an error here.
            std::thread::spawn(move || {
                let _ = stdin.write_all(input.as_bytes());
            });
        }

        let mut capture = Capture::new(self.capture_limit);
        let start = Instant::now();
        let mut timed_out = false;
        let mut cancelled = false;

        // --- poll loop ---------------------------------------------------------
        let exit_status = loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => {
                    capture.push(&line);
                    on_line(&line);
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Pipes closed but the process lingers.
                Err(RecvTimeoutError::Disconnected) => std::thread::sleep(POLL_INTERVAL),
            }

            match child.try_wait() {
                Ok(Some(status)) => break Some(status),
                Ok(None) => {}
                Err(_) => break None,
            }

            if cancel.is_cancelled() {
                cancelled = true;
                kill(&mut child, &cmd.program);
                break None;
            }

            if start.elapsed() > cmd.timeout {
                timed_out = true;
                kill(&mut child, &cmd.program);
                break None;
            }
        };

        // --- finalize ----------------------------------------------------------
        let killed = timed_out || cancelled;
        let deadline = if killed {
            Instant::now() + DRAIN_GRACE
        } else {
            (start + cmd.timeout).max(Instant::now()) + DRAIN_GRACE
        };
        let drained = loop {
            match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
                Ok(line) => {
                    capture.push(&line);
                    on_line(&line);
                }
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };
        if drained {
            for handle in readers {
                let _ = handle.join();
            }
        }

        let exit_code = exit_status.and_then(|s| s.code());
        let (stdout, stderr, log, truncated) = capture.finish();
        Ok(ProcessOutput {
            exit_code,
            stdout,
            stderr,
            log,
            timed_out,
            cancelled,
            truncated,
        })
    }
}

fn attach_readers(child: &mut Child, tx: &Sender<OutputLine>) -> Result<Vec<JoinHandle<()>>> {
    let stdout = child.stdout.take().context("stdout was not piped")?;
    let stderr = child.stderr.take().context("stderr was not piped")?;

    let tx_out = tx.clone();
    let stdout_handle = std::thread::spawn(move || pump(stdout, &tx_out, OutputLine::Stdout));
    let tx_err = tx.clone();
    let stderr_handle = std::thread::spawn(move || pump(stderr, &tx_err, OutputLine::Stderr));

    Ok(vec![stdout_handle, stderr_handle])
}

/// Forward a pipe line by line until EOF. Invalid UTF-8 is replaced rather
/// than ending the stream, so the child never blocks on a full pipe.
fn pump(pipe: impl Read, tx: &Sender<OutputLine>, wrap: fn(String) -> OutputLine) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                // Receiver may be dropped; ignore send errors.
                let _ = tx.send(wrap(String::from_utf8_lossy(&buf).into_owned()));
            }
        }
    }
}

fn kill(child: &mut Child, program: &str) {
    if let Err(e) = child.kill() {
        warn!(program, error = %e, "failed to kill process");
    }
    let _ = child.wait();
}

/// Accumulates output up to a byte ceiling. Anything past the ceiling is
/// dropped and reported with a marker line.
struct Capture {
    limit: usize,
    used: usize,
    stdout: String,
    stderr: String,
    log: String,
    dropped: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            used: 0,
            stdout: String::new(),
            stderr: String::new(),
            log: String::new(),
            dropped: 0,
        }
    }

    fn push(&mut self, line: &OutputLine) {
        let text = line.text();
        let cost = text.len() + 1;
        if self.used + cost > self.limit {
            self.dropped += 1;
            return;
        }
        self.used += cost;

        let target = match line {
            OutputLine::Stdout(_) => &mut self.stdout,
            OutputLine::Stderr(_) => &mut self.stderr,
        };
        target.push_str(text);
        target.push('\n');
        self.log.push_str(text);
        self.log.push('\n');
    }

    fn finish(mut self) -> (String, String, String, bool) {
        let truncated = self.dropped > 0;
        if truncated {
            self.log.push_str(&format!(
                "[output truncated: {} further lines dropped after {} bytes]\n",
                self.dropped, self.limit
            ));
        }
        (self.stdout, self.stderr, self.log, truncated)
    }
}
