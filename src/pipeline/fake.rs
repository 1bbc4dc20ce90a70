//! Scripted stand-in for the container CLI, used by the pipeline tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{Result, bail};

use crate::docker::{CancelToken, OutputLine, ProcessCommand, ProcessOutput, ProcessRunner};

/// Replies to commands by key: the subcommand for `docker` invocations
/// (`build`, `run`, `logs`, `stop`, `rm`), the program name otherwise.
/// Queued replies are used first; then a per-key default applies.
#[derive(Default)]
pub struct ScriptedRunner {
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<ProcessCommand>>,
}

#[derive(Clone)]
pub enum Reply {
    Output(ProcessOutput),
    SpawnError,
}

pub fn ok(stdout: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        log: stdout.to_string(),
        ..ProcessOutput::default()
    }
}

pub fn exit(code: i32, log: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: Some(code),
        stderr: log.to_string(),
        log: log.to_string(),
        ..ProcessOutput::default()
    }
}

pub fn timed_out(log: &str) -> ProcessOutput {
    ProcessOutput {
        exit_code: None,
        log: log.to_string(),
        timed_out: true,
        ..ProcessOutput::default()
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, key: &str, reply: ProcessOutput) -> &Self {
        self.push_reply(key, Reply::Output(reply))
    }

    pub fn push_reply(&self, key: &str, reply: Reply) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, key: &str) -> usize {
        self.calls().iter().filter(|c| key_of(c) == key).count()
    }

    fn default_reply(key: &str) -> Reply {
        match key {
            "build" => Reply::Output(ok("Step 1/1 : FROM alpine\nSuccessfully built\n")),
            "run" => Reply::Output(ok("0123456789ab\n")),
            "logs" => Reply::Output(ok("2024-01-01T00:00:00.000000000Z hello\n")),
            "stop" | "rm" => Reply::Output(ok("")),
            _ => Reply::SpawnError,
        }
    }
}

fn key_of(cmd: &ProcessCommand) -> String {
    if cmd.program == "docker" {
        cmd.subcommand().unwrap_or_default().to_string()
    } else {
        cmd.program.clone()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn stream(
        &self,
        cmd: &ProcessCommand,
        _cancel: &CancelToken,
        on_line: &mut dyn FnMut(&OutputLine),
    ) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        let key = key_of(cmd);
        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        match queued.unwrap_or_else(|| Self::default_reply(&key)) {
            Reply::Output(out) => {
                for line in out.log.lines() {
                    on_line(&OutputLine::Stdout(line.to_string()));
                }
                Ok(out)
            }
            Reply::SpawnError => bail!("No such file or directory: {}", cmd.program),
        }
    }
}
