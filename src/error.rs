use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::Step;

/// Why a pipeline step failed.
///
/// Variants that originate from a subprocess carry its raw output verbatim so
/// it can be handed to a repair collaborator or an operator unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    #[error("checkout failed: {message}")]
    Checkout { message: String },

    #[error("no Dockerfile found under '{}'", root.display())]
    DockerfileNotFound { root: PathBuf },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Run(#[from] RunError),

    /// Retrieval failed. An empty log is not an error.
    #[error("log collection failed: {message}")]
    LogCollection { message: String, output: String },

    /// The step was not attempted because an earlier step produced nothing to
    /// work with.
    #[error("prerequisite failed: {prerequisite} step did not succeed")]
    PrerequisiteFailed { prerequisite: Step },
}

impl StepError {
    /// Raw process output captured when the step failed, if any.
    pub fn raw_output(&self) -> Option<&str> {
        let output = match self {
            Self::Build(e) => e.raw_output(),
            Self::Run(e) => e.raw_output(),
            Self::LogCollection { output, .. } => Some(output.as_str()),
            Self::Checkout { .. }
            | Self::DockerfileNotFound { .. }
            | Self::PrerequisiteFailed { .. } => None,
        };
        output.filter(|o| !o.is_empty())
    }

    pub fn is_prerequisite_failure(&self) -> bool {
        matches!(self, Self::PrerequisiteFailed { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BuildError {
    #[error("image build exited with {}", describe_exit(*code))]
    NonZeroExit { code: Option<i32>, output: String },

    #[error("image build timed out after {secs}s")]
    TimedOut { secs: u64, output: String },

    #[error("image build was cancelled")]
    Cancelled { output: String },

    #[error("failed to start image build: {message}")]
    Spawn { message: String },
}

impl BuildError {
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output } => Some(output),
            Self::Spawn { .. } => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RunError {
    #[error("container name '{name}' is invalid and could not be repaired")]
    InvalidName { name: String },

    #[error("container start exited with {}", describe_exit(*code))]
    NonZeroExit { code: Option<i32>, output: String },

    #[error("container start timed out after {secs}s")]
    TimedOut { secs: u64, output: String },

    #[error("container start was cancelled")]
    Cancelled { output: String },

    #[error("container started but reported no id")]
    MissingId { output: String },

    #[error("failed to start container: {message}")]
    Spawn { message: String },
}

impl RunError {
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { output, .. }
            | Self::TimedOut { output, .. }
            | Self::Cancelled { output }
            | Self::MissingId { output } => Some(output),
            Self::InvalidName { .. } | Self::Spawn { .. } => None,
        }
    }
}

/// The repair collaborator could not produce a usable answer.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RepairError {
    #[error("repair collaborator unreachable: {message}")]
    Unreachable { message: String },

    #[error("repair collaborator returned a malformed result: {message}")]
    Malformed { message: String },
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(c) => format!("exit code {c}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
