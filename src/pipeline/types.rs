use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, bail};
use serde::Serialize;

use crate::config::DEFAULT_PLATFORM;
use crate::error::{RepairError, StepError};
use crate::log_parser::LogLine;

use super::report::ValidationReport;

/// Pipeline steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Checkout,
    Build,
    Run,
    Logs,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Checkout, Step::Build, Step::Run, Step::Logs];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Checkout => "checkout",
            Step::Build => "build",
            Step::Run => "run",
            Step::Logs => "logs",
        }
    }

    /// Section header used in the rendered report.
    pub fn title(self) -> &'static str {
        match self {
            Step::Checkout => "Repository Checkout",
            Step::Build => "Build",
            Step::Run => "Container Execution",
            Step::Logs => "Container Logs",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse status of a step, as shown to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
    /// Not attempted because a prerequisite failed.
    Skipped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

/// Outcome of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "lowercase")]
pub enum StepResult<T> {
    Success(T),
    Failure(StepError),
}

impl<T> StepResult<T> {
    pub fn prerequisite_failed(prerequisite: Step) -> Self {
        Self::Failure(StepError::PrerequisiteFailed { prerequisite })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Self::Success(v) => Some(v),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&StepError> {
        match self {
            Self::Success(_) => None,
            Self::Failure(e) => Some(e),
        }
    }

    pub fn status(&self) -> StepStatus {
        match self {
            Self::Success(_) => StepStatus::Success,
            Self::Failure(e) if e.is_prerequisite_failure() => StepStatus::Skipped,
            Self::Failure(_) => StepStatus::Failed,
        }
    }
}

impl<T> From<Result<T, StepError>> for StepResult<T> {
    fn from(result: Result<T, StepError>) -> Self {
        match result {
            Ok(v) => Self::Success(v),
            Err(e) => Self::Failure(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutResult {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
    /// Sanitized tag the image was built under.
    pub image_tag: String,
    pub dockerfile: PathBuf,
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub container_id: String,
    pub container_name: String,
    pub gpu: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogsResult {
    pub text: String,
    pub line_count: usize,
    /// Output hit the capture ceiling; `text` holds what fit.
    pub truncated: bool,
    #[serde(skip)]
    pub lines: Vec<LogLine>,
}

/// `HOST:CONTAINER[/PROTOCOL]` port publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
    pub protocol: Option<String>,
}

impl FromStr for PortMapping {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, protocol) = match s.split_once('/') {
            Some((ports, proto)) => (ports, Some(proto)),
            None => (s, None),
        };
        let (host, container) = ports
            .split_once(':')
            .with_context(|| format!("port mapping must be HOST:CONTAINER, got '{s}'"))?;
        let host = host
            .parse()
            .with_context(|| format!("invalid host port in '{s}'"))?;
        let container = container
            .parse()
            .with_context(|| format!("invalid container port in '{s}'"))?;
        let protocol = match protocol {
            None => None,
            Some(p @ ("tcp" | "udp" | "sctp")) => Some(p.to_string()),
            Some(other) => bail!("unsupported protocol '{other}' in '{s}'"),
        };
        Ok(Self {
            host,
            container,
            protocol,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)?;
        if let Some(proto) = &self.protocol {
            write!(f, "/{proto}")?;
        }
        Ok(())
    }
}

/// Parse a `KEY=VALUE` environment assignment.
pub fn parse_env_var(s: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .with_context(|| format!("environment variable must be KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        bail!("environment variable name cannot be empty in '{s}'");
    }
    Ok((key.to_string(), value.to_string()))
}

/// What to validate. Fixed for the duration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationRequest {
    pub repository: String,
    pub path: PathBuf,
    pub image_name: Option<String>,
    pub platform: String,
    /// Build file to use instead of the first one discovered.
    pub dockerfile: Option<PathBuf>,
    pub container_name: Option<String>,
    pub ports: Vec<PortMapping>,
    pub env: Vec<(String, String)>,
    pub command: Option<Vec<String>>,
}

impl ValidationRequest {
    pub fn new(repository: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            path: path.into(),
            image_name: None,
            platform: DEFAULT_PLATFORM.to_string(),
            dockerfile: None,
            container_name: None,
            ports: Vec::new(),
            env: Vec::new(),
            command: None,
        }
    }
}

/// Per-run options that are not part of the repository identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOverrides {
    pub image_name: Option<String>,
    pub platform: Option<String>,
    pub dockerfile: Option<String>,
    pub container_name: Option<String>,
    pub ports: Vec<PortMapping>,
    pub env: Vec<(String, String)>,
    pub command: Option<Vec<String>>,
}

/// One invocation of the repair collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairAttempt {
    /// 1-based, never above the attempt cap.
    pub attempt: u32,
    pub fixes_applied: Vec<String>,
    pub needs_revalidation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

/// Terminal state of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub verdict: Verdict,
    /// Report of the last validation pass; earlier ones are discarded.
    pub report: ValidationReport,
    /// Every repair made this run, kept for the caller only. Later passes
    /// never see earlier attempts.
    pub repair_attempts: Vec<RepairAttempt>,
    /// Validation passes executed (at most cap + 1).
    pub passes: u32,
    pub repair_error: Option<RepairError>,
}

/// Events emitted while a run progresses.
#[derive(Debug)]
pub enum PipelineEvent {
    PassStarted { pass: u32 },
    PhaseStarted(Step),
    Log { phase: Step, line: String },
    PhaseFinished { phase: Step, success: bool },
    RepairStarted { attempt: u32 },
    RepairFinished(Result<RepairAttempt, RepairError>),
    Completed(Box<RunOutcome>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_order_matches_pipeline() {
        let names: Vec<_> = Step::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["checkout", "build", "run", "logs"]);
        assert!(Step::Build < Step::Run);
    }

    #[test]
    fn prerequisite_failure_is_skipped_status() {
        let r: StepResult<RunResult> = StepResult::prerequisite_failed(Step::Build);
        assert_eq!(r.status(), StepStatus::Skipped);
        assert!(!r.is_success());
        assert!(r.ok().is_none());
    }

    #[test]
    fn port_mapping_parses() {
        let p: PortMapping = "8080:80".parse().unwrap();
        assert_eq!((p.host, p.container, p.protocol), (8080, 80, None));
        let p: PortMapping = "5353:53/udp".parse().unwrap();
        assert_eq!(p.protocol.as_deref(), Some("udp"));
        assert_eq!(p.to_string(), "5353:53/udp");
    }

    #[test]
    fn port_mapping_rejects_garbage() {
        assert!("8080".parse::<PortMapping>().is_err());
        assert!("a:80".parse::<PortMapping>().is_err());
        assert!("80:99999".parse::<PortMapping>().is_err());
        assert!("80:80/http".parse::<PortMapping>().is_err());
    }

    #[test]
    fn env_var_parsing() {
        assert_eq!(
            parse_env_var("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_env_var("EMPTY=").unwrap().1, "");
        assert!(parse_env_var("NOEQ").is_err());
        assert!(parse_env_var("=x").is_err());
    }

    #[test]
    fn request_defaults_platform() {
        let req = ValidationRequest::new("octo/hello", "/tmp/hello");
        assert_eq!(req.platform, "linux/amd64");
        assert!(req.ports.is_empty());
    }
}
