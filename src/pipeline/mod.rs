pub mod build;
pub mod commands;
pub mod container;
#[cfg(test)]
pub(crate) mod fake;
pub mod logs;
pub mod orchestrator;
pub mod report;
pub mod sanitize;
mod types;

pub use build::build_image;
pub use commands::LogOptions;
pub use container::{Cleanup, cleanup_container, run_container};
pub use logs::collect_logs;
pub use orchestrator::{Orchestrator, run_pipeline};
pub use report::{ValidationReport, generate_report, parse_overall_success};
pub use sanitize::{repair_container_name, sanitize_tag};
pub use types::{
    BuildResult, CheckoutResult, LogsResult, PipelineEvent, PortMapping, RepairAttempt,
    RequestOverrides, RunOutcome, RunResult, Step, StepResult, StepStatus, ValidationRequest,
    Verdict, parse_env_var,
};
