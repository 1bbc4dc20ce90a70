// Repair collaborator seam: given a failed validation, propose fixes and say whether to revalidate.

mod script;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use script::ScriptRepair;

use crate::error::RepairError;
use crate::pipeline::StepStatus;

/// Everything a collaborator gets to see about a failed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairContext {
    pub repository: String,
    pub path: PathBuf,
    pub build_status: StepStatus,
    pub run_status: StepStatus,
    /// Aggregated error messages plus raw process output, verbatim.
    pub error_text: String,
    /// Container logs if any were collected, otherwise empty.
    pub logs: String,
    /// 1-based.
    pub attempt: u32,
}

/// A collaborator's answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairOutcome {
    #[serde(default)]
    pub fixes_applied: Vec<String>,
    pub needs_revalidation: bool,
}

pub trait RepairCollaborator: Send + Sync {
    fn repair(&self, context: &RepairContext) -> Result<RepairOutcome, RepairError>;
}

/// Collaborator used when no repair command is configured: never asks for
/// another pass.
#[derive(Debug, Clone, Default)]
pub struct NoRepair;

impl RepairCollaborator for NoRepair {
    fn repair(&self, _context: &RepairContext) -> Result<RepairOutcome, RepairError> {
        Ok(RepairOutcome::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_parses_without_fix_list() {
        let outcome: RepairOutcome =
            serde_json::from_str(r#"{"needs_revalidation": true}"#).unwrap();
        assert!(outcome.needs_revalidation);
        assert!(outcome.fixes_applied.is_empty());
    }

    #[test]
    fn outcome_requires_revalidation_flag() {
        assert!(serde_json::from_str::<RepairOutcome>(r#"{"fixes_applied": []}"#).is_err());
    }

    #[test]
    fn no_repair_never_revalidates() {
        let ctx = RepairContext {
            repository: "octo/hello".into(),
            path: PathBuf::from("/tmp/hello"),
            build_status: StepStatus::Failed,
            run_status: StepStatus::Skipped,
            error_text: "boom".into(),
            logs: String::new(),
            attempt: 1,
        };
        let outcome = NoRepair.repair(&ctx).unwrap();
        assert!(!outcome.needs_revalidation);
    }
}
