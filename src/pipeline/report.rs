use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;

use crate::error::StepError;

use super::types::{
    BuildResult, CheckoutResult, LogsResult, RunResult, Step, StepResult, StepStatus,
};

/// Lines of container output shown in the rendered report.
pub const LOG_PREVIEW_LINES: usize = 20;

const OVERALL_PREFIX: &str = "Overall Success:";
const PASS_MARK: &str = "✅";
const FAIL_MARK: &str = "❌";

/// Outcome of one validation pass, structured and rendered.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub repository: String,
    pub checkout: StepResult<CheckoutResult>,
    pub build: StepResult<BuildResult>,
    pub run: StepResult<RunResult>,
    pub logs: StepResult<LogsResult>,
    /// Step name to error message, failed steps only.
    pub errors: BTreeMap<String, String>,
    pub overall_success: bool,
    pub rendered: String,
}

impl ValidationReport {
    pub fn status(&self, step: Step) -> StepStatus {
        match step {
            Step::Checkout => self.checkout.status(),
            Step::Build => self.build.status(),
            Step::Run => self.run.status(),
            Step::Logs => self.logs.status(),
        }
    }

    pub fn error(&self, step: Step) -> Option<&StepError> {
        match step {
            Step::Checkout => self.checkout.error(),
            Step::Build => self.build.error(),
            Step::Run => self.run.error(),
            Step::Logs => self.logs.error(),
        }
    }

    /// Every failure with its raw output, in step order, for a repair collaborator.
    pub fn error_text(&self) -> String {
        let mut out = String::new();
        for step in Step::ALL {
            let Some(err) = self.error(step) else {
                continue;
            };
            let _ = writeln!(out, "[{step}] {err}");
            if let Some(raw) = err.raw_output() {
                out.push_str(raw);
                if !raw.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
        out
    }

    /// Container log text if the logs step produced any.
    pub fn log_text(&self) -> &str {
        self.logs.ok().map(|l| l.text.as_str()).unwrap_or("")
    }
}

/// Aggregate the four step results into a report. Pure: the same inputs
/// always render the same document.
pub fn generate_report(
    repository: &str,
    checkout: StepResult<CheckoutResult>,
    build: StepResult<BuildResult>,
    run: StepResult<RunResult>,
    logs: StepResult<LogsResult>,
) -> ValidationReport {
    let mut errors = BTreeMap::new();
    let failures = [
        (Step::Checkout, checkout.error()),
        (Step::Build, build.error()),
        (Step::Run, run.error()),
        (Step::Logs, logs.error()),
    ];
    for (step, err) in failures {
        if let Some(err) = err {
            errors.insert(step.as_str().to_string(), err.to_string());
        }
    }

    let artifacts_present = checkout.ok().is_some_and(|c| !c.path.as_os_str().is_empty())
        && build.ok().is_some_and(|b| !b.image_tag.is_empty())
        && run.ok().is_some_and(|r| !r.container_id.is_empty())
        && logs.is_success();
    let overall_success = errors.is_empty() && artifacts_present;

    let mut report = ValidationReport {
        repository: repository.to_string(),
        checkout,
        build,
        run,
        logs,
        errors,
        overall_success,
        rendered: String::new(),
    };
    report.rendered = render(&report);
    report
}

/// Read the verdict back out of a rendered report.
pub fn parse_overall_success(rendered: &str) -> Option<bool> {
    rendered.lines().find_map(|line| {
        let rest = line.trim().strip_prefix(OVERALL_PREFIX)?.trim();
        if rest.starts_with(PASS_MARK) {
            Some(true)
        } else if rest.starts_with(FAIL_MARK) {
            Some(false)
        } else {
            None
        }
    })
}

fn mark(ok: bool) -> &'static str {
    if ok { PASS_MARK } else { FAIL_MARK }
}

fn status_line(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "Status: ✅ Success",
        StepStatus::Failed => "Status: ❌ Failed",
        StepStatus::Skipped => "Status: ⏭️ Skipped",
    }
}

fn render(report: &ValidationReport) -> String {
    let mut doc = String::new();
    let _ = writeln!(doc, "# Container Validation Report: {}", report.repository);
    doc.push('\n');

    // ── Summary ─────────────────────────────────────────────────────
    doc.push_str("## Summary\n\n");
    let _ = writeln!(doc, "{OVERALL_PREFIX} {}", mark(report.overall_success));
    let _ = writeln!(doc, "Repository: {}", report.repository);
    let steps: Vec<String> = Step::ALL
        .iter()
        .map(|s| format!("{s} {}", mark(report.status(*s) == StepStatus::Success)))
        .collect();
    let _ = writeln!(doc, "Steps: {}", steps.join(" | "));
    doc.push('\n');

    // ── Per-step sections ───────────────────────────────────────────
    section(&mut doc, Step::Checkout, report, |doc| {
        if let Some(c) = report.checkout.ok() {
            let _ = writeln!(doc, "Path: {}", c.path.display());
        }
    });
    section(&mut doc, Step::Build, report, |doc| {
        if let Some(b) = report.build.ok() {
            let _ = writeln!(doc, "Image: {}", b.image_tag);
            let _ = writeln!(doc, "Dockerfile: {}", b.dockerfile.display());
            let _ = writeln!(doc, "Build output: {} lines", b.log.lines().count());
        }
    });
    section(&mut doc, Step::Run, report, |doc| {
        if let Some(r) = report.run.ok() {
            let _ = writeln!(doc, "Container ID: {}", r.container_id);
            let _ = writeln!(doc, "Container Name: {}", r.container_name);
            let _ = writeln!(doc, "GPU: {}", if r.gpu { "enabled" } else { "not available" });
        }
    });
    section(&mut doc, Step::Logs, report, |doc| {
        if let Some(l) = report.logs.ok() {
            render_log_preview(doc, l);
        }
    });

    // ── Conclusion ──────────────────────────────────────────────────
    doc.push_str("## Conclusion\n\n");
    if report.overall_success {
        doc.push_str("The repository builds and runs as a container.\n");
    } else {
        let failed: Vec<&str> = Step::ALL
            .iter()
            .filter(|s| report.status(**s) == StepStatus::Failed)
            .map(|s| s.as_str())
            .collect();
        if failed.is_empty() {
            doc.push_str("Validation failed: a required artifact is missing.\n");
        } else {
            let _ = writeln!(doc, "Validation failed at: {}.", failed.join(", "));
        }
    }
    doc
}

fn section(
    doc: &mut String,
    step: Step,
    report: &ValidationReport,
    details: impl FnOnce(&mut String),
) {
    let _ = writeln!(doc, "## {}\n", step.title());
    doc.push_str(status_line(report.status(step)));
    doc.push('\n');
    match report.error(step) {
        Some(err) => {
            let _ = writeln!(doc, "Error: {err}");
            if let Some(raw) = err.raw_output() {
                doc.push_str("\n```text\n");
                doc.push_str(raw);
                if !raw.ends_with('\n') {
                    doc.push('\n');
                }
                doc.push_str("```\n");
            }
        }
        None => details(doc),
    }
    doc.push('\n');
}

fn render_log_preview(doc: &mut String, logs: &LogsResult) {
    let _ = writeln!(doc, "Lines: {}", logs.line_count);
    if logs.truncated {
        doc.push_str("Output exceeded the capture limit; later lines were dropped.\n");
    }
    if logs.line_count == 0 {
        doc.push_str("The container produced no output.\n");
        return;
    }
    doc.push_str("\n### Log Preview\n\n```text\n");
    for line in logs.text.lines().take(LOG_PREVIEW_LINES) {
        doc.push_str(line);
        doc.push('\n');
    }
    doc.push_str("```\n");
    let remaining = logs.line_count.saturating_sub(LOG_PREVIEW_LINES);
    if remaining > 0 {
        let _ = writeln!(doc, "... and {remaining} more lines");
    }
}
