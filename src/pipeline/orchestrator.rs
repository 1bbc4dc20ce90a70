use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use tracing::{info, info_span, warn};

use crate::config::{Config, DEFAULT_MAX_REPAIR_ATTEMPTS};
use crate::docker::{CancelToken, ProcessRunner};
use crate::error::{RepairError, StepError};
use crate::repair::{RepairCollaborator, RepairContext};
use crate::repo::RepositoryProvider;

use super::build::build_image;
use super::commands::LogOptions;
use super::container::{cleanup_container, run_container};
use super::logs::collect_logs;
use super::report::{ValidationReport, generate_report};
use super::types::{
    CheckoutResult, PipelineEvent, RepairAttempt, RequestOverrides, RunOutcome, Step, StepResult,
    ValidationRequest, Verdict,
};

/// Drives checkout once, then validation passes with repairs in between
/// until a pass succeeds, the collaborator gives up, or the attempt cap is hit.
pub struct Orchestrator {
    config: Config,
    repos: Arc<dyn RepositoryProvider>,
    repair: Arc<dyn RepairCollaborator>,
    runner: Arc<dyn ProcessRunner>,
    log_options: LogOptions,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        repos: Arc<dyn RepositoryProvider>,
        repair: Arc<dyn RepairCollaborator>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let log_options = LogOptions {
            tail: config.log_tail,
            follow: config.follow_logs,
            ..LogOptions::default()
        };
        Self {
            config,
            repos,
            repair,
            runner,
            log_options,
        }
    }

    pub fn with_log_options(mut self, log_options: LogOptions) -> Self {
        self.log_options = log_options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Configured repair attempts, never above [`DEFAULT_MAX_REPAIR_ATTEMPTS`].
    pub fn repair_cap(&self) -> u32 {
        self.config
            .max_repair_attempts
            .min(DEFAULT_MAX_REPAIR_ATTEMPTS)
    }

    /// Validate `repository`, repairing and revalidating as allowed.
    ///
    /// Always produces an outcome carrying a report, even when checkout fails.
    pub fn run(
        &self,
        repository: &str,
        overrides: RequestOverrides,
        cancel: &CancelToken,
        tx: &Sender<PipelineEvent>,
    ) -> RunOutcome {
        let _span = info_span!("validate", repository).entered();
        let cap = self.repair_cap();

        // ── Checkout (once per run) ──────────────────────────────────
        let _ = tx.send(PipelineEvent::PhaseStarted(Step::Checkout));
        let checkout: StepResult<CheckoutResult> = match self.repos.checkout(repository) {
            Ok(path) => StepResult::Success(CheckoutResult { path }),
            Err(e) => StepResult::Failure(StepError::Checkout {
                message: format!("{e:#}"),
            }),
        };
        let _ = tx.send(PipelineEvent::PhaseFinished {
            phase: Step::Checkout,
            success: checkout.is_success(),
        });

        let Some(checked_out) = checkout.ok().cloned() else {
            warn!("checkout failed; nothing to validate");
            let report = generate_report(
                repository,
                checkout,
                StepResult::prerequisite_failed(Step::Checkout),
                StepResult::prerequisite_failed(Step::Build),
                StepResult::prerequisite_failed(Step::Run),
            );
            return finish(tx, Verdict::Failed, report, Vec::new(), 0, None);
        };

        let request = self.request(repository, checked_out.path, overrides);
        let mut attempts: Vec<RepairAttempt> = Vec::new();
        let mut passes: u32 = 0;

        loop {
            // ── BUILD → RUN → LOGS → REPORT ─────────────────────────
            passes += 1;
            let _ = tx.send(PipelineEvent::PassStarted { pass: passes });
            let report = self.validate(&request, &checkout, cancel, tx);

            if report.overall_success {
                info!(passes, repairs = attempts.len(), "validation passed");
                return finish(tx, Verdict::Passed, report, attempts, passes, None);
            }
            if cancel.is_cancelled() {
                warn!("cancelled; not attempting repair");
                return finish(tx, Verdict::Failed, report, attempts, passes, None);
            }

            let used = attempts.len() as u32;
            if used >= cap {
                warn!(cap, "repair attempt cap reached");
                return finish(tx, Verdict::Failed, report, attempts, passes, None);
            }

            // ── REPAIR ──────────────────────────────────────────────
            let attempt = used + 1;
            let _ = tx.send(PipelineEvent::RepairStarted { attempt });
            let context = RepairContext {
                repository: request.repository.clone(),
                path: request.path.clone(),
                build_status: report.build.status(),
                run_status: report.run.status(),
                error_text: report.error_text(),
                logs: report.log_text().to_string(),
                attempt,
            };
            info!(attempt, cap, "invoking repair collaborator");

            match self.repair.repair(&context) {
                Ok(outcome) => {
                    let record = RepairAttempt {
                        attempt,
                        fixes_applied: outcome.fixes_applied,
                        needs_revalidation: outcome.needs_revalidation,
                    };
                    info!(
                        attempt,
                        fixes = record.fixes_applied.len(),
                        revalidate = record.needs_revalidation,
                        "repair finished"
                    );
                    let _ = tx.send(PipelineEvent::RepairFinished(Ok(record.clone())));
                    let revalidate = record.needs_revalidation;
                    attempts.push(record);
                    if !revalidate {
                        return finish(tx, Verdict::Failed, report, attempts, passes, None);
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "repair collaborator failed");
                    let _ = tx.send(PipelineEvent::RepairFinished(Err(e.clone())));
                    return finish(tx, Verdict::Failed, report, attempts, passes, Some(e));
                }
            }
        }
    }

    /// One validation pass. Each step runs only when its prerequisite produced
    /// an artifact; otherwise it is marked as a prerequisite failure.
    pub fn validate(
        &self,
        request: &ValidationRequest,
        checkout: &StepResult<CheckoutResult>,
        cancel: &CancelToken,
        tx: &Sender<PipelineEvent>,
    ) -> ValidationReport {
        let runner = self.runner.as_ref();
        let cfg = &self.config;

        let build = if checkout.is_success() {
            let _ = tx.send(PipelineEvent::PhaseStarted(Step::Build));
            let result = build_image(runner, cfg, request, cancel, &mut |line| {
                let _ = tx.send(PipelineEvent::Log {
                    phase: Step::Build,
                    line: line.text().to_string(),
                });
            });
            let _ = tx.send(PipelineEvent::PhaseFinished {
                phase: Step::Build,
                success: result.is_success(),
            });
            result
        } else {
            StepResult::prerequisite_failed(Step::Checkout)
        };

        let run = match build.ok() {
            Some(built) => {
                let _ = tx.send(PipelineEvent::PhaseStarted(Step::Run));
                let result = run_container(runner, cfg, request, &built.image_tag, cancel);
                let _ = tx.send(PipelineEvent::PhaseFinished {
                    phase: Step::Run,
                    success: result.is_success(),
                });
                result
            }
            None => StepResult::prerequisite_failed(Step::Build),
        };

        let logs = match run.ok() {
            Some(started) => {
                let _ = tx.send(PipelineEvent::PhaseStarted(Step::Logs));
                if !self.log_options.follow {
                    settle(cfg.log_settle(), cancel);
                }
                let result = collect_logs(
                    runner,
                    cfg,
                    &started.container_id,
                    &self.log_options,
                    cancel,
                );
                if let Some(logs) = result.ok() {
                    for line in logs.text.lines() {
                        let _ = tx.send(PipelineEvent::Log {
                            phase: Step::Logs,
                            line: line.to_string(),
                        });
                    }
                }
                let _ = tx.send(PipelineEvent::PhaseFinished {
                    phase: Step::Logs,
                    success: result.is_success(),
                });
                result
            }
            None => StepResult::prerequisite_failed(Step::Run),
        };

        if let Some(started) = run.ok()
            && !cfg.keep_container
        {
            cleanup_container(runner, cfg, &started.container_id);
        }

        generate_report(&request.repository, checkout.clone(), build, run, logs)
    }

    fn request(
        &self,
        repository: &str,
        path: PathBuf,
        overrides: RequestOverrides,
    ) -> ValidationRequest {
        let mut request = ValidationRequest::new(repository, path);
        request.platform = overrides
            .platform
            .unwrap_or_else(|| self.config.platform.clone());
        request.image_name = overrides.image_name;
        request.dockerfile = overrides.dockerfile.map(PathBuf::from);
        request.container_name = overrides.container_name;
        request.ports = overrides.ports;
        request.env = overrides.env;
        request.command = overrides.command;
        request
    }
}

fn finish(
    tx: &Sender<PipelineEvent>,
    verdict: Verdict,
    report: ValidationReport,
    repair_attempts: Vec<RepairAttempt>,
    passes: u32,
    repair_error: Option<RepairError>,
) -> RunOutcome {
    let outcome = RunOutcome {
        verdict,
        report,
        repair_attempts,
        passes,
        repair_error,
    };
    let _ = tx.send(PipelineEvent::Completed(Box::new(outcome.clone())));
    outcome
}

/// Launch a run on a background thread.
///
/// Returns a receiver that streams `PipelineEvent` values; the final event is
/// always `Completed`. Independent runs share nothing but the host runtime.
pub fn run_pipeline(
    orchestrator: Arc<Orchestrator>,
    repository: String,
    overrides: RequestOverrides,
    cancel: CancelToken,
) -> Receiver<PipelineEvent> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        orchestrator.run(&repository, overrides, &cancel, &tx);
    });
    rx
}

/// Give a fresh container time to produce output; returns early on cancel.
fn settle(duration: Duration, cancel: &CancelToken) {
    let deadline = Instant::now() + duration;
    while !cancel.is_cancelled() {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        std::thread::sleep(left.min(Duration::from_millis(100)));
    }
}
