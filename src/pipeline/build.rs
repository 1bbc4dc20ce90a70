use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::docker::{CancelToken, OutputLine, ProcessRunner};
use crate::error::{BuildError, StepError};
use crate::repo;

use super::commands::build_command;
use super::sanitize::{default_image_name, sanitize_tag};
use super::types::{BuildResult, Step, StepResult, ValidationRequest};

/// Locate the build file and build the image, streaming output to `on_line`.
pub fn build_image(
    runner: &dyn ProcessRunner,
    cfg: &Config,
    request: &ValidationRequest,
    cancel: &CancelToken,
    on_line: &mut dyn FnMut(&OutputLine),
) -> StepResult<BuildResult> {
    let dockerfile = match select_dockerfile(runner, cfg, request, cancel) {
        Ok(path) => path,
        Err(e) => return StepResult::Failure(e),
    };

    let requested = request
        .image_name
        .clone()
        .unwrap_or_else(|| default_image_name(&request.repository));
    let image_tag = sanitize_tag(&requested);
    let platform = if request.platform.trim().is_empty() {
        cfg.platform.as_str()
    } else {
        request.platform.as_str()
    };

    let cmd = build_command(cfg, &dockerfile, &image_tag, platform);
    info!(
        image = %image_tag,
        dockerfile = %dockerfile.display(),
        platform,
        "building image"
    );

    let mut forward = |line: &OutputLine| {
        debug!(phase = %Step::Build, "{}", line.text());
        on_line(line);
    };
    let out = match runner.stream(&cmd, cancel, &mut forward) {
        Ok(out) => out,
        Err(e) => {
            return StepResult::Failure(
                BuildError::Spawn {
                    message: format!("{e:#}"),
                }
                .into(),
            );
        }
    };

    if out.timed_out {
        warn!(image = %image_tag, "image build timed out");
        return StepResult::Failure(
            BuildError::TimedOut {
                secs: cmd.timeout.as_secs(),
                output: out.log,
            }
            .into(),
        );
    }
    if out.cancelled {
        return StepResult::Failure(BuildError::Cancelled { output: out.log }.into());
    }
    if !out.success() {
        warn!(image = %image_tag, exit_code = ?out.exit_code, "image build failed");
        return StepResult::Failure(
            BuildError::NonZeroExit {
                code: out.exit_code,
                output: out.log,
            }
            .into(),
        );
    }

    info!(image = %image_tag, "image built");
    StepResult::Success(BuildResult {
        image_tag,
        dockerfile,
        log: out.log,
    })
}

fn select_dockerfile(
    runner: &dyn ProcessRunner,
    cfg: &Config,
    request: &ValidationRequest,
    cancel: &CancelToken,
) -> Result<PathBuf, StepError> {
    if let Some(explicit) = &request.dockerfile {
        return repo::resolve_dockerfile(&request.path, &explicit.to_string_lossy()).map_err(|e| {
            warn!(error = %e, "requested Dockerfile unusable");
            StepError::DockerfileNotFound {
                root: request.path.clone(),
            }
        });
    }
    let found = repo::find_dockerfiles(runner, &request.path, cfg.search_depth, cancel)?;
    if found.len() > 1 {
        debug!(
            candidates = found.len(),
            chosen = %found[0].display(),
            "multiple Dockerfiles found"
        );
    }
    // find_dockerfiles never returns an empty list.
    found
        .into_iter()
        .next()
        .ok_or_else(|| StepError::DockerfileNotFound {
            root: request.path.clone(),
        })
}
