use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::debug;
use walkdir::WalkDir;

use crate::docker::{CancelToken, ProcessCommand, ProcessRunner};
use crate::error::StepError;

pub const DOCKERFILE: &str = "Dockerfile";

/// Directory names never descended into.
const SKIPPED_DIRS: [&str; 5] = [".git", "node_modules", "target", ".idea", ".vscode"];

/// How the repository tree is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Delegate to the host `find` utility.
    System,
    /// Walk the tree in-process.
    Walk,
}

/// Upper bound on the host `find`; the in-process walk takes over after it.
const FIND_TIMEOUT: Duration = Duration::from_secs(30);

/// Locate build files (`Dockerfile` and `Dockerfile.*`) under `root`.
///
/// Paths are absolute and ordered shallowest first, then lexicographically,
/// so the first element is the natural default. Uses the host `find` through
/// `runner` where available and falls back to an in-process walk when it is
/// missing, fails, times out, or reports paths that do not resolve.
pub fn find_dockerfiles(
    runner: &dyn ProcessRunner,
    root: &Path,
    max_depth: usize,
    cancel: &CancelToken,
) -> Result<Vec<PathBuf>, StepError> {
    let not_found = || StepError::DockerfileNotFound {
        root: root.to_path_buf(),
    };
    let root = root.canonicalize().map_err(|_| not_found())?;
    if !root.is_dir() {
        return Err(not_found());
    }

    let found = match discover(runner, &root, max_depth, Strategy::System, cancel) {
        Ok(paths) => paths,
        Err(e) => {
            debug!(error = %e, "system traversal unavailable, walking tree");
            discover(runner, &root, max_depth, Strategy::Walk, cancel).map_err(|_| not_found())?
        }
    };

    if found.is_empty() {
        return Err(not_found());
    }
    Ok(found)
}

/// Run a single traversal strategy. Both strategies return the same set for
/// the same tree.
pub fn discover(
    runner: &dyn ProcessRunner,
    root: &Path,
    max_depth: usize,
    strategy: Strategy,
    cancel: &CancelToken,
) -> Result<Vec<PathBuf>> {
    let mut paths = match strategy {
        Strategy::System => system_find(runner, root, max_depth, cancel)?,
        Strategy::Walk => walk(root, max_depth)?,
    };
    paths.sort_by(|a, b| {
        a.components()
            .count()
            .cmp(&b.components().count())
            .then_with(|| a.cmp(b))
    });
    paths.dedup();
    Ok(paths)
}

/// Resolve an explicitly requested build file relative to the repository root.
pub fn resolve_dockerfile(root: &Path, requested: &str) -> Result<PathBuf> {
    if requested.trim().is_empty() {
        bail!("Dockerfile path cannot be blank");
    }
    let requested = PathBuf::from(requested);
    let absolute = if requested.is_absolute() {
        requested
    } else {
        root.join(&requested)
    };
    if !absolute.is_file() {
        bail!("Dockerfile not found: {}", absolute.display());
    }
    let root = root
        .canonicalize()
        .with_context(|| format!("cannot access {}", root.display()))?;
    let absolute = absolute.canonicalize()?;
    if !absolute.starts_with(&root) {
        bail!("Dockerfile must be inside the repository: {}", absolute.display());
    }
    Ok(absolute)
}

fn is_dockerfile_name(name: &std::ffi::OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    bytes == DOCKERFILE.as_bytes() || bytes.starts_with(b"Dockerfile.")
}

fn walk(root: &Path, max_depth: usize) -> std::io::Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !should_skip(e));

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            // The root itself is unreadable; nothing below it can be found.
            Err(e) if e.depth() == 0 => return Err(e.into()),
            Err(_) => continue,
        };
        if entry.file_type().is_file() && is_dockerfile_name(entry.file_name()) {
            matches.push(entry.into_path());
        }
    }
    Ok(matches)
}

fn should_skip(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

fn system_find(
    runner: &dyn ProcessRunner,
    root: &Path,
    max_depth: usize,
    cancel: &CancelToken,
) -> Result<Vec<PathBuf>> {
    let Some(root_arg) = root.to_str() else {
        bail!("root is not valid UTF-8: {}", root.display());
    };
    let mut args: Vec<String> = vec![
        root_arg.to_string(),
        "-mindepth".into(),
        "1".into(),
        "-maxdepth".into(),
        max_depth.to_string(),
        "-type".into(),
        "d".into(),
        "(".into(),
    ];
    for (i, dir) in SKIPPED_DIRS.iter().enumerate() {
        if i > 0 {
            args.push("-o".into());
        }
        args.extend(["-name".into(), (*dir).into()]);
    }
    args.extend(
        [
            ")", "-prune", "-o", "-type", "f", "(", "-name", DOCKERFILE, "-o", "-name",
            "Dockerfile.*", ")", "-print0",
        ]
        .map(String::from),
    );

    let cmd = ProcessCommand::new("find", args, FIND_TIMEOUT);
    let out = runner.run(&cmd, cancel)?;
    if out.timed_out {
        bail!("find timed out after {}s", FIND_TIMEOUT.as_secs());
    }
    if out.cancelled {
        bail!("find was cancelled");
    }
    if out.truncated {
        bail!("find output exceeded the capture limit");
    }
    if !out.success() {
        bail!("find exited with {:?}: {}", out.exit_code, out.stderr.trim());
    }

    // The capture layer terminates the single NUL-separated record with '\n'.
    let raw = out.stdout.strip_suffix('\n').unwrap_or(&out.stdout);
    let paths: Vec<PathBuf> = raw
        .split('\0')
        .filter(|chunk| !chunk.is_empty())
        .map(PathBuf::from)
        .collect();
    // Names that were not valid UTF-8 come back lossy and no longer resolve.
    if let Some(bad) = paths.iter().find(|p| !p.is_file()) {
        bail!("find reported an unresolvable path: {}", bad.display());
    }
    Ok(paths)
}
