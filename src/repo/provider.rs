use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use crate::docker::{CancelToken, ProcessCommand, ProcessRunner};

/// Makes a repository available on local disk.
pub trait RepositoryProvider: Send + Sync {
    /// Return the checked-out path for `repository`. Calling this again for
    /// the same repository refreshes the existing checkout.
    fn checkout(&self, repository: &str) -> Result<PathBuf>;
}

/// Treats the repository identifier as a path that already exists locally.
#[derive(Debug, Clone, Default)]
pub struct LocalProvider;

impl RepositoryProvider for LocalProvider {
    fn checkout(&self, repository: &str) -> Result<PathBuf> {
        let path = Path::new(repository);
        let path = path
            .canonicalize()
            .with_context(|| format!("repository path not accessible: {repository}"))?;
        if !path.is_dir() {
            bail!("repository path is not a directory: {}", path.display());
        }
        Ok(path)
    }
}

/// Clones repositories into a workspace directory, or fast-forwards an
/// existing clone.
pub struct GitProvider {
    workspace: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    git_bin: String,
    timeout: Duration,
}

impl GitProvider {
    pub fn new(workspace: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            workspace: workspace.into(),
            runner,
            git_bin: "git".to_string(),
            timeout: Duration::from_secs(600),
        }
    }

    /// Local directory a repository is checked out into.
    pub fn checkout_dir(&self, repository: &str) -> PathBuf {
        self.workspace.join(checkout_dir_name(repository))
    }

    fn git(&self, args: Vec<String>, dir: &Path) -> Result<()> {
        let cmd = ProcessCommand::new(self.git_bin.clone(), args, self.timeout).current_dir(dir);
        let out = self.runner.run(&cmd, &CancelToken::new())?;
        if !out.success() {
            bail!(
                "`{}` failed (exit {:?}, timed out: {}):\n{}",
                cmd.display(),
                out.exit_code,
                out.timed_out,
                out.log
            );
        }
        Ok(())
    }
}

impl RepositoryProvider for GitProvider {
    fn checkout(&self, repository: &str) -> Result<PathBuf> {
        let dir = self.checkout_dir(repository);
        if dir.join(".git").exists() {
            info!(repository, path = %dir.display(), "pulling existing checkout");
            self.git(vec!["pull".into(), "--ff-only".into()], &dir)?;
        } else {
            std::fs::create_dir_all(&self.workspace).with_context(|| {
                format!("failed to create workspace {}", self.workspace.display())
            })?;
            let url = clone_url(repository);
            info!(repository, url = %url, path = %dir.display(), "cloning");
            self.git(
                vec!["clone".into(), url, dir.to_string_lossy().to_string()],
                &self.workspace,
            )?;
        }
        Ok(dir)
    }
}

/// `owner/name` shorthand expands to a GitHub HTTPS URL; anything else is
/// passed to git verbatim.
pub fn clone_url(repository: &str) -> String {
    let is_shorthand = !repository.contains("://")
        && !repository.contains('@')
        && repository.split('/').count() == 2
        && !repository.starts_with('.')
        && !repository.starts_with('/');
    if is_shorthand {
        format!("https://github.com/{}.git", repository.trim_end_matches(".git"))
    } else {
        repository.to_string()
    }
}

/// Stable, filesystem-safe directory name such as `owner__name`.
pub fn checkout_dir_name(repository: &str) -> String {
    let trimmed = repository
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit(['/', ':'])
        .take(2)
        .collect::<Vec<_>>();
    let joined = trimmed.into_iter().rev().collect::<Vec<_>>().join("__");
    let name: String = joined
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if name.is_empty() {
        "repository".to_string()
    } else {
        name
    }
}
