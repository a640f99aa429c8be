//! Pushing folder content into freshly created code repositories.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context;
use async_trait::async_trait;

use crate::types::UserIdentity;

/// Default branch of created code repositories.
pub const DEFAULT_BRANCH: &str = "master";

#[async_trait]
pub trait RepositoryPopulator: Send + Sync {
    /// Push the content of `folder` to the repository at `endpoint`.
    async fn populate(
        &self,
        endpoint: &str,
        folder: &Path,
        user: Option<&UserIdentity>,
    ) -> anyhow::Result<()>;

    /// Whether `folder` already is the root of a git repository.
    fn is_versioned(&self, folder: &Path) -> bool;
}

/// Populates repositories with the `git` executable.
#[derive(Debug, Clone, Default)]
pub struct GitPopulator;

impl GitPopulator {
    fn git(args: &[&str], cwd: &Path) -> anyhow::Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output()
            .with_context(|| format!("Failed to run git {:?}", args))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Git command failed {:?}: {}", args, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn push_folder(endpoint: &str, folder: &Path, user: Option<&UserIdentity>) -> anyhow::Result<()> {
        if !folder.join(".git").exists() {
            Self::git(&["init", "--quiet"], folder)?;
        }
        Self::git(&["checkout", "-B", DEFAULT_BRANCH], folder)?;

        let (name, email) = match user {
            Some(user) => (user.name.clone(), user.email.clone()),
            None => ("hoist".to_string(), "hoist@localhost".to_string()),
        };
        Self::git(&["config", "user.name", &name], folder)?;
        Self::git(&["config", "user.email", &email], folder)?;

        Self::git(&["add", "--all"], folder)?;
        let status = Self::git(&["status", "--porcelain"], folder)?;
        if !status.is_empty() {
            Self::git(
                &["commit", "--quiet", "-m", "Initial commit from hoist"],
                folder,
            )?;
        }

        let remotes = Self::git(&["remote"], folder)?;
        if remotes.lines().any(|r| r == "origin") {
            Self::git(&["remote", "set-url", "origin", endpoint], folder)?;
        } else {
            Self::git(&["remote", "add", "origin", endpoint], folder)?;
        }
        Self::git(
            &["push", "--quiet", "-u", "origin", &format!("HEAD:{DEFAULT_BRANCH}")],
            folder,
        )?;
        Ok(())
    }
}

#[async_trait]
impl RepositoryPopulator for GitPopulator {
    async fn populate(
        &self,
        endpoint: &str,
        folder: &Path,
        user: Option<&UserIdentity>,
    ) -> anyhow::Result<()> {
        let endpoint = endpoint.to_string();
        let folder: PathBuf = folder.to_path_buf();
        let user = user.cloned();
        tokio::task::spawn_blocking(move || Self::push_folder(&endpoint, &folder, user.as_ref()))
            .await
            .context("Repository population task failed")?
    }

    fn is_versioned(&self, folder: &Path) -> bool {
        git2::Repository::open(folder).is_ok()
    }
}
