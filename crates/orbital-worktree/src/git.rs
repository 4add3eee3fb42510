// SPDX-License-Identifier: MIT

//! Git subprocess operations for worktree lifecycle (spec.md §4.4).

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout applied to every git worktree/branch subprocess call.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GitError {
    #[error("not a git repository: {0}")]
    NotGitRepository(String),
    #[error("HEAD is detached; run `git checkout -b <branch>` first")]
    DetachedHead,
    #[error("git {op} failed: {stdout}{stderr}")]
    CommandFailed {
        op: String,
        stdout: String,
        stderr: String,
    },
    #[error("git {op} timed out after {0:?}", .1)]
    Timeout(String, Duration),
    #[error("I/O error running git: {0}")]
    Io(#[from] std::io::Error),
}

/// Thin wrapper over the `git` CLI for worktree and branch lifecycle.
#[derive(Debug, Clone, Default)]
pub struct GitOps;

impl GitOps {
    async fn run(&self, dir: &Path, args: &[&str], op: &str) -> Result<String, GitError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(dir).args(args);

        let output = tokio::time::timeout(GIT_TIMEOUT, cmd.output())
            .await
            .map_err(|_| GitError::Timeout(op.to_string(), GIT_TIMEOUT))??;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(GitError::CommandFailed {
                op: op.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    /// `git -C <dir> worktree add -b <branch> <path> HEAD`
    pub async fn worktree_add(&self, dir: &Path, branch: &str, path: &Path) -> Result<(), GitError> {
        self.ensure_repo_ready(dir).await?;
        let path_str = path.to_string_lossy().to_string();
        self.run(
            dir,
            &["worktree", "add", "-b", branch, &path_str, "HEAD"],
            "worktree add",
        )
        .await?;
        Ok(())
    }

    /// `git -C <dir> worktree remove <path> --force`
    pub async fn worktree_remove(&self, dir: &Path, path: &Path) -> Result<(), GitError> {
        let path_str = path.to_string_lossy().to_string();
        self.run(
            dir,
            &["worktree", "remove", &path_str, "--force"],
            "worktree remove",
        )
        .await?;
        Ok(())
    }

    /// Try `branch -d`, falling back to `-D`, combining diagnostics on failure.
    pub async fn delete_branch(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        match self.run(dir, &["branch", "-d", branch], "branch -d").await {
            Ok(_) => Ok(()),
            Err(soft_err) => match self.run(dir, &["branch", "-D", branch], "branch -D").await {
                Ok(_) => Ok(()),
                Err(hard_err) => Err(GitError::CommandFailed {
                    op: "branch delete".to_string(),
                    stdout: String::new(),
                    stderr: format!("soft delete: {soft_err}; force delete: {hard_err}"),
                }),
            },
        }
    }

    /// Confirm `dir` is inside a git repository and HEAD is not detached,
    /// surfacing the two named failure conditions from spec.md §4.4.
    async fn ensure_repo_ready(&self, dir: &Path) -> Result<(), GitError> {
        let branch_out = self
            .run(dir, &["rev-parse", "--abbrev-ref", "HEAD"], "rev-parse")
            .await
            .map_err(|_| GitError::NotGitRepository(dir.display().to_string()))?;

        if branch_out.trim() == "HEAD" {
            return Err(GitError::DetachedHead);
        }
        Ok(())
    }

    /// Current branch name, for recording `original_branch` (spec.md §4.10.1).
    pub async fn current_branch(&self, dir: &Path) -> Result<String, GitError> {
        let out = self
            .run(dir, &["rev-parse", "--abbrev-ref", "HEAD"], "rev-parse")
            .await
            .map_err(|_| GitError::NotGitRepository(dir.display().to_string()))?;
        Ok(out.trim().to_string())
    }

    /// `git -C <worktree_dir> rebase <onto_branch>` (spec.md §4.10.5 merge sub-flow).
    pub async fn rebase_onto(&self, worktree_dir: &Path, onto_branch: &str) -> Result<(), GitError> {
        self.run(worktree_dir, &["rebase", onto_branch], "rebase").await?;
        Ok(())
    }

    /// Abort an in-progress rebase; best-effort cleanup after a failed rebase.
    pub async fn rebase_abort(&self, worktree_dir: &Path) {
        if let Err(e) = self.run(worktree_dir, &["rebase", "--abort"], "rebase --abort").await {
            tracing::warn!(error = %e, "rebase --abort failed (may not have been mid-rebase)");
        }
    }

    /// `git -C <dir> merge --ff-only <branch>` (spec.md §4.10.5 merge sub-flow).
    pub async fn merge_ff_only(&self, dir: &Path, branch: &str) -> Result<(), GitError> {
        self.run(dir, &["merge", "--ff-only", branch], "merge --ff-only").await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "git_tests.rs"]
mod tests;
