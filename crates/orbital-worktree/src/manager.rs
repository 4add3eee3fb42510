// SPDX-License-Identifier: MIT

//! Worktree lifecycle manager: create/remove isolated working directories
//! with branch naming and validation (spec.md §4.4, §6.3).

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use orbital_core::WorktreeInfo;
use orbital_storage::state::{validate_worktree, WorktreeRecord, WorktreeStateStore};

use crate::git::{GitError, GitOps};
use crate::names::generate_unique_name;
use crate::validate::{validate_branch_name, validate_worktree_name};

#[derive(Debug, Error)]
pub enum WorktreeManagerError {
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("state error: {0}")]
    State(#[from] orbital_storage::StateError),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("could not generate a unique worktree name")]
    NameExhausted,
    #[error("worktree validation failed: {0}")]
    Invalid(String),
}

/// Creates and removes git worktrees under `<project>/.orbital/worktrees/`
/// and persists their records via [`WorktreeStateStore`].
pub struct WorktreeManager {
    project_root: PathBuf,
    git: GitOps,
    store: WorktreeStateStore,
}

impl WorktreeManager {
    pub fn new(project_root: PathBuf) -> Self {
        let state_path = project_root.join(".orbital/worktree-state.json");
        let store = WorktreeStateStore::new(state_path, project_root.clone());
        Self {
            project_root,
            git: GitOps::default(),
            store,
        }
    }

    fn worktrees_dir(&self) -> PathBuf {
        self.project_root.join(".orbital/worktrees")
    }

    /// Create an isolated worktree. If `name` is `None`, a unique name is
    /// generated from the adjective/animal lists.
    pub async fn create(
        &self,
        name: Option<String>,
        spec_files: Vec<String>,
        session_id: Option<String>,
    ) -> Result<WorktreeInfo, WorktreeManagerError> {
        let existing: HashSet<String> = self
            .store
            .list()?
            .into_iter()
            .map(|r| r.name)
            .filter(|n| !n.is_empty())
            .collect();

        let name = match name {
            Some(n) => {
                validate_worktree_name(&n).map_err(WorktreeManagerError::InvalidName)?;
                n
            }
            None => generate_unique_name(&existing).ok_or(WorktreeManagerError::NameExhausted)?,
        };

        let branch = format!("orbital/{name}");
        validate_branch_name(&branch).map_err(WorktreeManagerError::InvalidName)?;

        let original_branch = self.git.current_branch(&self.project_root).await?;
        let path = self.worktrees_dir().join(&name);

        self.git.worktree_add(&self.project_root, &branch, &path).await?;
        validate_worktree(&path).map_err(WorktreeManagerError::Invalid)?;

        let mut record = WorktreeRecord::new(path.clone(), branch.clone(), original_branch.clone());
        record.name = name.clone();
        record.spec_files = spec_files;
        record.session_id = session_id;
        self.store.add(record)?;

        Ok(WorktreeInfo::new(name, path, original_branch))
    }

    /// Remove a worktree: `git worktree remove --force` then best-effort
    /// branch deletion, and drop its state record.
    pub async fn remove(&self, info: &WorktreeInfo) -> Result<(), WorktreeManagerError> {
        self.git.worktree_remove(&self.project_root, &info.path).await?;
        // Branch deletion is best-effort: an operator may want to inspect a
        // failed merge's branch, so a failure here doesn't fail removal.
        if let Err(e) = self.git.delete_branch(&self.project_root, &info.branch).await {
            tracing::warn!(branch = %info.branch, error = %e, "failed to delete branch after worktree removal");
        }
        self.store.remove(&info.path)?;
        Ok(())
    }

    pub fn state(&self) -> &WorktreeStateStore {
        &self.store
    }

    pub fn git(&self) -> &GitOps {
        &self.git
    }

    pub fn worktree_path(&self, name: &str) -> PathBuf {
        self.worktrees_dir().join(name)
    }
}

/// Resolve a project's `.orbital` directory, creating it if necessary.
pub fn ensure_orbital_dir(project_root: &Path) -> std::io::Result<PathBuf> {
    let dir = project_root.join(".orbital");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
