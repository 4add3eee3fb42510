// SPDX-License-Identifier: MIT

//! Worktree state file: load/save with backup recovery and atomic writes
//! (spec.md §4.3, §6.2, §8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::lock::{LockError, StateLock};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("state file and backup are both corrupted: {0}")]
    Corrupted(String),
    #[error("worktree path must be absolute: {0}")]
    NotAbsolute(PathBuf),
}

/// A single persisted worktree record (spec.md §6.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeRecord {
    /// Empty for pre-migration records (spec.md §3 invariant).
    #[serde(default)]
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    #[serde(rename = "originalBranch")]
    pub original_branch: String,
    #[serde(rename = "specFiles", default)]
    pub spec_files: Vec<String>,
    #[serde(rename = "sessionId", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl WorktreeRecord {
    /// Build a record defaulting `created_at` to now (spec.md §4.3 Add:
    /// "default `created_at = now()`").
    pub fn new(path: PathBuf, branch: String, original_branch: String) -> Self {
        Self {
            name: String::new(),
            path,
            branch,
            original_branch,
            spec_files: Vec::new(),
            session_id: None,
            created_at: Utc::now(),
        }
    }
}

/// The on-disk schema: `{ "worktrees": [...] }` (spec.md §6.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorktreeStateFile {
    #[serde(default)]
    pub worktrees: Vec<WorktreeRecord>,
}

/// Locked, atomic, backup-recoverable store for [`WorktreeStateFile`].
pub struct WorktreeStateStore {
    state_path: PathBuf,
    working_dir: PathBuf,
}

impl WorktreeStateStore {
    /// `state_path` is typically `<project>/.orbital/worktree-state.json`;
    /// `working_dir` is used to resolve relative paths found while migrating
    /// older records.
    pub fn new(state_path: PathBuf, working_dir: PathBuf) -> Self {
        Self {
            state_path,
            working_dir,
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.state_path.with_extension(
            self.state_path
                .extension()
                .map(|e| format!("{}.bak", e.to_string_lossy()))
                .unwrap_or_else(|| "bak".to_string()),
        )
    }

    /// Load the state file. Absent file yields an empty state. Relative
    /// paths from pre-migration records are joined against `working_dir`.
    /// On JSON corruption, falls back to the `.bak` sibling and restores it
    /// as the canonical state.
    pub fn load(&self) -> Result<WorktreeStateFile, StateError> {
        if !self.state_path.exists() {
            return Ok(WorktreeStateFile::default());
        }

        let raw = std::fs::read_to_string(&self.state_path)?;
        match serde_json::from_str::<WorktreeStateFile>(&raw) {
            Ok(mut state) => {
                self.migrate_paths(&mut state);
                Ok(state)
            }
            Err(primary_err) => self.recover_from_backup(primary_err),
        }
    }

    fn recover_from_backup(&self, primary_err: serde_json::Error) -> Result<WorktreeStateFile, StateError> {
        tracing::warn!(error = %primary_err, path = %self.state_path.display(), "state file corrupted, attempting backup recovery");
        let backup = self.backup_path();
        let raw = std::fs::read_to_string(&backup).map_err(|_| {
            StateError::Corrupted(format!(
                "primary parse error: {primary_err}; backup unreadable"
            ))
        })?;
        let mut state: WorktreeStateFile = serde_json::from_str(&raw).map_err(|backup_err| {
            StateError::Corrupted(format!(
                "primary parse error: {primary_err}; backup parse error: {backup_err}"
            ))
        })?;
        self.migrate_paths(&mut state);

        // Restore the backup as canonical so the corrupted primary never
        // lingers and a subsequent Save leaves a consistent pair.
        self.write_atomic(&state)?;
        Ok(state)
    }

    fn migrate_paths(&self, state: &mut WorktreeStateFile) {
        for record in &mut state.worktrees {
            if record.path.is_relative() {
                record.path = self.working_dir.join(&record.path);
            }
        }
    }

    /// Save the state file under the lock, backing up the previous good
    /// snapshot first, then writing atomically (spec.md §4.3, §8).
    pub fn save(&self, state: &WorktreeStateFile) -> Result<(), StateError> {
        let _lock = StateLock::acquire(&self.state_path)?;
        self.backup_current();
        self.write_atomic(state)
    }

    fn backup_current(&self) {
        if self.state_path.exists() {
            // Best-effort: a failed backup must never block the save.
            if let Err(e) = std::fs::copy(&self.state_path, self.backup_path()) {
                tracing::warn!(error = %e, "failed to back up state file before save");
            }
        }
    }

    /// Ensure directory exists, write to a temp file in the same directory,
    /// fsync, then rename over the canonical path (atomic on the same
    /// filesystem).
    fn write_atomic(&self, state: &WorktreeStateFile) -> Result<(), StateError> {
        let dir = self
            .state_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&dir)?;

        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.state_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "worktree-state.json".to_string())
        ));

        let json = serde_json::to_vec_pretty(state)?;
        {
            let mut f = File::create(&tmp_path)?;
            f.write_all(&json)?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.state_path)?;
        Ok(())
    }

    // --- operations ---

    pub fn add(&self, record: WorktreeRecord) -> Result<(), StateError> {
        if record.path.is_relative() {
            return Err(StateError::NotAbsolute(record.path));
        }
        let mut state = self.load()?;
        state.worktrees.push(record);
        self.save(&state)
    }

    pub fn remove(&self, path: &Path) -> Result<(), StateError> {
        let mut state = self.load()?;
        state.worktrees.retain(|r| r.path != path);
        self.save(&state)
    }

    pub fn list(&self) -> Result<Vec<WorktreeRecord>, StateError> {
        Ok(self.load()?.worktrees)
    }

    pub fn find_by_path(&self, path: &Path) -> Result<Option<WorktreeRecord>, StateError> {
        Ok(self.load()?.worktrees.into_iter().find(|r| r.path == path))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Option<WorktreeRecord>, StateError> {
        Ok(self
            .load()?
            .worktrees
            .into_iter()
            .find(|r| r.name == name))
    }

    pub fn find_by_spec_file(&self, needle: &str) -> Result<Vec<WorktreeRecord>, StateError> {
        Ok(self
            .load()?
            .worktrees
            .into_iter()
            .filter(|r| r.spec_files.iter().any(|f| f.contains(needle)))
            .collect())
    }

    pub fn update_session_id(&self, path: &Path, session_id: Option<String>) -> Result<(), StateError> {
        let mut state = self.load()?;
        if let Some(record) = state.worktrees.iter_mut().find(|r| r.path == path) {
            record.session_id = session_id;
        }
        self.save(&state)
    }
}

/// Checks that a path is a usable worktree, not a full repository clone
/// (spec.md §4.3 `ValidateWorktree`).
pub fn validate_worktree(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Err(format!("worktree path does not exist: {}", path.display()));
    }
    if !path.is_dir() {
        return Err(format!("worktree path is not a directory: {}", path.display()));
    }
    let git_entry = path.join(".git");
    if !git_entry.exists() {
        return Err(format!("no .git entry at {}", path.display()));
    }
    if git_entry.is_dir() {
        return Err(format!(
            "{} is a full repository (.git is a directory), not a worktree",
            path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
