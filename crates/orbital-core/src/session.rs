// SPDX-License-Identifier: MIT

//! Session record and status state machine (spec.md §3, §4.9).

use crate::id::SessionId;
use crate::worktree::WorktreeInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Status values per spec.md §6.5 and the state machine in §4.9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Stopped,
    Merging,
    Merged,
    Interrupted,
    Conflict,
}

impl SessionStatus {
    /// Terminal-absorbing statuses per spec.md §3/§4.9: merged, failed,
    /// stopped, conflict are absorbing unless explicitly resumed (which only
    /// applies to interrupted/stopped); merged/failed/conflict never resume.
    pub fn is_absorbing(&self) -> bool {
        matches!(
            self,
            SessionStatus::Merged | SessionStatus::Failed | SessionStatus::Conflict
        )
    }

    /// `completed_at` must be set iff status is one of these (spec.md §3).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed
                | SessionStatus::Merged
                | SessionStatus::Failed
                | SessionStatus::Stopped
                | SessionStatus::Conflict
        )
    }

    /// Resume is only legal from these two statuses (spec.md §4.9, §4.10.4).
    pub fn is_resumable(&self) -> bool {
        matches!(self, SessionStatus::Interrupted | SessionStatus::Stopped)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Merging => "merging",
            SessionStatus::Merged => "merged",
            SessionStatus::Interrupted => "interrupted",
            SessionStatus::Conflict => "conflict",
        };
        write!(f, "{s}")
    }
}

/// Persisted configuration for a session (spec.md §3: "persisted config
/// (model, checker-model, workflow name, system prompt)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub model: String,
    pub checker_model: String,
    pub workflow_name: String,
    pub system_prompt: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            checker_model: "default".to_string(),
            workflow_name: "solo".to_string(),
            system_prompt: None,
        }
    }
}

/// Multi-step workflow progress (spec.md §3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    pub preset_name: String,
    pub steps: Vec<String>,
    pub current_step: usize,
    #[serde(default)]
    pub gate_retries: HashMap<String, u32>,
}

/// The unit of work orchestrated by Orbital (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub spec_files: Vec<PathBuf>,
    pub status: SessionStatus,
    pub working_directory: PathBuf,
    pub worktree: Option<WorktreeInfo>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub total_cost: f64,
    pub max_budget: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub agent_resume_id: Option<String>,
    pub chat_resume_id: Option<String>,
    pub error_message: Option<String>,
    pub workflow_state: Option<WorkflowState>,
    pub notes_path: Option<PathBuf>,
    pub context_files: Vec<PathBuf>,
    pub config: SessionConfig,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        spec_files: Vec<PathBuf>,
        working_directory: PathBuf,
        max_iterations: u32,
        max_budget: f64,
        config: SessionConfig,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            spec_files,
            status: SessionStatus::Running,
            working_directory,
            worktree: None,
            iteration: 0,
            max_iterations,
            total_cost: 0.0,
            max_budget,
            tokens_in: 0,
            tokens_out: 0,
            started_at,
            completed_at: None,
            agent_resume_id: None,
            chat_resume_id: None,
            error_message: None,
            workflow_state: None,
            notes_path: None,
            context_files: Vec::new(),
            config,
        }
    }

    /// Validate the invariants in spec.md §3. Used by tests and by the
    /// registry after every mutation in debug builds.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.iteration > self.max_iterations {
            return Err(format!(
                "iteration {} exceeds max_iterations {}",
                self.iteration, self.max_iterations
            ));
        }
        if self.total_cost < 0.0 {
            return Err("total_cost is negative".to_string());
        }
        if self.status.is_terminal() != self.completed_at.is_some() {
            return Err(format!(
                "completed_at ({:?}) inconsistent with terminal status {}",
                self.completed_at, self.status
            ));
        }
        if let Some(wt) = &self.worktree {
            if wt.path != self.working_directory {
                return Err("working_directory must equal worktree.path when present".to_string());
            }
        }
        Ok(())
    }

    pub fn mark_terminal(&mut self, status: SessionStatus, now: DateTime<Utc>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Session {
        Session::new(
            SessionId::new("0123456789abcdef"),
            vec![PathBuf::from("/spec.md")],
            PathBuf::from("/work"),
            5,
            10.0,
            SessionConfig::default(),
            Utc::now(),
        )
    }

    #[test]
    fn new_session_passes_invariants() {
        assert!(base().check_invariants().is_ok());
    }

    #[test]
    fn iteration_over_max_is_invalid() {
        let mut s = base();
        s.iteration = 6;
        assert!(s.check_invariants().is_err());
    }

    #[test]
    fn completed_at_must_match_terminal_status() {
        let mut s = base();
        s.status = SessionStatus::Completed;
        assert!(s.check_invariants().is_err());
        s.mark_terminal(SessionStatus::Completed, Utc::now());
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn worktree_path_must_match_working_directory() {
        let mut s = base();
        s.worktree = Some(WorktreeInfo::new(
            "brave-otter",
            PathBuf::from("/other"),
            "main",
        ));
        assert!(s.check_invariants().is_err());
        s.working_directory = PathBuf::from("/other");
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn absorbing_statuses_never_resume() {
        assert!(SessionStatus::Merged.is_absorbing());
        assert!(!SessionStatus::Completed.is_absorbing());
        assert!(SessionStatus::Interrupted.is_resumable());
        assert!(SessionStatus::Stopped.is_resumable());
        assert!(!SessionStatus::Merged.is_resumable());
    }
}
