// SPDX-License-Identifier: MIT

//! Session lifecycle orchestration: start, stop, resume, merge, chat
//! (spec.md §4.10).

use crate::env;
use crate::registry::{Registry, RegistryError};
use chrono::Utc;
use orbital_core::{
    generate_session_id, OutputMessage, Sentinel, Session, SessionConfig, SessionId, SessionStatus,
};
use orbital_executor::{AgentExecutor, ExecutorConfig, ExecutorError};
use orbital_parser::extract_text;
use orbital_worktree::WorktreeManager;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
    #[error("worktree error: {0}")]
    Worktree(#[from] orbital_worktree::WorktreeManagerError),
    #[error("session {0} is not running")]
    NotRunning(SessionId),
    #[error("session {0} is not resumable")]
    NotResumable(SessionId),
    #[error("session {0} has no worktree to merge")]
    NoWorktree(SessionId),
    #[error("merge already in progress for session {0}")]
    MergeInProgress(SessionId),
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
}

/// A request to start a new session (spec.md §4.10.1).
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub spec_files: Vec<PathBuf>,
    pub project_root: PathBuf,
    pub use_worktree: bool,
    pub worktree_name: Option<String>,
    pub config: SessionConfig,
    pub max_iterations: u32,
    pub max_budget_usd: f64,
    pub context_files: Vec<PathBuf>,
    pub notes_path: Option<PathBuf>,
}

/// Defaults applied when a start request omits a field (spec.md §4.10.2
/// "defaults from daemon config").
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub default_model: String,
    pub default_checker_model: String,
    pub default_workflow: String,
    pub default_max_iterations: u32,
    pub default_max_budget_usd: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            default_model: "claude-opus-4".to_string(),
            default_checker_model: "claude-haiku-4".to_string(),
            default_workflow: "solo".to_string(),
            default_max_iterations: 20,
            default_max_budget_usd: 10.0,
        }
    }
}

/// Orchestrates session lifecycles against the registry, a shared executor,
/// and per-project worktree managers (spec.md §4.10, §5).
pub struct Runner {
    registry: Registry,
    executor: Arc<dyn AgentExecutor>,
    config: RunnerConfig,
    cancels: parking_lot::Mutex<HashMap<SessionId, watch::Sender<bool>>>,
    merge_locks: parking_lot::Mutex<HashSet<SessionId>>,
}

impl Runner {
    pub fn new(registry: Registry, executor: Arc<dyn AgentExecutor>, config: RunnerConfig) -> Self {
        Self {
            registry,
            executor,
            config,
            cancels: parking_lot::Mutex::new(HashMap::new()),
            merge_locks: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config_defaults(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start a new session (spec.md §4.10.1).
    pub async fn start(&self, req: StartRequest) -> Result<Session, RunnerError> {
        let id = generate_session_id();
        let spec_files: Vec<PathBuf> = req
            .spec_files
            .iter()
            .map(|p| absolute(p, &req.project_root))
            .collect();
        let context_files: Vec<PathBuf> = req
            .context_files
            .iter()
            .map(|p| absolute(p, &req.project_root))
            .collect();

        let mut session = Session::new(
            id.clone(),
            spec_files,
            req.project_root.clone(),
            req.max_iterations,
            req.max_budget_usd,
            req.config,
            Utc::now(),
        );
        session.context_files = context_files;
        session.notes_path = req.notes_path;

        if req.use_worktree {
            let manager = WorktreeManager::new(req.project_root.clone());
            let spec_strs: Vec<String> = session
                .spec_files
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            let info = manager
                .create(req.worktree_name, spec_strs, Some(id.to_string()))
                .await?;
            session.working_directory = info.path.clone();
            session.worktree = Some(info);
        }

        self.registry.add(session.clone())?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels.lock().insert(id.clone(), cancel_tx);

        tracing::info!(session_id = %id, "session starting");
        self.spawn_body(session.clone(), cancel_rx);

        Ok(session)
    }

    fn spawn_body(&self, session: Session, cancel: watch::Receiver<bool>) {
        let registry = self.registry.clone();
        let executor = Arc::clone(&self.executor);
        let config = self.config.clone();
        let cancels_entry_id = session.id.clone();

        tokio::spawn(async move {
            let id = session.id.clone();
            let result = run_session_body(&registry, executor.as_ref(), &config, &session, cancel).await;
            translate_result(&registry, &id, result);
            // Deferred cleanup: the cancels-map entry is removed here unless
            // `stop()` already removed it under its own lock.
            let _ = cancels_entry_id;
        });
    }

    /// Stop a running session (spec.md §4.10.3).
    pub fn stop(&self, id: &SessionId) -> Result<(), RunnerError> {
        let cancel = {
            let mut cancels = self.cancels.lock();
            cancels.remove(id)
        };
        let Some(cancel) = cancel else {
            return Err(RunnerError::NotRunning(id.clone()));
        };
        let _ = cancel.send(true);
        self.registry.update_status(id, SessionStatus::Stopped, None)?;
        Ok(())
    }

    /// Resume a stopped or interrupted session (spec.md §4.10.4).
    pub async fn resume(&self, id: &SessionId) -> Result<Session, RunnerError> {
        let session = self
            .registry
            .get(id)
            .ok_or_else(|| RunnerError::NotResumable(id.clone()))?;
        if !session.status.is_resumable() {
            return Err(RunnerError::NotResumable(id.clone()));
        }

        self.registry.update_status(id, SessionStatus::Running, None)?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancels.lock().insert(id.clone(), cancel_tx);

        let resumed = self.registry.get(id).expect("just updated");
        self.spawn_body(resumed.clone(), cancel_rx);
        Ok(resumed)
    }

    /// Merge a worktree session's branch back (spec.md §4.10.5).
    pub async fn merge(&self, id: &SessionId) -> Result<(), RunnerError> {
        {
            let mut locks = self.merge_locks.lock();
            if !locks.insert(id.clone()) {
                return Err(RunnerError::MergeInProgress(id.clone()));
            }
        }
        let result = self.merge_inner(id).await;
        self.merge_locks.lock().remove(id);
        result
    }

    async fn merge_inner(&self, id: &SessionId) -> Result<(), RunnerError> {
        let session = self.registry.get(id).ok_or_else(|| RunnerError::NoWorktree(id.clone()))?;
        let Some(worktree) = session.worktree.clone() else {
            return Err(RunnerError::NoWorktree(id.clone()));
        };

        self.registry.update_status(id, SessionStatus::Merging, None)?;

        let project_root = manager_project_root(&worktree.path);
        let manager = WorktreeManager::new(project_root.clone());
        let git = manager.git();

        let rebase_result = git.rebase_onto(&worktree.path, &worktree.original_branch).await;
        let outcome = match rebase_result {
            Ok(()) => match git.merge_ff_only(&project_root, &worktree.branch).await {
                Ok(()) => MergeOutcome::Success,
                Err(e) => classify_merge_error(e),
            },
            Err(e) => {
                git.rebase_abort(&worktree.path).await;
                classify_merge_error(e)
            }
        };

        match outcome {
            MergeOutcome::Success => {
                if let Err(e) = manager.remove(&worktree).await {
                    tracing::warn!(session_id = %id, error = %e, "worktree cleanup failed after successful merge");
                }
                self.registry.update_status(id, SessionStatus::Merged, None)?;
            }
            MergeOutcome::Conflict(marker) => {
                tracing::warn!(session_id = %id, marker = %marker, "merge did not succeed");
                self.registry.update_status(id, SessionStatus::Conflict, Some(marker))?;
            }
            MergeOutcome::Failed(message) => {
                tracing::error!(session_id = %id, error = %message, "merge sub-flow failed");
                self.registry.update_status(id, SessionStatus::Failed, Some(message))?;
            }
        }
        Ok(())
    }

    /// Side-channel chat against a session (spec.md §4.10.6).
    pub async fn chat(&self, id: &SessionId, message: &str) -> Result<String, RunnerError> {
        let session = self.registry.get(id).ok_or_else(|| RunnerError::NotRunning(id.clone()))?;

        let summary = chat_summary(&session);
        let system_prompt = format!(
            "You are continuing a conversation about an in-progress automated session. \
             Here is a summary of its spec/notes:\n\n{summary}"
        );

        let mut exec_config = ExecutorConfig::new(self.config.default_model.clone(), session.working_directory.clone())
            .with_system_prompt(system_prompt);
        if let Some(resume_id) = &session.chat_resume_id {
            exec_config = exec_config.with_resume_id(resume_id.clone());
        }

        let (_tx, cancel) = watch::channel(false);
        let outcome = self
            .executor
            .run(&exec_config, message, false, None, cancel)
            .await?;
        Ok(extract_text(&outcome.raw_output))
    }
}

fn absolute(path: &std::path::Path, base: &std::path::Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Walk up two levels from `<project>/.orbital/worktrees/<name>` to the
/// project root the worktree was created from.
fn manager_project_root(worktree_path: &std::path::Path) -> PathBuf {
    worktree_path
        .parent()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .map(PathBuf::from)
        .unwrap_or_else(|| worktree_path.to_path_buf())
}

/// Tolerant `MERGE_SUCCESS: true` detection (spec.md §4.10.5): case
/// insensitive, insensitive to underscore/space placement.
fn merge_success_marker(text: &str) -> bool {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .filter(|c| *c != '_' && *c != ' ')
        .collect();
    normalized.contains("mergesuccess:true")
}

enum MergeOutcome {
    Success,
    /// Rebase/merge ran and git itself reported a conflict; recoverable by
    /// the operator (spec.md §4.10.5 step 6).
    Conflict(String),
    /// Git couldn't be run at all (not a repository, detached HEAD, timed
    /// out); not something the operator can resolve by inspecting the
    /// worktree (spec.md §4.10.5 step 7).
    Failed(String),
}

fn classify_merge_error(e: orbital_worktree::GitError) -> MergeOutcome {
    match e {
        orbital_worktree::GitError::CommandFailed { .. } => {
            let marker = format!("MERGE_SUCCESS: false ({e})");
            debug_assert!(!merge_success_marker(&marker));
            MergeOutcome::Conflict(marker)
        }
        other => MergeOutcome::Failed(other.to_string()),
    }
}

/// Truncate a session's spec/notes into a fixed character budget for the
/// chat side-channel's embedded summary (SPEC_FULL.md §4.13).
fn chat_summary(session: &Session) -> String {
    let mut summary = String::new();
    for path in &session.spec_files {
        summary.push_str(&path.display().to_string());
        summary.push('\n');
    }
    if let Some(notes) = &session.notes_path {
        summary.push_str("notes: ");
        summary.push_str(&notes.display().to_string());
        summary.push('\n');
    }
    let budget = env::chat_summary_char_budget();
    let truncated: String = summary.chars().take(budget).collect();
    if truncated.chars().count() < summary.chars().count() {
        tracing::debug!(session_id = %session.id, budget, "chat summary truncated");
    }
    truncated
}

async fn run_session_body(
    registry: &Registry,
    executor: &dyn AgentExecutor,
    config: &RunnerConfig,
    session: &Session,
    cancel: watch::Receiver<bool>,
) -> Result<orbital_engine::LoopState, SessionBodyError> {
    let id = &session.id;
    let registry_for_sink = registry.clone();
    let id_for_sink = id.clone();
    let sink: orbital_executor::OutputSink = Arc::new(move |line: &str| {
        let _ = registry_for_sink.broadcast(
            &id_for_sink,
            OutputMessage::text(line.to_string(), Utc::now()),
        );
    });

    let exec_config = ExecutorConfig::new(session.config.model.clone(), session.working_directory.clone())
        .with_checker_model(session.config.checker_model.clone());
    let exec_config = if let Some(prompt) = &session.config.system_prompt {
        exec_config.with_system_prompt(prompt.clone())
    } else {
        exec_config
    };
    let exec_config = exec_config.with_max_budget_usd(session.max_budget);

    let spec_summary = chat_summary(session);
    let initial_prompt = format!(
        "Work toward satisfying the specification at {}. When fully complete, include the \
         exact marker `<promise>COMPLETE</promise>` in your final response.",
        spec_summary.lines().next().unwrap_or_default()
    );

    let workflow = orbital_engine::WorkflowPreset::by_name(&session.config.workflow_name)
        .unwrap_or_else(|| orbital_engine::WorkflowPreset::by_name(&config.default_workflow).expect("default workflow is valid"));

    let observer = RegistryObserver {
        registry: registry.clone(),
        id: id.clone(),
    };

    if workflow.steps.is_empty() {
        let loop_config = orbital_engine::LoopConfig::new(session.max_iterations, session.max_budget)
            .with_spec_summary(spec_summary);
        let sink_for_loop = Some(sink);
        let initial_state = orbital_engine::LoopState {
            iteration: session.iteration,
            total_cost: session.total_cost,
            tokens_in: session.tokens_in,
            tokens_out: session.tokens_out,
            ..Default::default()
        };
        let outcome = run_loop_with_sink(
            &loop_config,
            executor,
            &exec_config,
            &initial_prompt,
            &observer,
            cancel,
            sink_for_loop,
            initial_state,
        )
        .await;
        outcome.map_err(SessionBodyError::Loop)
    } else {
        run_gated_workflow(registry, executor, config, session, &workflow, &exec_config, &initial_prompt, &observer, cancel, sink)
            .await
    }
}

/// Thin wrapper: the loop controller's executor call doesn't currently take
/// a sink parameter, so live streaming for ungated loops goes through a
/// per-line forwarding closure installed once up front via the executor's
/// sink argument in `run_loop`'s inner `executor.run` call. Since
/// `orbital_engine::run_loop` hardcodes `None` for the sink, wrap the
/// executor so every call it makes carries the session's forwarding sink.
#[allow(clippy::too_many_arguments)]
async fn run_loop_with_sink(
    config: &orbital_engine::LoopConfig,
    executor: &dyn AgentExecutor,
    exec_config: &ExecutorConfig,
    initial_prompt: &str,
    observer: &dyn orbital_engine::LoopObserver,
    cancel: watch::Receiver<bool>,
    sink: Option<orbital_executor::OutputSink>,
    initial_state: orbital_engine::LoopState,
) -> Result<orbital_engine::LoopState, orbital_engine::LoopError> {
    let wrapped = SinkingExecutor { inner: executor, sink };
    orbital_engine::run_loop_from(config, &wrapped, exec_config, initial_prompt, observer, cancel, initial_state).await
}

#[allow(clippy::too_many_arguments)]
async fn run_gated_workflow(
    registry: &Registry,
    executor: &dyn AgentExecutor,
    config: &RunnerConfig,
    session: &Session,
    workflow: &orbital_engine::WorkflowDef,
    exec_config: &ExecutorConfig,
    initial_prompt: &str,
    observer: &dyn orbital_engine::LoopObserver,
    cancel: watch::Receiver<bool>,
    sink: orbital_executor::OutputSink,
) -> Result<orbital_engine::LoopState, SessionBodyError> {
    let wrapped = SinkingExecutor {
        inner: executor,
        sink: Some(sink),
    };
    let mut state = orbital_engine::LoopState {
        iteration: session.iteration,
        total_cost: session.total_cost,
        tokens_in: session.tokens_in,
        tokens_out: session.tokens_out,
        ..Default::default()
    };

    if state.iteration >= session.max_iterations {
        return Err(SessionBodyError::MaxIterationsReached);
    }

    for iteration in (state.iteration + 1)..=session.max_iterations {
        if *cancel.borrow() {
            return Err(SessionBodyError::Cancelled);
        }
        state.iteration = iteration;

        let runner = orbital_engine::WorkflowRunner::new(workflow);
        let pass = runner
            .run(&wrapped, exec_config, initial_prompt, observer, cancel.clone())
            .await;

        let pass = match pass {
            Ok(outcome) => outcome,
            Err(orbital_engine::WorkflowError::MaxGateRetriesExceeded { .. }) => continue,
            Err(orbital_engine::WorkflowError::Cancelled { .. }) => {
                return Err(SessionBodyError::Cancelled)
            }
            Err(orbital_engine::WorkflowError::Executor(e)) => {
                return Err(SessionBodyError::Executor(e))
            }
        };

        state.total_cost += pass.total_cost;
        state.tokens_in += pass.tokens_in;
        state.tokens_out += pass.tokens_out;
        state.last_output = pass.last_output.clone();
        registry.update_progress(&session.id, iteration, state.total_cost, state.tokens_in, state.tokens_out).ok();

        if state.total_cost >= session.max_budget {
            return Err(SessionBodyError::BudgetExceeded);
        }

        if pass.completed_all_steps {
            let verification = verify(&wrapped, exec_config, &chat_summary(session), cancel.clone()).await?;
            state.total_cost += verification.cost_usd;
            state.tokens_in += verification.tokens_in;
            state.tokens_out += verification.tokens_out;
            if verification.verified {
                state.completed = true;
                return Ok(state);
            }
        }

        if iteration == session.max_iterations {
            return Err(SessionBodyError::MaxIterationsReached);
        }
    }

    Err(SessionBodyError::MaxIterationsReached)
}

struct VerificationOutcome {
    verified: bool,
    cost_usd: f64,
    tokens_in: u64,
    tokens_out: u64,
}

async fn verify(
    executor: &dyn AgentExecutor,
    exec_config: &ExecutorConfig,
    spec_summary: &str,
    cancel: watch::Receiver<bool>,
) -> Result<VerificationOutcome, SessionBodyError> {
    let prompt = format!(
        "Verify the work against this specification summary:\n\n{spec_summary}\n\n\
         Respond with a single JSON object: \
         {{\"verified\": bool, \"checked\": [string], \"unchecked\": [string]}}."
    );
    let outcome = executor
        .run(exec_config, &prompt, true, None, cancel)
        .await
        .map_err(SessionBodyError::Executor)?;
    let text = extract_text(&outcome.raw_output);
    let verified = parse_verified(&text).unwrap_or(false);
    Ok(VerificationOutcome {
        verified,
        cost_usd: outcome.cost_usd,
        tokens_in: outcome.tokens_in,
        tokens_out: outcome.tokens_out,
    })
}

/// Extract `{"verified": ...}` from a response that may contain surrounding
/// prose around the JSON object.
fn parse_verified(text: &str) -> Option<bool> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    #[derive(serde::Deserialize)]
    struct VerificationJson {
        verified: bool,
    }
    serde_json::from_str::<VerificationJson>(&text[start..=end])
        .ok()
        .map(|v| v.verified)
}

struct SinkingExecutor<'a> {
    inner: &'a dyn AgentExecutor,
    sink: Option<orbital_executor::OutputSink>,
}

#[async_trait::async_trait]
impl<'a> AgentExecutor for SinkingExecutor<'a> {
    async fn run(
        &self,
        config: &ExecutorConfig,
        prompt: &str,
        is_gate: bool,
        _sink: Option<orbital_executor::OutputSink>,
        cancel: watch::Receiver<bool>,
    ) -> Result<orbital_executor::ExecutorOutcome, ExecutorError> {
        self.inner.run(config, prompt, is_gate, self.sink.clone(), cancel).await
    }
}

struct RegistryObserver {
    registry: Registry,
    id: SessionId,
}

impl orbital_engine::LoopObserver for RegistryObserver {
    fn on_iteration_end(&self, iteration: u32, stats: &orbital_core::OutputStats) {
        let _ = self.registry.update_progress(
            &self.id,
            iteration,
            stats.cost_usd,
            stats.tokens_in,
            stats.tokens_out,
        );
    }
}

#[derive(Debug, Error)]
enum SessionBodyError {
    #[error("cancelled")]
    Cancelled,
    #[error("budget exceeded")]
    BudgetExceeded,
    #[error("max iterations reached")]
    MaxIterationsReached,
    #[error("loop error: {0}")]
    Loop(#[from] orbital_engine::LoopError),
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
}

impl SessionBodyError {
    fn sentinel(&self) -> Option<Sentinel> {
        match self {
            SessionBodyError::Cancelled => Some(Sentinel::Cancelled),
            SessionBodyError::BudgetExceeded => Some(Sentinel::BudgetExceeded),
            SessionBodyError::MaxIterationsReached => Some(Sentinel::MaxIterationsReached),
            SessionBodyError::Loop(e) => e.sentinel(),
            SessionBodyError::Executor(_) => None,
        }
    }
}

/// Translate a session body's result into a terminal registry status
/// (spec.md §4.10.2 step 6).
fn translate_result(registry: &Registry, id: &SessionId, result: Result<orbital_engine::LoopState, SessionBodyError>) {
    match result {
        Ok(state) if state.completed => {
            let _ = registry.update_status(id, SessionStatus::Completed, None);
        }
        Ok(_) => {
            let _ = registry.update_status(
                id,
                SessionStatus::Failed,
                Some("loop ended without reaching completion".to_string()),
            );
        }
        Err(e) => match e.sentinel() {
            Some(Sentinel::Cancelled) => {
                // Stop()/daemon-shutdown already set the terminal status
                // (stopped/interrupted); nothing further to do here.
            }
            Some(sentinel) => {
                let _ = registry.update_status(id, SessionStatus::Failed, Some(format!("{sentinel}: {e}")));
            }
            None => {
                let _ = registry.update_status(id, SessionStatus::Failed, Some(e.to_string()));
            }
        },
    }
}

/// Set every running session to `interrupted` and persist nothing further
/// (spec.md §5: "on daemon shutdown, each running session transitions to
/// interrupted").
pub fn interrupt_all_running(registry: &Registry) {
    for session in registry.list() {
        if session.status == SessionStatus::Running {
            let _ = registry.update_status(&session.id, SessionStatus::Interrupted, None);
        }
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
