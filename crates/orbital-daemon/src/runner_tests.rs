// SPDX-License-Identifier: MIT

use super::*;
use async_trait::async_trait;
use orbital_core::SessionConfig;
use orbital_executor::{ExecutorOutcome, OutputSink};
use orbital_parser::DEFAULT_PROMISE_MARKER;
use tempfile::TempDir;

/// Executor stand-in completing on the first call with the promise marker.
struct ImmediateExecutor;

#[async_trait]
impl AgentExecutor for ImmediateExecutor {
    async fn run(
        &self,
        _config: &ExecutorConfig,
        _prompt: &str,
        _is_gate: bool,
        sink: Option<OutputSink>,
        _cancel: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        if let Some(sink) = sink {
            sink("a line of progress");
        }
        Ok(ExecutorOutcome {
            raw_output: format!("done. {DEFAULT_PROMISE_MARKER}"),
            cost_usd: 0.1,
            tokens_in: 10,
            tokens_out: 5,
            duration_ms: 5,
        })
    }
}

/// Executor stand-in that never completes and never returns, used to test
/// stop() against a session that's genuinely mid-flight.
struct HangingExecutor;

#[async_trait]
impl AgentExecutor for HangingExecutor {
    async fn run(
        &self,
        _config: &ExecutorConfig,
        _prompt: &str,
        _is_gate: bool,
        _sink: Option<OutputSink>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        cancel.changed().await.ok();
        Err(ExecutorError::Cancelled)
    }
}

fn basic_request(project_root: PathBuf) -> StartRequest {
    StartRequest {
        spec_files: vec![PathBuf::from("spec.md")],
        project_root,
        use_worktree: false,
        worktree_name: None,
        config: SessionConfig::default(),
        max_iterations: 5,
        max_budget_usd: 10.0,
        context_files: Vec::new(),
        notes_path: None,
    }
}

#[tokio::test]
async fn start_runs_to_completion_and_streams_output() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(ImmediateExecutor);
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(basic_request(dir.path().to_path_buf())).await.unwrap();
    let sub = registry.subscribe(&session.id).unwrap();

    // Give the spawned body a chance to run (immediate executor completes fast).
    let mut completion = sub.completion;
    tokio::time::timeout(std::time::Duration::from_secs(5), completion.changed())
        .await
        .unwrap()
        .unwrap();

    let after = registry.get(&session.id).unwrap();
    assert_eq!(after.status, SessionStatus::Completed);
}

#[tokio::test]
async fn stop_transitions_status_and_removes_cancel_entry() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(HangingExecutor);
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(basic_request(dir.path().to_path_buf())).await.unwrap();
    runner.stop(&session.id).unwrap();

    let after = registry.get(&session.id).unwrap();
    assert_eq!(after.status, SessionStatus::Stopped);

    // Stopping an already-stopped session is not "running" anymore.
    assert!(matches!(runner.stop(&session.id), Err(RunnerError::NotRunning(_))));
}

#[tokio::test]
async fn resume_requires_a_resumable_status() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(ImmediateExecutor);
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(basic_request(dir.path().to_path_buf())).await.unwrap();
    // Freshly started sessions are Running, not resumable, until they stop.
    let err = runner.resume(&session.id).await.unwrap_err();
    assert!(matches!(err, RunnerError::NotResumable(_)));
}

#[tokio::test]
async fn resume_from_stopped_transitions_back_to_running() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(HangingExecutor);
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(basic_request(dir.path().to_path_buf())).await.unwrap();
    runner.stop(&session.id).unwrap();

    let resumed = runner.resume(&session.id).await.unwrap();
    assert_eq!(resumed.status, SessionStatus::Running);
}

#[test]
fn merge_success_marker_is_tolerant_of_case_and_spacing() {
    assert!(merge_success_marker("MERGE_SUCCESS: true"));
    assert!(merge_success_marker("merge_success:true"));
    assert!(merge_success_marker("Merge_Success: True"));
    assert!(!merge_success_marker("MERGE_SUCCESS: false"));
    assert!(!merge_success_marker("no marker here"));
}

#[test]
fn parse_verified_extracts_json_from_surrounding_prose() {
    let text = "Here is my assessment:\n{\"verified\": true, \"checked\": [\"a\"], \"unchecked\": []}\nDone.";
    assert_eq!(parse_verified(text), Some(true));
}

#[test]
fn parse_verified_returns_none_when_no_json_present() {
    assert_eq!(parse_verified("no json here"), None);
}

#[tokio::test]
async fn interrupt_all_running_only_touches_running_sessions() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(HangingExecutor);
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let running = runner.start(basic_request(dir.path().to_path_buf())).await.unwrap();
    let stopped = runner.start(basic_request(dir.path().to_path_buf())).await.unwrap();
    runner.stop(&stopped.id).unwrap();

    interrupt_all_running(&registry);

    assert_eq!(registry.get(&running.id).unwrap().status, SessionStatus::Interrupted);
    assert_eq!(registry.get(&stopped.id).unwrap().status, SessionStatus::Stopped);
}
