// SPDX-License-Identifier: MIT

//! End-to-end seed scenarios driven through the full `Runner`/`Registry`
//! stack rather than a single module in isolation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use async_trait::async_trait;
use orbital_core::{SessionConfig, SessionStatus};
use orbital_daemon::{Registry, Runner, RunnerConfig, StartRequest};
use orbital_executor::{AgentExecutor, ExecutorConfig, ExecutorError, ExecutorOutcome, OutputSink};
use orbital_parser::DEFAULT_PROMISE_MARKER;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

/// Replays a fixed (cost, tokens_in, tokens_out, completes) script, one
/// entry per call; the final entry repeats once exhausted.
struct ScriptedExecutor {
    script: Vec<(f64, u64, u64, bool)>,
    calls: AtomicUsize,
}

impl ScriptedExecutor {
    fn new(script: Vec<(f64, u64, u64, bool)>) -> Self {
        Self { script, calls: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    async fn run(
        &self,
        _config: &ExecutorConfig,
        _prompt: &str,
        _is_gate: bool,
        _sink: Option<OutputSink>,
        _cancel: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let idx = call.min(self.script.len() - 1);
        let (cost, tokens_in, tokens_out, completes) = self.script[idx];
        let raw_output = if completes {
            format!("work done. {DEFAULT_PROMISE_MARKER}")
        } else {
            "still working.".to_string()
        };
        Ok(ExecutorOutcome { raw_output, cost_usd: cost, tokens_in, tokens_out, duration_ms: 1 })
    }
}

fn request(project_root: PathBuf, max_iterations: u32, max_budget_usd: f64) -> StartRequest {
    StartRequest {
        spec_files: vec![PathBuf::from("spec.md")],
        project_root,
        use_worktree: false,
        worktree_name: None,
        config: SessionConfig::default(),
        max_iterations,
        max_budget_usd,
        context_files: Vec::new(),
        notes_path: None,
    }
}

async fn await_terminal(registry: &Registry, id: &orbital_core::SessionId) -> orbital_core::Session {
    let mut sub = registry.subscribe(id).unwrap();
    loop {
        let session = registry.get(id).unwrap();
        if session.status.is_terminal() {
            return session;
        }
        tokio::time::timeout(std::time::Duration::from_secs(5), sub.completion.changed())
            .await
            .expect("session never reached a terminal status")
            .ok();
    }
}

/// Seed scenario 1: happy path, no worktree.
#[tokio::test]
async fn happy_path_completes_at_expected_cost_and_tokens() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> =
        Arc::new(ScriptedExecutor::new(vec![(0.25, 300, 150, false), (0.25, 300, 150, false), (0.25, 300, 150, true)]));
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(request(dir.path().to_path_buf(), 5, 10.0)).await.unwrap();
    let session = await_terminal(&registry, &session.id).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.iteration, 3);
    assert!((session.total_cost - 0.75).abs() < 1e-9);
    assert_eq!(session.tokens_in, 900);
    assert_eq!(session.tokens_out, 450);
}

/// Seed scenario 2: budget cutoff before the marker ever appears.
#[tokio::test]
async fn budget_cutoff_fails_at_expected_iteration() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(ScriptedExecutor::new(vec![(4.0, 300, 150, false)]));
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(request(dir.path().to_path_buf(), 5, 10.0)).await.unwrap();
    let session = await_terminal(&registry, &session.id).await;

    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.iteration, 3);
    assert!(session.error_message.as_deref().unwrap().contains("BUDGET EXCEEDED"));
}

/// First call reports progress without completing; second call blocks on
/// cancellation (modelling "iteration 2 is in flight when Stop lands");
/// every call after that completes. Mirrors the stop-then-resume seed
/// scenario, where the executor's first post-resume call is really its
/// third invocation overall.
struct StopThenResumeExecutor {
    calls: AtomicUsize,
}

#[async_trait]
impl AgentExecutor for StopThenResumeExecutor {
    async fn run(
        &self,
        _config: &ExecutorConfig,
        _prompt: &str,
        _is_gate: bool,
        _sink: Option<OutputSink>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<ExecutorOutcome, ExecutorError> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Ok(ExecutorOutcome {
                raw_output: "still working.".to_string(),
                cost_usd: 0.25,
                tokens_in: 300,
                tokens_out: 150,
                duration_ms: 1,
            }),
            1 => {
                cancel.changed().await.ok();
                Err(ExecutorError::Cancelled)
            }
            _ => Ok(ExecutorOutcome {
                raw_output: format!("work done. {DEFAULT_PROMISE_MARKER}"),
                cost_usd: 0.25,
                tokens_in: 300,
                tokens_out: 150,
                duration_ms: 1,
            }),
        }
    }
}

async fn wait_for_iteration(registry: &Registry, id: &orbital_core::SessionId, at_least: u32) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if registry.get(id).unwrap().iteration >= at_least {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("iteration never reached the expected count");
}

/// Seed scenario 3: stop mid-flight, then resume to completion.
#[tokio::test]
async fn cancellation_then_resume_completes_with_accumulated_cost() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::new();
    let executor: Arc<dyn AgentExecutor> = Arc::new(StopThenResumeExecutor { calls: AtomicUsize::new(0) });
    let runner = Runner::new(registry.clone(), executor, RunnerConfig::default());

    let session = runner.start(request(dir.path().to_path_buf(), 5, 10.0)).await.unwrap();

    wait_for_iteration(&registry, &session.id, 1).await;
    runner.stop(&session.id).unwrap();

    let stopped = registry.get(&session.id).unwrap();
    assert_eq!(stopped.status, SessionStatus::Stopped);
    assert_eq!(stopped.iteration, 1);
    assert!((stopped.total_cost - 0.25).abs() < 1e-9);

    runner.resume(&session.id).await.unwrap();
    let resumed = await_terminal(&registry, &session.id).await;

    assert_eq!(resumed.status, SessionStatus::Completed);
    assert_eq!(resumed.iteration, 2);
    assert!((resumed.total_cost - 0.50).abs() < 1e-9);
    assert_eq!(resumed.tokens_in, 600);
    assert_eq!(resumed.tokens_out, 300);
}
