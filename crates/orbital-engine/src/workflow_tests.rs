// SPDX-License-Identifier: MIT

use super::*;
use async_trait::async_trait;
use orbital_executor::{ExecutorOutcome, OutputSink};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Executor stand-in that replays scripted `(raw_output, cost)` pairs in
/// call order (main-step and gate calls share the same sequence), repeating
/// the final entry once the script is exhausted.
struct ScriptedExecutor {
    calls: AtomicUsize,
    script: Vec<(&'static str, f64)>,
}

impl ScriptedExecutor {
    fn new(script: Vec<(&'static str, f64)>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
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
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        let &(raw_output, cost) = self.script.get(idx).unwrap_or_else(|| self.script.last().unwrap());
        Ok(ExecutorOutcome {
            raw_output: raw_output.to_string(),
            cost_usd: cost,
            tokens_in: 10,
            tokens_out: 5,
            duration_ms: 1,
        })
    }
}

fn dummy_executor_config() -> ExecutorConfig {
    ExecutorConfig::new("claude-opus-4", PathBuf::from("/tmp/work"))
}

#[tokio::test]
async fn single_ungated_step_completes_all_steps() {
    let workflow = WorkflowDef {
        name: "solo".to_string(),
        steps: vec![Step::new("build", "{base}")],
    };
    let executor = ScriptedExecutor::new(vec![("implemented the feature", 0.2)]);
    let exec_config = dummy_executor_config();
    let (_tx, rx) = watch::channel(false);

    let outcome = WorkflowRunner::new(&workflow)
        .run(
            &executor,
            &exec_config,
            "implement the feature",
            &crate::observer::NoopObserver,
            rx,
        )
        .await
        .unwrap();

    assert!(outcome.completed_all_steps);
    assert!((outcome.total_cost - 0.2).abs() < 1e-9);
    assert!(outcome.step_retries.is_empty());
}

#[tokio::test]
async fn gate_passes_on_first_try() {
    let workflow = WorkflowDef {
        name: "build-verify".to_string(),
        steps: vec![Step::new("build", "{base}").with_gate("check the build")],
    };
    let executor = ScriptedExecutor::new(vec![
        ("built it", 0.1),
        ("looks good. GATE: PASS", 0.02),
    ]);
    let exec_config = dummy_executor_config();
    let (_tx, rx) = watch::channel(false);

    let outcome = WorkflowRunner::new(&workflow)
        .run(
            &executor,
            &exec_config,
            "build the thing",
            &crate::observer::NoopObserver,
            rx,
        )
        .await
        .unwrap();

    assert!(outcome.completed_all_steps);
    assert!((outcome.total_cost - 0.12).abs() < 1e-9);
    assert!(outcome.step_retries.is_empty());
}

#[tokio::test]
async fn gate_passes_after_one_retry() {
    let workflow = WorkflowDef {
        name: "build-verify".to_string(),
        steps: vec![Step::new("build", "{base}")
            .with_gate("check the build")
            .with_max_gate_retries(3)],
    };
    let executor = ScriptedExecutor::new(vec![
        ("first attempt", 0.1),
        ("not quite. GATE: FAIL", 0.02),
        ("second attempt", 0.1),
        ("now it's right. GATE: PASS", 0.02),
    ]);
    let exec_config = dummy_executor_config();
    let (_tx, rx) = watch::channel(false);

    let outcome = WorkflowRunner::new(&workflow)
        .run(
            &executor,
            &exec_config,
            "build the thing",
            &crate::observer::NoopObserver,
            rx,
        )
        .await
        .unwrap();

    assert!(outcome.completed_all_steps);
    assert_eq!(outcome.step_retries.get("build"), Some(&1));
    assert_eq!(executor.call_count(), 4);
}

#[tokio::test]
async fn gate_failing_past_max_retries_fails_the_run() {
    let workflow = WorkflowDef {
        name: "build-verify".to_string(),
        steps: vec![Step::new("build", "{base}")
            .with_gate("check the build")
            .with_max_gate_retries(2)],
    };
    let executor = ScriptedExecutor::new(vec![("attempt", 0.1), ("never good enough. GATE: FAIL", 0.02)]);
    let exec_config = dummy_executor_config();
    let (_tx, rx) = watch::channel(false);

    let err = WorkflowRunner::new(&workflow)
        .run(
            &executor,
            &exec_config,
            "build the thing",
            &crate::observer::NoopObserver,
            rx,
        )
        .await
        .unwrap_err();

    match err {
        WorkflowError::MaxGateRetriesExceeded { step, max_retries } => {
            assert_eq!(step, "build");
            assert_eq!(max_retries, 2);
        }
        other => panic!("expected MaxGateRetriesExceeded, got {other:?}"),
    }
    assert_eq!(executor.call_count(), 4);
}

#[tokio::test]
async fn cancellation_before_first_step_short_circuits() {
    let workflow = WorkflowDef {
        name: "solo".to_string(),
        steps: vec![Step::new("build", "{base}")],
    };
    let executor = ScriptedExecutor::new(vec![("unused", 0.0)]);
    let exec_config = dummy_executor_config();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let err = WorkflowRunner::new(&workflow)
        .run(
            &executor,
            &exec_config,
            "build the thing",
            &crate::observer::NoopObserver,
            rx,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::Cancelled { .. }));
    assert_eq!(executor.call_count(), 0);
}
