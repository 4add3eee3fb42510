// SPDX-License-Identifier: MIT

//! Multi-step execution with gate checks and bounded retry (spec.md §4.8).

use crate::env;
use crate::observer::LoopObserver;
use orbital_core::OutputStats;
use orbital_executor::{AgentExecutor, ExecutorConfig, ExecutorError};
use orbital_parser::extract_text;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::watch;

/// Gate pass/fail markers (spec.md §6.4).
pub const GATE_PASS_MARKER: &str = "GATE: PASS";
pub const GATE_FAIL_MARKER: &str = "GATE: FAIL";

/// A post-step check; its extracted text must contain [`GATE_PASS_MARKER`]
/// to pass (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct GateSpec {
    pub prompt_template: String,
}

/// One step in a [`WorkflowDef`] (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub prompt_template: String,
    pub gate: Option<GateSpec>,
    pub max_gate_retries: u32,
}

impl Step {
    pub fn new(name: impl Into<String>, prompt_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt_template: prompt_template.into(),
            gate: None,
            max_gate_retries: env::default_max_gate_retries(),
        }
    }

    pub fn with_gate(mut self, gate_prompt_template: impl Into<String>) -> Self {
        self.gate = Some(GateSpec {
            prompt_template: gate_prompt_template.into(),
        });
        self
    }

    pub fn with_max_gate_retries(mut self, max: u32) -> Self {
        self.max_gate_retries = max;
        self
    }
}

/// An ordered list of steps (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct WorkflowDef {
    pub name: String,
    pub steps: Vec<Step>,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("step '{step}' exceeded max gate retries ({max_retries})")]
    MaxGateRetriesExceeded { step: String, max_retries: u32 },
    #[error("cancelled during step '{step}'")]
    Cancelled { step: String },
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
}

/// Result of one workflow run (spec.md §4.8, §4.10.2).
#[derive(Debug, Clone, Default)]
pub struct WorkflowOutcome {
    pub completed_all_steps: bool,
    pub total_cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub last_output: String,
    pub step_retries: HashMap<String, u32>,
}

pub struct WorkflowRunner<'a> {
    workflow: &'a WorkflowDef,
}

impl<'a> WorkflowRunner<'a> {
    pub fn new(workflow: &'a WorkflowDef) -> Self {
        Self { workflow }
    }

    /// Execute every step in order (spec.md §4.8). A step's gate, when
    /// present, must emit [`GATE_PASS_MARKER`] or the step is retried with an
    /// augmented prompt up to `max_gate_retries` times before the run fails.
    pub async fn run(
        &self,
        executor: &dyn AgentExecutor,
        executor_config: &ExecutorConfig,
        base_prompt: &str,
        observer: &dyn LoopObserver,
        cancel: watch::Receiver<bool>,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let mut outcome = WorkflowOutcome::default();

        for step in &self.workflow.steps {
            if *cancel.borrow() {
                return Err(WorkflowError::Cancelled {
                    step: step.name.clone(),
                });
            }
            tracing::info!(step = %step.name, has_gate = step.gate.is_some(), "workflow step starting");
            observer.on_step_start(&step.name);

            let mut retries = 0u32;
            let mut gate_passed: Option<bool> = None;
            let mut step_cost = 0.0;
            let mut step_tokens_in = 0u64;
            let mut step_tokens_out = 0u64;

            loop {
                let prompt = render_step_prompt(&step.prompt_template, base_prompt, retries);
                let step_result = executor
                    .run(executor_config, &prompt, false, None, cancel.clone())
                    .await?;
                step_cost += step_result.cost_usd;
                step_tokens_in += step_result.tokens_in;
                step_tokens_out += step_result.tokens_out;
                outcome.last_output = step_result.raw_output;

                let Some(gate) = &step.gate else {
                    break;
                };

                let gate_prompt = render_step_prompt(&gate.prompt_template, base_prompt, retries);
                let gate_result = executor
                    .run(executor_config, &gate_prompt, true, None, cancel.clone())
                    .await?;
                step_cost += gate_result.cost_usd;
                step_tokens_in += gate_result.tokens_in;
                step_tokens_out += gate_result.tokens_out;

                let passed = gate_passes(&gate_result.raw_output);
                gate_passed = Some(passed);
                if passed {
                    break;
                }

                retries += 1;
                outcome.step_retries.insert(step.name.clone(), retries);
                if retries >= step.max_gate_retries {
                    return Err(WorkflowError::MaxGateRetriesExceeded {
                        step: step.name.clone(),
                        max_retries: step.max_gate_retries,
                    });
                }
            }

            outcome.total_cost += step_cost;
            outcome.tokens_in += step_tokens_in;
            outcome.tokens_out += step_tokens_out;

            let stats = OutputStats {
                tokens_in: step_tokens_in,
                tokens_out: step_tokens_out,
                cost_usd: step_cost,
                duration_ms: 0,
            };
            observer.on_step_complete(&step.name, &stats, gate_passed);
        }

        outcome.completed_all_steps = true;
        Ok(outcome)
    }
}

fn gate_passes(raw_output: &str) -> bool {
    extract_text(raw_output).contains(GATE_PASS_MARKER)
}

fn render_step_prompt(template: &str, base_prompt: &str, retry: u32) -> String {
    let body = template.replace("{base}", base_prompt);
    if retry == 0 {
        body
    } else {
        format!(
            "{body}\n\n(retry attempt {retry}: the previous gate check emitted \
             `{GATE_FAIL_MARKER}` — address its feedback before responding again.)"
        )
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
