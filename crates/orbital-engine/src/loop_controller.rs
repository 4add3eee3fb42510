// SPDX-License-Identifier: MIT

//! Single-step iterative driver (spec.md §4.7).

use crate::env;
use crate::observer::LoopObserver;
use orbital_core::error::{OrbitalError, Sentinel};
use orbital_core::OutputStats;
use orbital_executor::{AgentExecutor, ExecutorConfig, ExecutorError};
use orbital_parser::{detect_completion, DEFAULT_PROMISE_MARKER};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("{0}")]
    Policy(#[from] OrbitalError),
    #[error("cancelled at iteration {iteration}")]
    Cancelled { iteration: u32 },
    #[error("iteration {iteration} deadline exceeded after {timeout:?}")]
    DeadlineExceeded { iteration: u32, timeout: Duration },
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
}

impl LoopError {
    /// Identify the sentinel category of this failure, if any, so callers
    /// can translate it into a session status/error-message pair (spec.md
    /// §6.6, §7) regardless of which layer produced it.
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self {
            LoopError::Policy(e) => Some(e.sentinel),
            LoopError::Cancelled { .. } => Some(Sentinel::Cancelled),
            LoopError::DeadlineExceeded { .. } => Some(Sentinel::DeadlineExceeded),
            LoopError::Executor(_) => None,
        }
    }
}

/// Configuration for one `run_loop` invocation (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_iterations: u32,
    pub max_budget_usd: f64,
    pub per_iteration_timeout: Duration,
    pub promise_marker: String,
    /// Embedded verbatim into continuation prompts; callers pass a short
    /// rendering of the spec file contents.
    pub spec_summary: String,
}

impl LoopConfig {
    pub fn new(max_iterations: u32, max_budget_usd: f64) -> Self {
        Self {
            max_iterations,
            max_budget_usd,
            per_iteration_timeout: env::iteration_timeout(),
            promise_marker: DEFAULT_PROMISE_MARKER.to_string(),
            spec_summary: String::new(),
        }
    }

    pub fn with_spec_summary(mut self, summary: impl Into<String>) -> Self {
        self.spec_summary = summary.into();
        self
    }

    pub fn with_promise_marker(mut self, marker: impl Into<String>) -> Self {
        self.promise_marker = marker.into();
        self
    }
}

/// State accumulated across iterations (spec.md §4.7).
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub iteration: u32,
    pub total_cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub last_output: String,
    pub completed: bool,
}

/// Drive the agent through up to `config.max_iterations` turns until the
/// promise marker appears, the budget is exceeded, or iterations run out
/// (spec.md §4.7).
pub async fn run_loop(
    config: &LoopConfig,
    executor: &dyn AgentExecutor,
    executor_config: &ExecutorConfig,
    initial_prompt: &str,
    observer: &dyn LoopObserver,
    cancel: watch::Receiver<bool>,
) -> Result<LoopState, LoopError> {
    run_loop_from(config, executor, executor_config, initial_prompt, observer, cancel, LoopState::default()).await
}

/// Like [`run_loop`], but continuing from a prior `state` instead of a
/// fresh one — used when a session resumes after a stop/interrupt so its
/// iteration count and spend carry over rather than resetting (spec.md
/// §8 scenario #3).
pub async fn run_loop_from(
    config: &LoopConfig,
    executor: &dyn AgentExecutor,
    executor_config: &ExecutorConfig,
    initial_prompt: &str,
    observer: &dyn LoopObserver,
    mut cancel: watch::Receiver<bool>,
    mut state: LoopState,
) -> Result<LoopState, LoopError> {
    let start = state.iteration + 1;
    if start > config.max_iterations {
        return Err(LoopError::Policy(OrbitalError::new(
            Sentinel::MaxIterationsReached,
            format!("reached max_iterations={}", config.max_iterations),
        )));
    }

    for i in start..=config.max_iterations {
        if *cancel.borrow() {
            return Err(LoopError::Cancelled {
                iteration: state.iteration,
            });
        }

        state.iteration = i;
        tracing::info!(iteration = i, total_cost = state.total_cost, "loop iteration starting");
        observer.on_iteration_start(i);

        let prompt = if i == 1 {
            initial_prompt.to_string()
        } else {
            continuation_prompt(&config.promise_marker, &config.spec_summary, &state.last_output)
        };

        let outcome = tokio::select! {
            biased;

            _ = cancel.changed() => {
                if *cancel.borrow() {
                    return Err(LoopError::Cancelled { iteration: i });
                }
                continue;
            }

            result = tokio::time::timeout(
                config.per_iteration_timeout,
                executor.run(executor_config, &prompt, false, None, cancel.clone()),
            ) => {
                match result {
                    Ok(inner) => inner?,
                    Err(_elapsed) => {
                        return Err(LoopError::DeadlineExceeded {
                            iteration: i,
                            timeout: config.per_iteration_timeout,
                        });
                    }
                }
            }
        };

        state.total_cost += outcome.cost_usd;
        state.tokens_in += outcome.tokens_in;
        state.tokens_out += outcome.tokens_out;
        state.last_output = outcome.raw_output;

        let stats = OutputStats {
            tokens_in: outcome.tokens_in,
            tokens_out: outcome.tokens_out,
            cost_usd: outcome.cost_usd,
            duration_ms: outcome.duration_ms,
        };
        observer.on_iteration_end(i, &stats);

        if state.total_cost >= config.max_budget_usd {
            return Err(LoopError::Policy(OrbitalError::new(
                Sentinel::BudgetExceeded,
                format!(
                    "{} iterations, spend {:.4} >= budget {:.4}",
                    i, state.total_cost, config.max_budget_usd
                ),
            )));
        }

        if detect_completion(&state.last_output, &config.promise_marker) {
            state.completed = true;
            return Ok(state);
        }

        if i == config.max_iterations {
            return Err(LoopError::Policy(OrbitalError::new(
                Sentinel::MaxIterationsReached,
                format!("reached max_iterations={}", config.max_iterations),
            )));
        }
    }

    unreachable!("loop returns via completion or a sentinel error before exhausting the range")
}

/// Continuation prompt referencing the spec, the promise marker, and a
/// trailing slice of the previous iteration's output (spec.md §9 open
/// question, resolved).
pub fn continuation_prompt(marker: &str, spec_summary: &str, last_output: &str) -> String {
    let tail = tail_chars(last_output, env::continuation_tail_chars());
    format!(
        "Continue working toward the specification below. When the task is \
         fully complete, include the exact marker `{marker}` in your final \
         response.\n\n--- SPEC SUMMARY ---\n{spec_summary}\n\n--- LAST OUTPUT (tail) ---\n{tail}"
    )
}

fn tail_chars(s: &str, max: usize) -> String {
    let total = s.chars().count();
    if total <= max {
        s.to_string()
    } else {
        s.chars().skip(total - max).collect()
    }
}

#[cfg(test)]
#[path = "loop_controller_tests.rs"]
mod tests;
