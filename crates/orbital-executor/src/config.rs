// SPDX-License-Identifier: MIT

//! Executor invocation configuration (spec.md §4.5).

use std::path::PathBuf;

/// Everything needed to assemble and spawn one agent subprocess invocation.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Model identifier passed to the agent (e.g. "claude-opus-4").
    pub model: String,
    /// Model used for gate/checker steps, if distinct from `model`.
    pub checker_model: Option<String>,
    /// Directory the subprocess runs in — a worktree's path.
    pub working_dir: PathBuf,
    /// System prompt override, if any.
    pub system_prompt: Option<String>,
    /// Resume an existing agent-side conversation by id, if any.
    pub resume_id: Option<String>,
    /// Maximum spend this session may still incur, if budgeted; the
    /// executor itself does not enforce this — it is surfaced so callers
    /// (the loop controller) can compare it against reconciled cost.
    pub max_budget_usd: Option<f64>,
    /// Agent binary name, overridable for tests.
    pub command: String,
}

impl ExecutorConfig {
    pub fn new(model: impl Into<String>, working_dir: PathBuf) -> Self {
        Self {
            model: model.into(),
            checker_model: None,
            working_dir,
            system_prompt: None,
            resume_id: None,
            max_budget_usd: None,
            command: crate::env::agent_command(),
        }
    }

    pub fn with_checker_model(mut self, checker_model: impl Into<String>) -> Self {
        self.checker_model = Some(checker_model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_resume_id(mut self, resume_id: impl Into<String>) -> Self {
        self.resume_id = Some(resume_id.into());
        self
    }

    pub fn with_max_budget_usd(mut self, budget: f64) -> Self {
        self.max_budget_usd = Some(budget);
        self
    }

    /// Model to use for this invocation: the checker model when one has
    /// been selected for a gate step, otherwise the primary model.
    pub fn effective_model(&self, is_gate: bool) -> &str {
        if is_gate {
            self.checker_model.as_deref().unwrap_or(&self.model)
        } else {
            &self.model
        }
    }

    /// Command-line arguments for the agent subprocess (spec.md §4.5):
    /// stream-JSON output mode, verbose, model selection, optional resume
    /// id, optional system prompt.
    pub fn build_args(&self, is_gate: bool) -> Vec<String> {
        let mut args = vec![
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--model".to_string(),
            self.effective_model(is_gate).to_string(),
        ];
        if let Some(resume_id) = &self.resume_id {
            args.push("--resume".to_string());
            args.push(resume_id.clone());
        }
        if let Some(system_prompt) = &self.system_prompt {
            args.push("--system-prompt".to_string());
            args.push(system_prompt.clone());
        }
        args
    }
}
