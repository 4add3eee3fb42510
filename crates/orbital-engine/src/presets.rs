// SPDX-License-Identifier: MIT

//! Built-in workflow presets (SPEC_FULL.md §4.12).

use crate::workflow::{Step, WorkflowDef};

/// Constructors for the workflows Orbital ships with.
pub struct WorkflowPreset;

impl WorkflowPreset {
    /// A single ungated step: the loop controller runs the spec prompt
    /// directly, with no workflow stepping (spec.md §4.10.2: "if the
    /// workflow has no gates, call loop controller").
    pub fn solo() -> WorkflowDef {
        WorkflowDef {
            name: "solo".to_string(),
            steps: Vec::new(),
        }
    }

    /// One `build` step with an attached verify gate.
    pub fn build_verify() -> WorkflowDef {
        WorkflowDef {
            name: "build-verify".to_string(),
            steps: vec![Step::new("build", "{base}").with_gate(VERIFY_GATE_PROMPT)],
        }
    }

    /// A `plan` step followed by a `build` step with an attached verify gate.
    pub fn plan_build_verify() -> WorkflowDef {
        WorkflowDef {
            name: "plan-build-verify".to_string(),
            steps: vec![
                Step::new(
                    "plan",
                    "Before making changes, write out a short plan for: {base}",
                ),
                Step::new("build", "{base}").with_gate(VERIFY_GATE_PROMPT),
            ],
        }
    }

    pub fn by_name(name: &str) -> Option<WorkflowDef> {
        match name {
            "solo" => Some(Self::solo()),
            "build-verify" => Some(Self::build_verify()),
            "plan-build-verify" => Some(Self::plan_build_verify()),
            _ => None,
        }
    }
}

const VERIFY_GATE_PROMPT: &str =
    "Check whether the preceding step fully satisfies the specification. \
     Respond with `GATE: PASS` if it does, or `GATE: FAIL` with the specific \
     gaps otherwise.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solo_has_no_steps() {
        assert!(WorkflowPreset::solo().steps.is_empty());
    }

    #[test]
    fn build_verify_has_one_gated_step() {
        let wf = WorkflowPreset::build_verify();
        assert_eq!(wf.steps.len(), 1);
        assert!(wf.steps[0].gate.is_some());
    }

    #[test]
    fn plan_build_verify_has_plan_then_gated_build() {
        let wf = WorkflowPreset::plan_build_verify();
        assert_eq!(wf.steps.len(), 2);
        assert_eq!(wf.steps[0].name, "plan");
        assert!(wf.steps[0].gate.is_none());
        assert_eq!(wf.steps[1].name, "build");
        assert!(wf.steps[1].gate.is_some());
    }

    #[test]
    fn by_name_resolves_known_presets_and_rejects_unknown() {
        assert!(WorkflowPreset::by_name("solo").is_some());
        assert!(WorkflowPreset::by_name("build-verify").is_some());
        assert!(WorkflowPreset::by_name("plan-build-verify").is_some());
        assert!(WorkflowPreset::by_name("nonexistent").is_none());
    }
}
