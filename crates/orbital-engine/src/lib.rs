// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! orbital-engine: the loop controller and workflow runner driving a
//! session's agent turns toward a promised completion (spec.md §4.7, §4.8).

pub mod env;
pub mod loop_controller;
pub mod observer;
pub mod presets;
pub mod workflow;

pub use loop_controller::{continuation_prompt, run_loop, run_loop_from, LoopConfig, LoopError, LoopState};
pub use observer::{LoopObserver, NoopObserver};
pub use presets::WorkflowPreset;
pub use workflow::{
    GateSpec, Step, WorkflowDef, WorkflowError, WorkflowOutcome, WorkflowRunner, GATE_FAIL_MARKER,
    GATE_PASS_MARKER,
};
