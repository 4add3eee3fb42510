// SPDX-License-Identifier: MIT

//! Loop/workflow progress hooks (spec.md §9 design note).
//!
//! The source drives these as function-valued fields; a small trait keeps
//! the loop itself free of orchestration state while preserving the same
//! per-event hooks, with implementations constructed by the session runner.

use orbital_core::OutputStats;

/// Hooks invoked by the loop controller and workflow runner as they
/// progress. All methods have default no-op bodies so implementers only
/// override what they care about.
pub trait LoopObserver: Send + Sync {
    fn on_iteration_start(&self, _iteration: u32) {}
    fn on_iteration_end(&self, _iteration: u32, _stats: &OutputStats) {}
    fn on_step_start(&self, _step_name: &str) {}
    fn on_step_complete(&self, _step_name: &str, _stats: &OutputStats, _gate_passed: Option<bool>) {}
}

/// Default observer: all hooks no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LoopObserver for NoopObserver {}
