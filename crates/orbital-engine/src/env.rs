// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the engine crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Default per-iteration timeout applied to each executor call
/// (default: 10 minutes).
pub fn iteration_timeout() -> Duration {
    parse_duration_ms("ORBITAL_ITERATION_TIMEOUT_MS").unwrap_or(Duration::from_secs(600))
}

/// Default ceiling on loop/workflow iterations when a session does not
/// specify one (default: 20).
pub fn default_max_iterations() -> u32 {
    std::env::var("ORBITAL_DEFAULT_MAX_ITERATIONS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(20)
}

/// Default bound on gate retries per step (default: 3).
pub fn default_max_gate_retries() -> u32 {
    std::env::var("ORBITAL_DEFAULT_MAX_GATE_RETRIES")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(3)
}

/// Trailing character budget of the last executor output embedded in a
/// continuation prompt (default: 2000).
pub fn continuation_tail_chars() -> usize {
    std::env::var("ORBITAL_CONTINUATION_TAIL_CHARS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(2000)
}
