// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the executor crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Ceiling on a single agent subprocess invocation (default: 30 minutes).
/// An iteration that runs past this is killed and reported as a timeout
/// (spec.md §4.5, §7 kind 5).
pub fn run_timeout() -> Duration {
    parse_duration_ms("ORBITAL_EXECUTOR_TIMEOUT_MS").unwrap_or(Duration::from_secs(30 * 60))
}

/// Agent binary to invoke (default: "claude").
pub fn agent_command() -> String {
    std::env::var("ORBITAL_AGENT_COMMAND").unwrap_or_else(|_| "claude".to_string())
}

/// Number of trailing stderr bytes retained for error context on non-zero
/// exit (default: 4096).
pub fn stderr_tail_bytes() -> usize {
    std::env::var("ORBITAL_EXECUTOR_STDERR_TAIL_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(4096)
}
