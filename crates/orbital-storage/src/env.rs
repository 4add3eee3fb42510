// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the storage crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Total time budget for acquiring the state file lock (default: 5000ms).
pub fn lock_timeout() -> Duration {
    parse_duration_ms("ORBITAL_LOCK_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

/// Backoff between lock acquisition attempts (default: 100ms).
pub fn lock_backoff() -> Duration {
    parse_duration_ms("ORBITAL_LOCK_BACKOFF_MS").unwrap_or(Duration::from_millis(100))
}

/// Age beyond which a lock file is considered abandoned by a crashed holder
/// (default: 30000ms).
pub fn lock_stale_after() -> Duration {
    parse_duration_ms("ORBITAL_LOCK_STALE_MS").unwrap_or(Duration::from_secs(30))
}
