// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Per-session ring buffer capacity (default: 10,000, per spec.md §3).
pub fn ring_buffer_capacity() -> usize {
    std::env::var("ORBITAL_RING_BUFFER_CAPACITY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(10_000)
}

/// Per-subscriber channel capacity; a slow subscriber beyond this many
/// buffered messages starts dropping, never blocking the producer
/// (spec.md §5, §8 scenario #5, §9).
pub fn subscriber_channel_capacity() -> usize {
    std::env::var("ORBITAL_SUBSCRIBER_CHANNEL_CAPACITY")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(256)
}

/// Timeout for reading/writing one IPC request/response (default: 5s).
pub fn ipc_timeout() -> Duration {
    parse_duration_ms("ORBITAL_IPC_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

/// Character budget for the chat side-channel's embedded spec/notes summary
/// (default: 1000, SPEC_FULL.md §4.13).
pub fn chat_summary_char_budget() -> usize {
    std::env::var("ORBITAL_CHAT_SUMMARY_CHAR_BUDGET")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1000)
}

/// Unix socket path the daemon listens on, relative to the project root
/// unless absolute (default: `.orbital/orbital.sock`).
pub fn socket_path(project_root: &std::path::Path) -> std::path::PathBuf {
    match std::env::var("ORBITAL_SOCKET_PATH") {
        Ok(p) if std::path::Path::new(&p).is_absolute() => std::path::PathBuf::from(p),
        Ok(p) => project_root.join(p),
        Err(_) => project_root.join(".orbital/orbital.sock"),
    }
}
