// SPDX-License-Identifier: MIT

//! Friendly worktree name generation (spec.md §4.4).
//!
//! `(adjective, animal)` pairs drawn from two 50-word lists give 2,500
//! combinations before falling back to a timestamp suffix.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

const ADJECTIVES: [&str; 50] = [
    "brave", "calm", "eager", "fuzzy", "gentle", "happy", "jolly", "keen", "lively", "mellow",
    "nimble", "proud", "quiet", "rapid", "silent", "swift", "tidy", "vivid", "witty", "zesty",
    "amber", "bold", "crisp", "daring", "earnest", "faithful", "golden", "humble", "icy", "jovial",
    "kind", "lucky", "merry", "noble", "orange", "patient", "quick", "radiant", "sincere", "tame",
    "upbeat", "vast", "warm", "xenial", "yellow", "zany", "ancient", "breezy", "cheerful", "dapper",
];

const ANIMALS: [&str; 50] = [
    "otter", "falcon", "badger", "heron", "lynx", "marten", "osprey", "puffin", "raven", "serval",
    "tapir", "urchin", "vole", "wombat", "yak", "zebra", "alpaca", "bison", "coyote", "dingo",
    "egret", "ferret", "gibbon", "hare", "ibex", "jackal", "koala", "lemur", "meerkat", "newt",
    "ocelot", "panther", "quokka", "rabbit", "salmon", "toad", "uakari", "viper", "walrus", "xerus",
    "yabby", "zorilla", "antelope", "beaver", "civet", "dolphin", "echidna", "finch", "gazelle", "ibis",
];

fn now_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

fn name_at(index: usize) -> String {
    let adj = ADJECTIVES[index % ADJECTIVES.len()];
    let animal = ANIMALS[(index / ADJECTIVES.len()) % ANIMALS.len()];
    format!("{adj}-{animal}")
}

/// Generate a worktree name not present in `excluded`.
///
/// Tries up to 50 random `(adjective, animal)` pairs, then falls back to
/// appending a nanosecond-timestamp suffix, trying up to 100 increments
/// before giving up (spec.md §4.4).
pub fn generate_unique_name(excluded: &HashSet<String>) -> Option<String> {
    let total = ADJECTIVES.len() * ANIMALS.len();

    for _ in 0..50 {
        let idx = (rand_index()) % total;
        let candidate = name_at(idx);
        if !excluded.contains(&candidate) {
            return Some(candidate);
        }
    }

    let base_idx = rand_index() % total;
    let base = name_at(base_idx);
    let suffix = now_nanos();
    for attempt in 0..100u128 {
        let candidate = format!("{base}-{}", suffix + attempt);
        if !excluded.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn rand_index() -> usize {
    use rand::Rng;
    rand::rng().random::<usize>()
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
