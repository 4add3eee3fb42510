// SPDX-License-Identifier: MIT

use super::*;

#[yare::parameterized(
    first = { 0, "brave-otter" },
    last_adjective_in_row = { 49, "dapper-otter" },
    wraps_to_second_animal = { 50, "brave-falcon" },
    mid_table = { 123, "daring-badger" },
)]
fn name_at_index(index: usize, expected: &str) {
    assert_eq!(name_at(index), expected);
}

#[test]
fn generates_adjective_hyphen_animal_shape() {
    let excluded = HashSet::new();
    let name = generate_unique_name(&excluded).unwrap();
    let parts: Vec<&str> = name.split('-').collect();
    assert_eq!(parts.len(), 2, "expected adjective-animal, got {name}");
}

#[test]
fn avoids_excluded_names() {
    let mut excluded = HashSet::new();
    // Exclude everything except one combination so the function is forced
    // to find that single remaining slot within its 50 random attempts.
    for a in ADJECTIVES {
        for b in ANIMALS {
            excluded.insert(format!("{a}-{b}"));
        }
    }
    excluded.remove("brave-otter");

    // With only one slot open, a handful of independent tries should find it.
    let mut found = false;
    for _ in 0..20 {
        if generate_unique_name(&excluded) == Some("brave-otter".to_string()) {
            found = true;
            break;
        }
    }
    assert!(found, "expected to eventually find the one open name");
}

#[test]
fn falls_back_to_timestamp_suffix_when_fully_excluded() {
    let mut excluded = HashSet::new();
    for a in ADJECTIVES {
        for b in ANIMALS {
            excluded.insert(format!("{a}-{b}"));
        }
    }
    let name = generate_unique_name(&excluded).unwrap();
    assert!(!excluded.contains(&name));
    assert!(name.matches('-').count() >= 2, "expected a timestamp suffix: {name}");
}
