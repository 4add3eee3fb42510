// SPDX-License-Identifier: MIT

//! Branch and worktree name validation (spec.md §4.4).

/// Suffixes that indicate an LLM's structured output got glued onto a
/// branch name without a separator (e.g. `orbital/fix-loginsuccess`).
const CORRUPTION_SUFFIXES: [&str; 5] = ["success", "failure", "error", "true", "false"];

/// Validate a branch name per spec.md §4.4:
/// - must start with `orbital/`
/// - no spaces
/// - charset `[a-zA-Z0-9/-]`
/// - rejects corruption suffixes glued on without a hyphen separator
pub fn validate_branch_name(branch: &str) -> Result<(), String> {
    if !branch.starts_with("orbital/") {
        return Err(format!("branch must start with 'orbital/': {branch}"));
    }
    if branch.contains(' ') {
        return Err(format!("branch name contains spaces: {branch}"));
    }
    if !branch
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '/' || c == '-')
    {
        return Err(format!(
            "branch name contains characters outside [a-zA-Z0-9/-]: {branch}"
        ));
    }

    let lower = branch.to_ascii_lowercase();
    for suffix in CORRUPTION_SUFFIXES {
        if lower.ends_with(suffix) {
            // A hyphen right before the suffix means it's a legitimately
            // separated word; only a glued-on suffix (no separator) is rejected.
            let cut = lower.len() - suffix.len();
            let preceding_is_hyphen = cut > 0 && lower.as_bytes()[cut - 1] == b'-';
            if !preceding_is_hyphen {
                return Err(format!(
                    "branch name ends with a glued-on corruption suffix '{suffix}': {branch}"
                ));
            }
        }
    }

    Ok(())
}

/// Validate a worktree name: `^[a-z0-9]+(-[a-z0-9]+)*$` (spec.md §3, §4.4).
pub fn validate_worktree_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("worktree name must not be empty".to_string());
    }
    let segments: Vec<&str> = name.split('-').collect();
    for seg in &segments {
        if seg.is_empty() || !seg.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
            return Err(format!(
                "worktree name must match [a-z0-9]+(-[a-z0-9]+)*: {name}"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
