// SPDX-License-Identifier: MIT

//! Worktree identity (spec.md §3 `WorktreeInfo`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// An isolated working directory backed by a dedicated branch.
///
/// Invariant: `branch == format!("orbital/{name}")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub name: String,
    pub path: PathBuf,
    pub branch: String,
    pub original_branch: String,
}

impl WorktreeInfo {
    pub fn new(name: impl Into<String>, path: PathBuf, original_branch: impl Into<String>) -> Self {
        let name = name.into();
        let branch = format!("orbital/{name}");
        Self {
            name,
            path,
            branch,
            original_branch: original_branch.into(),
        }
    }
}
