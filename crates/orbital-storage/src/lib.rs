// SPDX-License-Identifier: MIT

//! orbital-storage: locked, atomic, backup-recoverable persistence of
//! worktree state (spec.md §4.3, §6.2).

pub mod env;
pub mod lock;
pub mod state;

pub use lock::{LockError, StateLock};
pub use state::{StateError, WorktreeRecord, WorktreeStateFile, WorktreeStateStore};
