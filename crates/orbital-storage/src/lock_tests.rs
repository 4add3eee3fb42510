// SPDX-License-Identifier: MIT

use super::*;
use filetime::FileTime;
use serial_test::serial;
use std::fs;

#[test]
fn acquire_then_release_allows_reacquire() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("worktree-state.json");

    let lock = StateLock::acquire(&state_path).unwrap();
    assert!(lock_path_for(&state_path).exists());
    lock.release();
    assert!(!lock_path_for(&state_path).exists());

    let lock2 = StateLock::acquire(&state_path).unwrap();
    lock2.release();
}

#[test]
#[serial]
fn stale_lock_is_removed_and_reacquired() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("worktree-state.json");
    let lock_path = lock_path_for(&state_path);

    std::fs::create_dir_all(dir.path()).unwrap();
    fs::write(&lock_path, "99999").unwrap();
    let old = FileTime::from_unix_time(0, 0);
    filetime::set_file_mtime(&lock_path, old).unwrap();

    std::env::set_var("ORBITAL_LOCK_TIMEOUT_MS", "5000");
    let lock = StateLock::acquire(&state_path).unwrap();
    lock.release();
    std::env::remove_var("ORBITAL_LOCK_TIMEOUT_MS");
}

#[test]
fn drop_releases_lock() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("worktree-state.json");
    {
        let _lock = StateLock::acquire(&state_path).unwrap();
        assert!(lock_path_for(&state_path).exists());
    }
    assert!(!lock_path_for(&state_path).exists());
}
