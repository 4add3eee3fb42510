// SPDX-License-Identifier: MIT

use super::*;
use std::process::Command as StdCommand;

fn init_repo(dir: &Path) {
    let run = |args: &[&str]| {
        let status = StdCommand::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .status()
            .expect("git available on PATH");
        assert!(status.success(), "git {args:?} failed");
    };
    run(&["init", "-q"]);
    run(&["config", "user.email", "test@example.com"]);
    run(&["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello").unwrap();
    run(&["add", "."]);
    run(&["commit", "-q", "-m", "init"]);
}

#[tokio::test]
async fn worktree_add_then_remove_roundtrips() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());

    let git = GitOps::default();
    let worktree_path = dir.path().join("wt");
    git.worktree_add(dir.path(), "orbital/brave-otter", &worktree_path)
        .await
        .unwrap();
    assert!(worktree_path.join(".git").exists());

    git.worktree_remove(dir.path(), &worktree_path).await.unwrap();
    assert!(!worktree_path.exists());

    git.delete_branch(dir.path(), "orbital/brave-otter").await.unwrap();
}

#[tokio::test]
async fn worktree_add_on_non_repo_reports_not_git_repository() {
    let dir = tempfile::tempdir().unwrap();
    let git = GitOps::default();
    let err = git
        .worktree_add(dir.path(), "orbital/x", &dir.path().join("wt"))
        .await
        .unwrap_err();
    assert!(matches!(err, GitError::NotGitRepository(_)));
}

#[tokio::test]
async fn current_branch_reports_initial_branch() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    let git = GitOps::default();
    let branch = git.current_branch(dir.path()).await.unwrap();
    assert!(!branch.is_empty());
    assert_ne!(branch, "HEAD");
}
