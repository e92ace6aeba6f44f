//! Git working copy against a local bare repository.
//!
//! Skipped when no `git` binary is on the PATH.

use std::path::Path;
use std::process::Command;

use catalog_sync::{
    CommitAuthor, GitConnector, GitRemoteConfig, StoreConnector, StoreError, VersionStore,
};
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=seed", "-c", "user.email=seed@example.edu"])
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// A bare remote with one commit on `main`.
fn seeded_remote() -> (TempDir, String) {
    let root = tempfile::tempdir().unwrap();
    let bare = root.path().join("remote.git");
    let seed = root.path().join("seed");
    std::fs::create_dir_all(&bare).unwrap();
    std::fs::create_dir_all(&seed).unwrap();

    git(&bare, &["init", "--quiet", "--bare"]);
    git(&bare, &["symbolic-ref", "HEAD", "refs/heads/main"]);

    git(&seed, &["init", "--quiet"]);
    git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    std::fs::write(seed.join("versions.json"), "{}\n").unwrap();
    git(&seed, &["add", "versions.json"]);
    git(&seed, &["commit", "--quiet", "-m", "seed"]);
    git(&seed, &["push", "--quiet", bare.to_str().unwrap(), "main"]);

    let url = bare.to_string_lossy().to_string();
    (root, url)
}

fn connector(url: &str) -> GitConnector {
    GitConnector::new(GitRemoteConfig::new(url).with_base_branch("main"))
}

#[tokio::test]
async fn test_commit_and_push_to_bare_remote() {
    if !git_available() {
        return;
    }
    let (root, url) = seeded_remote();

    let mut copy = connector(&url).connect().await.unwrap();
    copy.checkout("main").await.unwrap();
    assert_eq!(copy.current_branch().await.unwrap(), Some("main".to_string()));
    assert_eq!(
        copy.read_file("versions.json").await.unwrap(),
        Some(b"{}\n".to_vec())
    );
    assert_eq!(copy.read_file("current/timetable.json").await.unwrap(), None);

    copy.write_file("current/timetable.json", b"{}\n").await.unwrap();
    copy.stage("current/timetable.json").await.unwrap();
    let commit = copy
        .commit("update in timetable", &CommitAuthor::default())
        .await
        .unwrap();
    assert!(commit.is_some());
    copy.push("main").await.unwrap();

    let shown = git(
        &root.path().join("remote.git"),
        &["show", "main:current/timetable.json"],
    );
    assert_eq!(shown, "{}\n");
}

#[tokio::test]
async fn test_commit_without_changes_returns_none() {
    if !git_available() {
        return;
    }
    let (_root, url) = seeded_remote();

    let mut copy = connector(&url).connect().await.unwrap();
    copy.checkout("main").await.unwrap();
    copy.write_file("versions.json", b"{}\n").await.unwrap();
    copy.stage("versions.json").await.unwrap();

    assert_eq!(
        copy.commit("noop", &CommitAuthor::default()).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_lists_branches_with_merge_state() {
    if !git_available() {
        return;
    }
    let (_root, url) = seeded_remote();

    let mut copy = connector(&url).connect().await.unwrap();
    copy.checkout("main").await.unwrap();
    copy.create_branch("timetable_1", false).await.unwrap();
    copy.push("timetable_1").await.unwrap();

    copy.create_branch("timetable_2", true).await.unwrap();
    copy.write_file("current/timetable.json", b"{}\n").await.unwrap();
    copy.stage("current/timetable.json").await.unwrap();
    copy.commit("update", &CommitAuthor::default()).await.unwrap();
    copy.push("timetable_2").await.unwrap();

    let fresh = connector(&url).connect().await.unwrap();
    let mut branches = fresh.list_remote_branches().await.unwrap();
    branches.sort_by(|a, b| a.name.cmp(&b.name));

    let summary: Vec<(String, bool)> = branches.into_iter().map(|b| (b.name, b.merged)).collect();
    assert_eq!(
        summary,
        vec![
            ("main".to_string(), true),
            ("timetable_1".to_string(), true),
            ("timetable_2".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_push_is_rejected() {
    if !git_available() {
        return;
    }
    let (_root, url) = seeded_remote();

    let mut first = connector(&url).connect().await.unwrap();
    let mut second = connector(&url).connect().await.unwrap();

    for (copy, contents) in [(&mut first, "a"), (&mut second, "b")] {
        copy.checkout("main").await.unwrap();
        copy.write_file("current/orc.json", contents.as_bytes())
            .await
            .unwrap();
        copy.stage("current/orc.json").await.unwrap();
        copy.commit("update in orc", &CommitAuthor::default())
            .await
            .unwrap();
    }

    first.push("main").await.unwrap();
    assert!(matches!(
        second.push("main").await,
        Err(StoreError::PushRejected { .. })
    ));
}

#[tokio::test]
async fn test_paths_outside_the_working_copy_are_rejected() {
    if !git_available() {
        return;
    }
    let (_root, url) = seeded_remote();

    let mut copy = connector(&url).connect().await.unwrap();
    assert!(matches!(
        copy.write_file("../escape.json", b"{}").await,
        Err(StoreError::InvalidPath(_))
    ));
}

#[tokio::test]
async fn test_unreachable_remote_is_unavailable() {
    if !git_available() {
        return;
    }
    let missing = tempfile::tempdir().unwrap();
    let url = missing.path().join("nope.git").to_string_lossy().to_string();

    assert!(matches!(
        connector(&url).connect().await,
        Err(StoreError::Unavailable(_))
    ));
}
