//! Promotion of a staged build while the active path is briefly unavailable.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use dm_launch::LauncherError;
use dm_launch::platform::{set_executable, staged_path_for};
use dm_launch::update::{ReplacePolicy, promote};
use std::time::Duration;

#[tokio::test]
async fn promotion_outlasts_a_transient_blocker() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("dm-langserver");
    let staged = staged_path_for(&primary);
    std::fs::write(&staged, "new build").unwrap();
    set_executable(&staged).unwrap();

    // A non-empty directory at the primary path makes every rename fail
    // until it goes away, like a previous instance holding the file.
    std::fs::create_dir_all(primary.join("held")).unwrap();
    let blocker = primary.clone();
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        tokio::fs::remove_dir_all(&blocker).await.unwrap();
    });

    let policy = ReplacePolicy {
        attempts: 8,
        delay: Duration::from_millis(50),
    };
    let promoted = promote(&staged, &primary, policy).await.unwrap();
    release.await.unwrap();

    assert!(promoted);
    assert!(!staged.exists());
    assert_eq!(std::fs::read_to_string(&primary).unwrap(), "new build");
}

#[tokio::test]
async fn default_policy_matches_fixed_schedule() {
    let policy = ReplacePolicy::default();
    assert_eq!(policy.attempts, 8);
    assert_eq!(policy.delay, Duration::from_millis(250));
}

#[tokio::test]
async fn permanent_blocker_fails_after_final_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let primary = dir.path().join("dm-langserver");
    let staged = staged_path_for(&primary);
    std::fs::write(&staged, "new build").unwrap();
    set_executable(&staged).unwrap();
    std::fs::create_dir_all(primary.join("held")).unwrap();

    let policy = ReplacePolicy {
        attempts: 3,
        delay: Duration::from_millis(1),
    };
    match promote(&staged, &primary, policy).await {
        Err(LauncherError::ReplaceFailed { staged: s, primary: p, .. }) => {
            assert_eq!(s, staged);
            assert_eq!(p, primary);
        }
        other => panic!("expected ReplaceFailed, got {other:?}"),
    }
}
