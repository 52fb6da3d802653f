mod common;

use std::time::Duration;

use common::*;
use nbcontainer::coordinator::{SessionLock, SessionOutcome};

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_second_attempt_is_rejected_until_release() -> anyhow::Result<()> {
    let harness = Harness::new()?;
    let containerizer = &harness.containerizer;

    assert!(!containerizer.is_ongoing());
    let first = containerizer.try_claim().unwrap();
    assert!(containerizer.is_ongoing());
    assert!(containerizer.try_claim().is_none());

    drop(first);
    assert!(!containerizer.is_ongoing());

    let third = containerizer.try_claim();
    assert!(third.is_some());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_session_holds_lock_until_dropped() -> anyhow::Result<()> {
    let harness = Harness::new()?;

    let (entries, session) = harness.run(&request("nope")).await;
    assert_eq!(entries.len(), 2);
    assert_eq!(session.outcome(), SessionOutcome::Rejected);
    assert!(harness.containerizer.is_ongoing());
    assert_eq!(
        harness.containerizer.get_lock().owner(),
        Some(session.owner())
    );

    drop(session);
    assert!(!harness.containerizer.is_ongoing());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_disconnect_releases_lock_and_cleans_up() -> anyhow::Result<()> {
    let harness = Harness::new()?;
    harness.runtime.set_push_records(push_progress());

    let claim = harness.containerizer.try_claim().unwrap();
    let mut session = harness.containerizer.start(claim, request(REPOSITORY));
    let first = session.next().await.unwrap();
    assert_eq!(first.progress(), Some(0));

    drop(session);
    assert!(harness.wait_until(|| !harness.containerizer.is_ongoing()).await);
    assert!(harness.runtime.containers.lock().unwrap().is_empty());

    let (entries, session) = harness.run(&request(REPOSITORY)).await;
    assert_eq!(session.outcome(), SessionOutcome::Succeeded);
    assert_eq!(entries.last().unwrap().progress(), Some(100));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_abandoned_session_cleans_up_before_next_session() -> anyhow::Result<()> {
    let harness = Harness::new()?;
    harness.runtime.set_push_records(push_progress());
    harness.runtime.set_upload_delay(Duration::from_millis(40));
    harness.runtime.set_remove_delay(Duration::from_millis(60));
    let lock = harness.containerizer.get_lock();

    let claim = SessionLock::claim(lock).unwrap();
    let session = harness.containerizer.start(claim, request(REPOSITORY));
    assert!(harness.wait_until(|| harness.runtime.called("upload_archive")).await);
    drop(session);

    // Take the lock the moment it is free.
    let claim = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(claim) = SessionLock::claim(lock) {
                return claim;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await?;

    // The staged container was removed before the lock was let go.
    assert!(harness.runtime.containers.lock().unwrap().is_empty());
    let removals = harness.runtime.count("remove_container");

    let seen = harness.runtime.calls().len();
    let mut session = harness.containerizer.start(claim, request(REPOSITORY));
    let mut entries = Vec::new();
    while let Some(entry) = session.next().await {
        entries.push(entry);
    }

    assert_eq!(session.outcome(), SessionOutcome::Succeeded);
    assert!(entries.iter().all(|entry| !entry.is_error()));

    // Nothing removed the new staged container while it was being filled.
    let calls = harness.runtime.calls()[seen..].to_vec();
    let created = calls
        .iter()
        .position(|call| call.starts_with("create_container"))
        .unwrap();
    let committed = calls
        .iter()
        .position(|call| call.starts_with("commit_container"))
        .unwrap();
    assert!(calls[created..committed]
        .iter()
        .all(|call| !call.starts_with("remove_container")));

    // One leftover check before staging and one cleanup after the commit.
    assert_eq!(harness.runtime.count("remove_container"), removals + 2);

    Ok(())
}
