//! Optimistic concurrency conformance tests.

use std::future::Future;

use super::{make_pet, seed, TestResult};
use crate::{AdoptionStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "update_returns_incremented_version",
        update_returns_incremented_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_with_wrong_version_conflicts",
        update_with_wrong_version_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_carries_expected_version",
        conflict_carries_expected_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_snapshot_conflicts_at_commit",
        stale_snapshot_conflicts_at_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_ignores_caller_version_field",
        update_ignores_caller_version_field(factory).await,
    ));

    results
}

async fn update_returns_incremented_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let pet = s
        .get_pet_for_update(&mut snap, "pet-1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let v1 = s
        .update_pet(&mut snap, &pet, 0)
        .await
        .map_err(|e| format!("update 1: {e}"))?;
    let v2 = s
        .update_pet(&mut snap, &pet, 1)
        .await
        .map_err(|e| format!("update 2: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let stored = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    if (v1, v2, stored.version) != (1, 2, 2) {
        return Err(format!(
            "expected versions (1, 2, 2), got ({v1}, {v2}, {})",
            stored.version
        ));
    }
    Ok(())
}

async fn update_with_wrong_version_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let pet = s
        .get_pet_for_update(&mut snap, "pet-1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let result = s.update_pet(&mut snap, &pet, 5).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

async fn conflict_carries_expected_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let pet = s
        .get_pet_for_update(&mut snap, "pet-1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    let result = s.update_pet(&mut snap, &pet, 3).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            pet_id,
            expected_version,
        }) if pet_id == "pet-1" && expected_version == 3 => Ok(()),
        other => Err(format!("expected ConcurrentConflict(pet-1, 3), got {other:?}")),
    }
}

/// Two snapshots that skip row locking both stage an update from version 0.
/// The first commit wins; the second must be rejected at commit.
async fn stale_snapshot_conflicts_at_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;
    let pet = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;

    let mut snap_a = s.begin_snapshot().await.map_err(|e| format!("begin a: {e}"))?;
    let mut snap_b = s.begin_snapshot().await.map_err(|e| format!("begin b: {e}"))?;
    s.update_pet(&mut snap_a, &pet, 0)
        .await
        .map_err(|e| format!("update a: {e}"))?;
    s.update_pet(&mut snap_b, &pet, 0)
        .await
        .map_err(|e| format!("update b: {e}"))?;
    s.commit_snapshot(snap_a)
        .await
        .map_err(|e| format!("commit a: {e}"))?;

    match s.commit_snapshot(snap_b).await {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict on stale commit, got {other:?}")),
    }
}

async fn update_ignores_caller_version_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut pet = s
        .get_pet_for_update(&mut snap, "pet-1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    pet.version = 99;
    s.update_pet(&mut snap, &pet, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let stored = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    if stored.version != 1 {
        return Err(format!("expected version 1, got {}", stored.version));
    }
    Ok(())
}
