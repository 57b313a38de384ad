use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{make_adoption, make_pet, seed, TestResult, T0};
use crate::{AdoptionStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_adoption_inserts_exactly_one_wins",
        concurrent_adoption_inserts_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "locked_read_modify_write_serializes",
        locked_read_modify_write_serializes(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "different_pets_do_not_block",
        different_pets_do_not_block(factory).await,
    ));

    results
}

// ── Concurrent adoption inserts: exactly one wins ────────────────────────────

/// N tasks each open a snapshot and try to record an adoption for the same
/// pet. Exactly one commit succeeds; the rest must get UniqueViolation,
/// either at insert or at commit.
async fn concurrent_adoption_inserts_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let record = make_adoption("pet-1", &format!("adopter-{i}"), T0);
            match s.insert_adoption(&mut snap, record).await {
                Ok(()) => {}
                Err(StorageError::UniqueViolation { .. }) => {
                    s.abort_snapshot(snap).await?;
                    return Ok(false);
                }
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    return Err(e);
                }
            }
            match s.commit_snapshot(snap).await {
                Ok(()) => Ok(true),
                Err(StorageError::UniqueViolation { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    Ok(())
}

// ── Locked read-modify-write serializes ──────────────────────────────────────

/// N tasks each lock the same pet, read its version, and write it back.
/// Because the row lock serializes them, every one must succeed and the
/// final version must equal N.
async fn locked_read_modify_write_serializes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let pet = s.get_pet_for_update(&mut snap, "pet-1").await?;
            tokio::task::yield_now().await;
            s.update_pet(&mut snap, &pet, pet.version).await?;
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let final_version = storage
        .get_pet("pet-1")
        .await
        .map_err(|e| format!("get: {e}"))?
        .version;
    if final_version != N as i64 {
        return Err(format!("expected version {N}, got {final_version}"));
    }
    Ok(())
}

// ── Different pets: no false contention ──────────────────────────────────────

/// Holding the lock on one pet must not block locking another.
async fn different_pets_do_not_block<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    seed(
        &storage,
        vec![make_pet("pet-1", "tutor-1"), make_pet("pet-2", "tutor-1")],
    )
    .await?;

    let mut held = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .get_pet_for_update(&mut held, "pet-1")
        .await
        .map_err(|e| format!("lock pet-1: {e}"))?;

    let mut other = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let locked = tokio::time::timeout(
        Duration::from_secs(2),
        storage.get_pet_for_update(&mut other, "pet-2"),
    )
    .await;

    let _ = storage.abort_snapshot(other).await;
    let _ = storage.abort_snapshot(held).await;
    match locked {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(format!("lock pet-2: {e}")),
        Err(_) => Err("locking pet-2 blocked behind pet-1".to_string()),
    }
}
