//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! visible inside it, visible to everyone after commit, and discarded on
//! abort or drop.

use std::future::Future;

use super::{make_adoption, make_pet, seed, TestResult, T0};
use crate::{AdoptionStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_pet_invisible_to_get",
        uncommitted_pet_invisible_to_get(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_pet_invisible_to_feed",
        uncommitted_pet_invisible_to_feed(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "staged_update_visible_inside_snapshot",
        staged_update_visible_inside_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_adoption_invisible",
        uncommitted_adoption_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "staged_adoption_visible_inside_snapshot",
        staged_adoption_visible_inside_snapshot(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_everything",
        abort_discards_everything(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "dropped_snapshot_discards_everything",
        dropped_snapshot_discards_everything(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "sequential_snapshots_see_prior_commits",
        sequential_snapshots_see_prior_commits(factory).await,
    ));

    results
}

async fn uncommitted_pet_invisible_to_get<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_pet(&mut snap, make_pet("pet-1", "tutor-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let outside = s.get_pet("pet-1").await;
    let _ = s.abort_snapshot(snap).await;
    match outside {
        Err(StorageError::PetNotFound { .. }) => Ok(()),
        other => Err(format!("uncommitted pet visible: {other:?}")),
    }
}

async fn uncommitted_pet_invisible_to_feed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_pet(&mut snap, make_pet("pet-1", "tutor-1"))
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let feed = s.list_open_pets().await;
    let _ = s.abort_snapshot(snap).await;
    match feed {
        Ok(pets) if pets.is_empty() => Ok(()),
        other => Err(format!("expected empty feed, got {other:?}")),
    }
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    pet.name = "renamed".to_string();
    s.update_pet(&mut snap, &pet, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    let _ = s.abort_snapshot(snap).await;
    if outside.name == "renamed" || outside.version != 0 {
        return Err(format!("uncommitted update visible: {outside:?}"));
    }
    Ok(())
}

async fn staged_update_visible_inside_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
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
    pet.name = "renamed".to_string();
    s.update_pet(&mut snap, &pet, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let inside = s.get_pet_for_update(&mut snap, "pet-1").await;
    let _ = s.abort_snapshot(snap).await;
    match inside {
        Ok(p) if p.name == "renamed" && p.version == 1 => Ok(()),
        other => Err(format!("staged update not visible in snapshot: {other:?}")),
    }
}

async fn uncommitted_adoption_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_adoption(&mut snap, make_adoption("pet-1", "adopter-1", T0))
        .await
        .map_err(|e| format!("insert_adoption: {e}"))?;

    let outside = s.get_adoption("pet-1").await;
    let _ = s.abort_snapshot(snap).await;
    match outside {
        Ok(None) => Ok(()),
        other => Err(format!("uncommitted adoption visible: {other:?}")),
    }
}

async fn staged_adoption_visible_inside_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_adoption(&mut snap, make_adoption("pet-1", "adopter-1", T0))
        .await
        .map_err(|e| format!("insert_adoption: {e}"))?;
    let inside = s.get_adoption_for_pet(&mut snap, "pet-1").await;
    let _ = s.abort_snapshot(snap).await;
    match inside {
        Ok(Some(a)) if a.adopter_id == "adopter-1" => Ok(()),
        other => Err(format!("staged adoption not visible in snapshot: {other:?}")),
    }
}

async fn abort_discards_everything<S, F, Fut>(factory: &F) -> Result<(), String>
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
    pet.pending_adopter_id = Some("adopter-1".to_string());
    s.update_pet(&mut snap, &pet, 0)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.insert_adoption(&mut snap, make_adoption("pet-1", "adopter-1", T0))
        .await
        .map_err(|e| format!("insert_adoption: {e}"))?;
    s.record_interest(&mut snap, "pet-1", "user-7")
        .await
        .map_err(|e| format!("record_interest: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let pet = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    let adoption = s.get_adoption("pet-1").await.map_err(|e| e.to_string())?;
    let interests = s.list_interests("pet-1").await.map_err(|e| e.to_string())?;
    if pet.pending_adopter_id.is_some() || adoption.is_some() || !interests.is_empty() {
        return Err("aborted writes survived".to_string());
    }
    Ok(())
}

async fn dropped_snapshot_discards_everything<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.insert_pet(&mut snap, make_pet("pet-1", "tutor-1"))
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }
    match s.get_pet("pet-1").await {
        Err(StorageError::PetNotFound { .. }) => Ok(()),
        other => Err(format!("dropped snapshot committed: {other:?}")),
    }
}

async fn sequential_snapshots_see_prior_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    for expected in 0..3 {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        let pet = s
            .get_pet_for_update(&mut snap, "pet-1")
            .await
            .map_err(|e| format!("lock: {e}"))?;
        if pet.version != expected {
            return Err(format!("expected version {expected}, got {}", pet.version));
        }
        s.update_pet(&mut snap, &pet, pet.version)
            .await
            .map_err(|e| format!("update: {e}"))?;
        s.commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }
    Ok(())
}
