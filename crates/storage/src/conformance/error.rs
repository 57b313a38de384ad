use std::future::Future;

use super::{make_adoption, make_pet, seed, TestResult, T0};
use crate::{AdoptionStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_pet_nonexistent",
        get_pet_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_pet_for_update_nonexistent",
        get_pet_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_pet_nonexistent",
        update_pet_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "record_interest_for_missing_pet",
        record_interest_for_missing_pet(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_adoption_none_for_nonexistent",
        get_adoption_none_for_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_queries_empty_on_empty_store",
        list_queries_empty_on_empty_store(factory).await,
    ));

    results
}

// ── 1. get_pet on empty store returns PetNotFound with the id ─────────────────

async fn get_pet_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_pet("pet-999").await {
        Err(StorageError::PetNotFound { pet_id }) if pet_id == "pet-999" => Ok(()),
        other => Err(format!("expected PetNotFound(pet-999), got {other:?}")),
    }
}

// ── 2. get_pet_for_update on missing pet ──────────────────────────────────────

async fn get_pet_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.get_pet_for_update(&mut snap, "pet-42").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::PetNotFound { pet_id }) if pet_id == "pet-42" => Ok(()),
        other => Err(format!("expected PetNotFound(pet-42), got {other:?}")),
    }
}

// ── 3. update_pet on missing pet ──────────────────────────────────────────────

async fn update_pet_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.update_pet(&mut snap, &make_pet("ghost", "tutor-1"), 0).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::PetNotFound { .. }) => Ok(()),
        other => Err(format!("expected PetNotFound, got {other:?}")),
    }
}

// ── 4. interest on a missing pet ──────────────────────────────────────────────

async fn record_interest_for_missing_pet<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.record_interest(&mut snap, "ghost", "user-1").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::PetNotFound { .. }) => Ok(()),
        other => Err(format!("expected PetNotFound, got {other:?}")),
    }
}

// ── 5. get_adoption is Ok(None), not an error ─────────────────────────────────

async fn get_adoption_none_for_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;
    match s.get_adoption("pet-1").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

// ── 6. every listing is empty on an empty store ───────────────────────────────

async fn list_queries_empty_on_empty_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let far_future = T0 + time::Duration::days(3650);

    let open = s.list_open_pets().await.map_err(|e| e.to_string())?;
    let stalled = s
        .list_stalled_nominations(far_future)
        .await
        .map_err(|e| e.to_string())?;
    let unconfirmed = s
        .list_unconfirmed_adoptions(far_future)
        .await
        .map_err(|e| e.to_string())?;
    let interests = s.list_interests("pet-1").await.map_err(|e| e.to_string())?;

    if !open.is_empty() || !stalled.is_empty() || !unconfirmed.is_empty() || !interests.is_empty()
    {
        return Err("expected all listings empty".to_string());
    }

    // An orphan adoption fact (no pet row) is never a sweep candidate.
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_adoption(&mut snap, make_adoption("orphan", "adopter-1", T0))
        .await
        .map_err(|e| format!("insert_adoption: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let unconfirmed = s
        .list_unconfirmed_adoptions(far_future)
        .await
        .map_err(|e| e.to_string())?;
    if !unconfirmed.is_empty() {
        return Err(format!("orphan adoption listed: {unconfirmed:?}"));
    }
    Ok(())
}
