//! Pet insertion conformance tests.

use std::future::Future;

use super::{make_pet, seed, TestResult};
use crate::record::PetStatus;
use crate::{AdoptionStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "insert_pet_starts_at_version_0",
        insert_pet_starts_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_pet_preserves_fields",
        insert_pet_preserves_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_pet_twice_fails",
        insert_pet_twice_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_pet_twice_in_one_snapshot_fails",
        insert_pet_twice_in_one_snapshot_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_pet_appears_in_open_feed",
        inserted_pet_appears_in_open_feed(factory).await,
    ));

    results
}

async fn insert_pet_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut pet = make_pet("pet-1", "tutor-1");
    pet.version = 7;
    seed(&s, vec![pet]).await?;

    let stored = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    if stored.version != 0 {
        return Err(format!("expected version 0, got {}", stored.version));
    }
    Ok(())
}

async fn insert_pet_preserves_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let pet = make_pet("pet-1", "tutor-9");
    seed(&s, vec![pet.clone()]).await?;

    let stored = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    if stored != pet {
        return Err(format!("stored pet differs: {stored:?} vs {pet:?}"));
    }
    if stored.status != PetStatus::Available {
        return Err(format!("expected AVAILABLE, got {}", stored.status.as_str()));
    }
    Ok(())
}

async fn insert_pet_twice_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.insert_pet(&mut snap, make_pet("pet-1", "tutor-2")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { pet_id }) if pet_id == "pet-1" => Ok(()),
        other => Err(format!("expected AlreadyExists(pet-1), got {other:?}")),
    }
}

async fn insert_pet_twice_in_one_snapshot_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert_pet(&mut snap, make_pet("pet-1", "tutor-1"))
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let result = s.insert_pet(&mut snap, make_pet("pet-1", "tutor-1")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {other:?}")),
    }
}

async fn inserted_pet_appears_in_open_feed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_pet("pet-2", "tutor-1"), make_pet("pet-1", "tutor-1")],
    )
    .await?;

    let feed = s
        .list_open_pets()
        .await
        .map_err(|e| format!("list_open_pets: {e}"))?;
    let ids: Vec<&str> = feed.iter().map(|p| p.id.as_str()).collect();
    if ids != ["pet-1", "pet-2"] {
        return Err(format!("expected [pet-1, pet-2] sorted, got {ids:?}"));
    }
    Ok(())
}
