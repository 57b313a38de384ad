use std::future::Future;

use super::{make_adoption, make_pet, seed, seed_adoption, TestResult, T0};
use crate::record::PetStatus;
use crate::{AdoptionStorage, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    // Pet + adoption atomicity
    results.push(TestResult::from_result(
        "commit",
        "pet_update_and_adoption_both_visible",
        pet_update_and_adoption_both_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "failed_commit_applies_nothing",
        failed_commit_applies_nothing(factory).await,
    ));

    // Unique adoption
    results.push(TestResult::from_result(
        "commit",
        "insert_adoption_twice_in_one_snapshot_fails",
        insert_adoption_twice_in_one_snapshot_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "insert_adoption_over_committed_fails",
        insert_adoption_over_committed_fails(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "adoption_fields_preserved",
        adoption_fields_preserved(factory).await,
    ));

    // Interest artifacts
    results.push(TestResult::from_result(
        "commit",
        "interests_recorded_and_deduplicated",
        interests_recorded_and_deduplicated(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "clear_interests_reports_count_and_removes",
        clear_interests_reports_count_and_removes(factory).await,
    ));

    // Feed
    results.push(TestResult::from_result(
        "commit",
        "adopted_pet_leaves_open_feed",
        adopted_pet_leaves_open_feed(factory).await,
    ));

    results
}

async fn pet_update_and_adoption_both_visible<S, F, Fut>(factory: &F) -> Result<(), String>
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
    pet.status = PetStatus::Adopted;
    pet.adopet_confirmed_at = Some(T0);
    s.update_pet(&mut snap, &pet, pet.version)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.insert_adoption(&mut snap, make_adoption("pet-1", "adopter-1", T0))
        .await
        .map_err(|e| format!("insert_adoption: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let pet = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    let adoption = s.get_adoption("pet-1").await.map_err(|e| e.to_string())?;
    if pet.status != PetStatus::Adopted || pet.adopet_confirmed_at != Some(T0) {
        return Err(format!("pet update missing: {pet:?}"));
    }
    if adoption.is_none() {
        return Err("adoption missing after commit".to_string());
    }
    Ok(())
}

/// A commit that trips the unique constraint must not apply the pet update
/// staged alongside it.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    // Stage an adoption in snapshot A, then let snapshot B commit one first.
    let mut snap_a = s.begin_snapshot().await.map_err(|e| format!("begin a: {e}"))?;
    s.insert_adoption(&mut snap_a, make_adoption("pet-1", "adopter-a", T0))
        .await
        .map_err(|e| format!("insert a: {e}"))?;
    let mut pet = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    pet.name = "from snapshot a".to_string();
    s.update_pet(&mut snap_a, &pet, 0)
        .await
        .map_err(|e| format!("update a: {e}"))?;

    seed_adoption(&s, make_adoption("pet-1", "adopter-b", T0)).await?;

    match s.commit_snapshot(snap_a).await {
        Err(StorageError::UniqueViolation { .. }) => {}
        other => return Err(format!("expected UniqueViolation at commit, got {other:?}")),
    }

    let pet = s.get_pet("pet-1").await.map_err(|e| format!("get: {e}"))?;
    if pet.name == "from snapshot a" || pet.version != 0 {
        return Err(format!("partial commit applied: {pet:?}"));
    }
    let adoption = s
        .get_adoption("pet-1")
        .await
        .map_err(|e| e.to_string())?
        .ok_or("adoption missing")?;
    if adoption.adopter_id != "adopter-b" {
        return Err(format!("expected adopter-b to win, got {}", adoption.adopter_id));
    }
    Ok(())
}

async fn insert_adoption_twice_in_one_snapshot_fails<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
        .map_err(|e| format!("first insert: {e}"))?;
    let second = s
        .insert_adoption(&mut snap, make_adoption("pet-1", "adopter-2", T0))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::UniqueViolation { pet_id }) if pet_id == "pet-1" => Ok(()),
        other => Err(format!("expected UniqueViolation(pet-1), got {other:?}")),
    }
}

async fn insert_adoption_over_committed_fails<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;
    seed_adoption(&s, make_adoption("pet-1", "adopter-1", T0)).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let second = s
        .insert_adoption(&mut snap, make_adoption("pet-1", "adopter-2", T0))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::UniqueViolation { .. }) => Ok(()),
        other => Err(format!("expected UniqueViolation, got {other:?}")),
    }
}

async fn adoption_fields_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;
    let record = make_adoption("pet-1", "adopter-1", T0 + time::Duration::minutes(5));
    seed_adoption(&s, record.clone()).await?;

    match s.get_adoption("pet-1").await {
        Ok(Some(stored)) if stored == record => Ok(()),
        other => Err(format!("expected {record:?}, got {other:?}")),
    }
}

async fn interests_recorded_and_deduplicated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_pet("pet-1", "tutor-1")]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    for user in ["user-b", "user-a", "user-b"] {
        s.record_interest(&mut snap, "pet-1", user)
            .await
            .map_err(|e| format!("record_interest: {e}"))?;
    }
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let interests = s.list_interests("pet-1").await.map_err(|e| e.to_string())?;
    if interests != ["user-a", "user-b"] {
        return Err(format!("expected [user-a, user-b], got {interests:?}"));
    }
    Ok(())
}

async fn clear_interests_reports_count_and_removes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_pet("pet-1", "tutor-1"), make_pet("pet-2", "tutor-1")],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    for (pet, user) in [("pet-1", "user-a"), ("pet-1", "user-b"), ("pet-2", "user-a")] {
        s.record_interest(&mut snap, pet, user)
            .await
            .map_err(|e| format!("record_interest: {e}"))?;
    }
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let removed = s
        .clear_interests(&mut snap, "pet-1")
        .await
        .map_err(|e| format!("clear: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    if removed != 2 {
        return Err(format!("expected 2 removed, got {removed}"));
    }
    let left = s.list_interests("pet-1").await.map_err(|e| e.to_string())?;
    let other = s.list_interests("pet-2").await.map_err(|e| e.to_string())?;
    if !left.is_empty() || other != ["user-a"] {
        return Err(format!("unexpected interests: pet-1={left:?} pet-2={other:?}"));
    }
    Ok(())
}

async fn adopted_pet_leaves_open_feed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_pet("pet-1", "tutor-1"), make_pet("pet-2", "tutor-1")],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut pet = s
        .get_pet_for_update(&mut snap, "pet-1")
        .await
        .map_err(|e| format!("lock: {e}"))?;
    pet.status = PetStatus::Adopted;
    s.update_pet(&mut snap, &pet, pet.version)
        .await
        .map_err(|e| format!("update: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let feed = s.list_open_pets().await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = feed.iter().map(|p| p.id.as_str()).collect();
    if ids != ["pet-2"] {
        return Err(format!("expected only pet-2 in feed, got {ids:?}"));
    }
    Ok(())
}
