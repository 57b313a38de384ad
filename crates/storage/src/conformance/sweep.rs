//! Escalation sweep candidate-selection conformance tests.
//!
//! Sweep A (`list_stalled_nominations`) and Sweep B
//! (`list_unconfirmed_adoptions`) are cutoff-based: a candidate qualifies
//! when its timestamp is at or before the cutoff.

use std::future::Future;

use time::Duration;

use super::{make_adoption, make_awaiting_pet, make_pet, seed, seed_adoption, TestResult, T0};
use crate::record::PetStatus;
use crate::AdoptionStorage;

pub(super) async fn run_sweep_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "sweep",
        "stalled_nominations_respect_cutoff",
        stalled_nominations_respect_cutoff(factory).await,
    ));
    results.push(TestResult::from_result(
        "sweep",
        "stalled_nominations_exclude_ineligible",
        stalled_nominations_exclude_ineligible(factory).await,
    ));
    results.push(TestResult::from_result(
        "sweep",
        "unconfirmed_adoptions_respect_cutoff",
        unconfirmed_adoptions_respect_cutoff(factory).await,
    ));
    results.push(TestResult::from_result(
        "sweep",
        "unconfirmed_adoptions_exclude_confirmed_and_rejected",
        unconfirmed_adoptions_exclude_confirmed_and_rejected(factory).await,
    ));

    results
}

async fn stalled_nominations_respect_cutoff<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![
            make_awaiting_pet("pet-old", "adopter-1", T0),
            make_awaiting_pet("pet-edge", "adopter-2", T0 + Duration::hours(1)),
            make_awaiting_pet("pet-new", "adopter-3", T0 + Duration::hours(2)),
        ],
    )
    .await?;

    let cutoff = T0 + Duration::hours(1);
    let stalled = s
        .list_stalled_nominations(cutoff)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = stalled.iter().map(|p| p.id.as_str()).collect();
    if ids != ["pet-edge", "pet-old"] {
        return Err(format!("expected [pet-edge, pet-old], got {ids:?}"));
    }
    Ok(())
}

async fn stalled_nominations_exclude_ineligible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut unconfirmed = make_awaiting_pet("pet-unconfirmed", "adopter-1", T0);
    unconfirmed.adopter_confirmed_at = None;

    let mut rejected = make_awaiting_pet("pet-rejected", "adopter-1", T0);
    rejected.adoption_rejected_at = Some(T0 + Duration::hours(2));

    let mut no_candidate = make_awaiting_pet("pet-no-candidate", "adopter-1", T0);
    no_candidate.pending_adopter_id = None;

    let mut available = make_awaiting_pet("pet-available", "adopter-1", T0);
    available.status = PetStatus::Available;

    let finalized = make_awaiting_pet("pet-finalized", "adopter-1", T0);

    seed(
        &s,
        vec![
            unconfirmed,
            rejected,
            no_candidate,
            available,
            finalized,
            make_awaiting_pet("pet-eligible", "adopter-1", T0),
            make_pet("pet-open", "tutor-1"),
        ],
    )
    .await?;
    seed_adoption(&s, make_adoption("pet-finalized", "adopter-1", T0)).await?;

    let stalled = s
        .list_stalled_nominations(T0 + Duration::days(30))
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = stalled.iter().map(|p| p.id.as_str()).collect();
    if ids != ["pet-eligible"] {
        return Err(format!("expected only pet-eligible, got {ids:?}"));
    }
    Ok(())
}

async fn unconfirmed_adoptions_respect_cutoff<S, F, Fut>(factory: &F) -> Result<(), String>
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
    seed_adoption(&s, make_adoption("pet-1", "adopter-1", T0)).await?;
    seed_adoption(
        &s,
        make_adoption("pet-2", "adopter-2", T0 + Duration::hours(5)),
    )
    .await?;

    let due = s
        .list_unconfirmed_adoptions(T0)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = due.iter().map(|a| a.pet_id.as_str()).collect();
    if ids != ["pet-1"] {
        return Err(format!("expected only pet-1 at cutoff T0, got {ids:?}"));
    }
    Ok(())
}

async fn unconfirmed_adoptions_exclude_confirmed_and_rejected<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: AdoptionStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    let mut confirmed = make_pet("pet-confirmed", "tutor-1");
    confirmed.adopet_confirmed_at = Some(T0);
    let mut rejected = make_pet("pet-rejected", "tutor-1");
    rejected.adoption_rejected_at = Some(T0);

    seed(
        &s,
        vec![confirmed, rejected, make_pet("pet-pending", "tutor-1")],
    )
    .await?;
    for pet_id in ["pet-confirmed", "pet-rejected", "pet-pending"] {
        seed_adoption(&s, make_adoption(pet_id, "adopter-1", T0)).await?;
    }

    let due = s
        .list_unconfirmed_adoptions(T0 + Duration::days(3))
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = due.iter().map(|a| a.pet_id.as_str()).collect();
    if ids != ["pet-pending"] {
        return Err(format!("expected only pet-pending, got {ids:?}"));
    }
    Ok(())
}
