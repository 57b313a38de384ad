//! Lifecycle operations through the transactional service.

mod common;

use std::sync::Arc;

use adopet_lifecycle::{ErrorKind, NotificationKind, Outcome, Party, StateName, TransitionError};
use adopet_service::{AdoptionService, ManualClock, ServiceError};
use adopet_storage::{AdoptionStorage, MemoryStorage, PetStatus};
use common::{FailingNotifier, Harness, RecordingGamification, T0};
use time::Duration;

fn kind(result: Result<impl std::fmt::Debug, ServiceError>) -> ErrorKind {
    result
        .unwrap_err()
        .kind()
        .expect("lifecycle error, not a storage failure")
}

// ── Happy path ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn nominate_confirm_register_creates_single_fact() {
    let h = Harness::new();
    h.listed("pet-1").await;

    let r = h.service.nominate("pet-1", "tutor-1", "adopter-1").await.unwrap();
    assert_eq!((r.from, r.view.state), (StateName::Open, StateName::Nominated));
    assert_eq!(r.view.status, PetStatus::Adopted);

    h.clock.advance(Duration::hours(1));
    let r = h.service.confirm_by_adopter("pet-1", "adopter-1").await.unwrap();
    assert_eq!(r.view.state, StateName::AwaitingFinalization);

    h.clock.advance(Duration::hours(1));
    let r = h.service.register_adoption("pet-1", None).await.unwrap();
    assert_eq!(r.outcome, Outcome::Applied);
    assert_eq!(r.view.state, StateName::Finalized);
    assert_eq!(r.view.pending_adopter_id, None);
    assert_eq!(r.view.platform_confirmed_at, None);

    let fact = h.storage.get_adoption("pet-1").await.unwrap().unwrap();
    assert_eq!(fact.tutor_id, "tutor-1");
    assert_eq!(fact.adopter_id, "adopter-1");
    assert_eq!(fact.adopted_at, T0 + Duration::hours(2));
    assert_eq!(r.view.adoption, Some(fact));
}

#[tokio::test]
async fn registration_notifies_both_parties_and_credits_points() {
    let h = Harness::new();
    h.awaiting("pet-1").await;
    h.service.register_adoption("pet-1", None).await.unwrap();
    h.service.flush().await;

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        h.notifier.recipients(NotificationKind::AdoptionFinalized),
        vec!["tutor-1", "adopter-1"]
    );
    assert_eq!(sent[0].payload.recipient, Party::Tutor);
    assert_eq!(sent[1].payload.recipient, Party::Adopter);
    assert!(!sent[0].payload.platform_confirmed);
    assert_eq!(
        h.gamification.credited(),
        vec![("tutor-1".to_string(), "adopter-1".to_string())]
    );
}

#[tokio::test]
async fn explicit_adopter_overrides_nomination() {
    let h = Harness::new();
    h.awaiting("pet-1").await;
    let r = h
        .service
        .register_adoption("pet-1", Some("adopter-2"))
        .await
        .unwrap();
    assert_eq!(r.view.adoption.unwrap().adopter_id, "adopter-2");
}

#[tokio::test]
async fn registration_clears_interest_artifacts() {
    let h = Harness::new();
    h.listed("pet-1").await;
    h.service.record_interest("pet-1", "fan-1").await.unwrap();
    h.service.record_interest("pet-1", "fan-2").await.unwrap();
    h.service.record_interest("pet-1", "fan-1").await.unwrap();
    assert_eq!(h.service.interests("pet-1").await.unwrap(), vec!["fan-1", "fan-2"]);

    h.service
        .register_adoption("pet-1", Some("adopter-1"))
        .await
        .unwrap();
    assert!(h.service.interests("pet-1").await.unwrap().is_empty());
}

// ── Platform confirmation ────────────────────────────────────────────────────

#[tokio::test]
async fn confirm_by_platform_twice_notifies_once() {
    let h = Harness::new();
    h.registered("pet-1").await;
    h.service.flush().await;

    h.clock.advance(Duration::hours(3));
    let first = h.service.confirm_by_platform("pet-1").await.unwrap();
    assert_eq!(first.outcome, Outcome::Applied);
    let stamped = first.view.platform_confirmed_at;
    assert_eq!(stamped, Some(T0 + Duration::hours(3)));

    h.clock.advance(Duration::hours(3));
    let second = h.service.confirm_by_platform("pet-1").await.unwrap();
    assert_eq!(second.outcome, Outcome::NoOp);
    assert_eq!(second.view.platform_confirmed_at, stamped);
    h.service.flush().await;

    assert_eq!(
        h.notifier.recipients(NotificationKind::PlatformConfirmed),
        vec!["tutor-1", "adopter-1"]
    );
    let pet = h.storage.get_pet("pet-1").await.unwrap();
    assert_eq!(pet.adopet_confirmed_at, stamped);
}

#[tokio::test]
async fn confirm_without_adoption_is_not_found() {
    let h = Harness::new();
    h.awaiting("pet-1").await;
    assert_eq!(kind(h.service.confirm_by_platform("pet-1").await), ErrorKind::NotFound);
    assert_eq!(
        kind(h.service.reject_by_platform("pet-1", None).await),
        ErrorKind::NotFound
    );
    assert_eq!(kind(h.service.confirm_by_platform("ghost").await), ErrorKind::NotFound);
}

#[tokio::test]
async fn post_hoc_rejection_keeps_the_fact() {
    let h = Harness::new();
    h.registered("pet-1").await;
    let fact = h.storage.get_adoption("pet-1").await.unwrap();

    h.clock.advance(Duration::days(3));
    let r = h
        .service
        .reject_by_platform("pet-1", Some("pet returned"))
        .await
        .unwrap();
    assert_eq!(r.view.state, StateName::Finalized);
    assert_eq!(r.view.rejected_at, Some(T0 + Duration::days(3)));
    assert_eq!(r.view.rejection_reason.as_deref(), Some("pet returned"));
    assert_eq!(h.storage.get_adoption("pet-1").await.unwrap(), fact);

    let again = h.service.reject_by_platform("pet-1", None).await.unwrap();
    assert_eq!(again.outcome, Outcome::NoOp);
}

#[tokio::test]
async fn post_hoc_rejection_keeps_earlier_confirmation() {
    let h = Harness::new();
    h.registered("pet-1").await;
    h.service.confirm_by_platform("pet-1").await.unwrap();

    h.clock.advance(Duration::days(1));
    let r = h.service.reject_by_platform("pet-1", None).await.unwrap();
    assert_eq!(r.view.platform_confirmed_at, Some(T0));
    assert_eq!(r.view.rejected_at, Some(T0 + Duration::days(1)));

    h.clock.advance(Duration::days(1));
    let r = h.service.confirm_by_platform("pet-1").await.unwrap();
    assert_eq!(r.outcome, Outcome::Applied);
    assert_eq!(r.view.platform_confirmed_at, Some(T0 + Duration::days(2)));
    assert_eq!(r.view.rejected_at, None);
}

// ── Guards ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn self_adoption_fails_in_every_state() {
    let h = Harness::new();
    h.listed("open").await;
    h.listed("nominated").await;
    h.service
        .nominate("nominated", "tutor-1", "adopter-1")
        .await
        .unwrap();
    h.awaiting("awaiting").await;
    h.awaiting("rejected").await;
    h.service.reject_nomination("rejected", None).await.unwrap();

    for pet_id in ["open", "nominated", "awaiting", "rejected"] {
        let err = h
            .service
            .register_adoption(pet_id, Some("tutor-1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidTransition), "{pet_id}");
        assert!(
            matches!(
                err,
                ServiceError::Transition(TransitionError::SelfAdoptionForbidden { .. })
            ),
            "{pet_id}: {err}"
        );
        assert!(h.storage.get_adoption(pet_id).await.unwrap().is_none());
    }
}

#[tokio::test]
async fn register_without_any_adopter_creates_nothing() {
    let h = Harness::new();
    h.listed("pet-1").await;
    let err = h.service.register_adoption("pet-1", None).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transition(TransitionError::MissingAdopter { .. })
    ));
    assert!(h.storage.get_adoption("pet-1").await.unwrap().is_none());

    let pet = h.storage.get_pet("pet-1").await.unwrap();
    assert_eq!(pet.status, PetStatus::Available);
    assert_eq!(pet.version, 0);
}

#[tokio::test]
async fn second_registration_is_already_finalized() {
    let h = Harness::new();
    h.registered("pet-1").await;
    assert_eq!(
        kind(h.service.register_adoption("pet-1", Some("adopter-2")).await),
        ErrorKind::AlreadyFinalized
    );
    assert_eq!(
        h.storage.get_adoption("pet-1").await.unwrap().unwrap().adopter_id,
        "adopter-1"
    );
}

#[tokio::test]
async fn only_owner_nominates_and_only_candidate_confirms() {
    let h = Harness::new();
    h.listed("pet-1").await;
    assert_eq!(
        kind(h.service.nominate("pet-1", "stranger", "adopter-1").await),
        ErrorKind::InvalidTransition
    );
    h.service.nominate("pet-1", "tutor-1", "adopter-1").await.unwrap();
    assert_eq!(
        kind(h.service.confirm_by_adopter("pet-1", "adopter-2").await),
        ErrorKind::InvalidTransition
    );
}

#[tokio::test]
async fn duplicate_listing_is_storage_error() {
    let h = Harness::new();
    h.listed("pet-1").await;
    let err = h.service.list_pet("pet-1", "tutor-2", "Other").await.unwrap_err();
    assert_eq!(err.kind(), None);
}

// ── Nomination rejection ─────────────────────────────────────────────────────

#[tokio::test]
async fn rejected_nomination_stays_off_feed_without_credit() {
    let h = Harness::new();
    h.listed("still-open").await;
    h.awaiting("pet-1").await;

    let r = h
        .service
        .reject_nomination("pet-1", Some("adopter unreachable"))
        .await
        .unwrap();
    assert_eq!(r.view.state, StateName::Rejected);
    assert_eq!(r.view.status, PetStatus::Adopted);

    let feed: Vec<String> = h
        .service
        .open_feed()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.pet_id)
        .collect();
    assert_eq!(feed, vec!["still-open"]);

    h.service.flush().await;
    assert!(h.gamification.credited().is_empty());
    assert!(h.notifier.sent().is_empty());

    let again = h.service.reject_nomination("pet-1", None).await.unwrap();
    assert_eq!(again.outcome, Outcome::NoOp);
}

#[tokio::test]
async fn admin_can_register_after_rejecting_nomination() {
    let h = Harness::new();
    h.awaiting("pet-1").await;
    h.service.reject_nomination("pet-1", None).await.unwrap();

    // The nominated candidate was cleared with the rejection.
    assert_eq!(
        kind(h.service.register_adoption("pet-1", None).await),
        ErrorKind::InvalidTransition
    );

    let r = h
        .service
        .register_adoption("pet-1", Some("adopter-2"))
        .await
        .unwrap();
    assert_eq!((r.from, r.view.state), (StateName::Rejected, StateName::Finalized));
    assert_eq!(r.view.rejected_at, None);
}

#[tokio::test]
async fn reject_nomination_after_registration_is_already_finalized() {
    let h = Harness::new();
    h.registered("pet-1").await;
    assert_eq!(
        kind(h.service.reject_nomination("pet-1", None).await),
        ErrorKind::AlreadyFinalized
    );
}

// ── Side-effect isolation ────────────────────────────────────────────────────

#[tokio::test]
async fn failing_notifier_does_not_fail_the_transition() {
    let storage = Arc::new(MemoryStorage::new());
    let gamification = Arc::new(RecordingGamification::default());
    let service = AdoptionService::new(
        storage.clone(),
        Arc::new(ManualClock::new(T0)),
        Arc::new(FailingNotifier),
        gamification.clone(),
    );
    service.list_pet("pet-1", "tutor-1", "Bolt").await.unwrap();

    let r = service
        .register_adoption("pet-1", Some("adopter-1"))
        .await
        .unwrap();
    assert_eq!(r.outcome, Outcome::Applied);
    service.flush().await;

    assert!(storage.get_adoption("pet-1").await.unwrap().is_some());
    assert_eq!(gamification.credited().len(), 1);

    let r = service.confirm_by_platform("pet-1").await.unwrap();
    assert_eq!(r.outcome, Outcome::Applied);
}

// ── Projections ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn view_serializes_state_and_timestamps() {
    let h = Harness::new();
    h.registered("pet-1").await;
    let view = h.service.view("pet-1").await.unwrap();
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["state"], "FINALIZED");
    assert_eq!(json["status"], "ADOPTED");
    assert_eq!(json["adoption"]["adopter_id"], "adopter-1");
    assert_eq!(json["adoption"]["adopted_at"], "2026-04-01T09:00:00Z");
    assert!(json["platform_confirmed_at"].is_null());
}

#[tokio::test]
async fn every_applied_transition_bumps_the_version() {
    let h = Harness::new();
    h.awaiting("pet-1").await;
    assert_eq!(h.storage.get_pet("pet-1").await.unwrap().version, 2);

    // A no-op writes nothing.
    h.service.confirm_by_adopter("pet-1", "adopter-1").await.unwrap();
    assert_eq!(h.storage.get_pet("pet-1").await.unwrap().version, 2);

    h.service.register_adoption("pet-1", None).await.unwrap();
    assert_eq!(h.storage.get_pet("pet-1").await.unwrap().version, 3);
}
