//! Racing actors against one pet.

mod common;

use adopet_lifecycle::{ErrorKind, NotificationKind, Outcome};
use adopet_storage::AdoptionStorage;
use common::{Harness, T0};
use time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_create_one_adoption() {
    let h = Harness::new();
    h.awaiting("pet-1").await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            let adopter = format!("adopter-{i}");
            service.register_adoption("pet-1", Some(&adopter)).await
        }));
    }

    let mut applied = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(report) => {
                assert_eq!(report.outcome, Outcome::Applied);
                applied += 1;
            }
            Err(e) => {
                assert_eq!(e.kind(), Some(ErrorKind::AlreadyFinalized), "{e}");
                duplicates += 1;
            }
        }
    }
    assert_eq!(applied, 1);
    assert_eq!(duplicates, 7);

    let tables = h.storage.tables().unwrap();
    assert_eq!(tables.adoptions.len(), 1);

    h.service.flush().await;
    assert_eq!(h.notifier.sent().len(), 2);
    assert_eq!(h.gamification.credited().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn admin_confirm_racing_sweep_notifies_once() {
    let h = Harness::new();
    h.registered("pet-1").await;
    h.service.flush().await;
    h.clock.set(T0 + Duration::hours(49));

    let admin = {
        let service = h.service.clone();
        tokio::spawn(async move { service.confirm_by_platform("pet-1").await })
    };
    let sweep = {
        let service = h.service.clone();
        tokio::spawn(async move { service.reconcile().await })
    };
    let admin = admin.await.unwrap().unwrap();
    let sweep = sweep.await.unwrap();

    // Exactly one of them applied; the other saw the badge and did nothing.
    let admin_applied = usize::from(admin.outcome == Outcome::Applied);
    assert_eq!(admin_applied + sweep.confirmed, 1);
    assert_eq!(sweep.failed, 0);

    h.service.flush().await;
    assert_eq!(
        h.notifier.recipients(NotificationKind::PlatformConfirmed),
        vec!["tutor-1", "adopter-1"]
    );
    let pet = h.storage.get_pet("pet-1").await.unwrap();
    assert_eq!(pet.adopet_confirmed_at, Some(T0 + Duration::hours(49)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejection_racing_timeout_leaves_consistent_rows() {
    let h = Harness::new();
    h.awaiting("pet-1").await;
    h.clock.set(T0 + Duration::hours(49));

    let reject = {
        let service = h.service.clone();
        tokio::spawn(async move { service.reject_nomination("pet-1", Some("late report")).await })
    };
    let sweep = {
        let service = h.service.clone();
        tokio::spawn(async move { service.reconcile().await })
    };
    let rejected = reject.await.unwrap();
    let sweep = sweep.await.unwrap();

    let pet = h.storage.get_pet("pet-1").await.unwrap();
    let adoption = h.storage.get_adoption("pet-1").await.unwrap();
    if sweep.finalized == 1 {
        // The sweep won; rejecting a registered adoption's nomination is refused.
        assert_eq!(
            rejected.unwrap_err().kind(),
            Some(ErrorKind::AlreadyFinalized)
        );
        assert!(adoption.is_some());
        assert!(pet.adopet_confirmed_at.is_some());
        assert!(!pet.is_rejected());
    } else {
        rejected.unwrap();
        assert!(adoption.is_none());
        assert!(pet.is_rejected());
    }
}
