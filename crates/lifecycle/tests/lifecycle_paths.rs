//! End-to-end walks through the transition table, feeding each decision's
//! rows back into the next call the way the orchestrator does.

use adopet_lifecycle::{decide, Action, Context, Decision, Outcome, StateName};
use adopet_storage::{AdoptionRecord, PetRecord, PetStatus};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

const T0: OffsetDateTime = datetime!(2026-05-10 08:00 UTC);

struct Rows {
    pet: PetRecord,
    adoption: Option<AdoptionRecord>,
}

impl Rows {
    fn listed() -> Self {
        Self {
            pet: PetRecord::listed("pet-7", "tutor-7", "Nina", T0),
            adoption: None,
        }
    }

    fn apply(&mut self, now: OffsetDateTime, action: Action) -> Decision {
        let decision = decide(
            &Context::new(now),
            "pet-7",
            Some(&self.pet),
            self.adoption.as_ref(),
            &action,
        )
        .unwrap_or_else(|e| panic!("{} failed: {e}", action.name()));
        if let Some(pet) = &decision.pet {
            self.pet = pet.clone();
        }
        if let Some(adoption) = &decision.adoption {
            self.adoption = Some(adoption.clone());
        }
        decision
    }
}

fn nominate() -> Action {
    Action::Nominate {
        tutor_id: "tutor-7".to_string(),
        adopter_id: "adopter-7".to_string(),
    }
}

fn adopter_confirms() -> Action {
    Action::AdopterConfirm {
        adopter_id: "adopter-7".to_string(),
    }
}

#[test]
fn unattended_adoption_is_finalized_by_the_window() {
    let mut rows = Rows::listed();
    rows.apply(T0, nominate());
    rows.apply(T0 + Duration::hours(1), adopter_confirms());

    // A tick before the window does nothing.
    let early = rows.apply(T0 + Duration::hours(40), Action::SystemTimeout);
    assert_eq!(early.outcome, Outcome::NoOp);

    let finalize_at = T0 + Duration::hours(49);
    let d = rows.apply(finalize_at, Action::SystemTimeout);
    assert_eq!((d.from, d.to), (StateName::AwaitingFinalization, StateName::Finalized));
    assert_eq!(rows.pet.adopet_confirmed_at, Some(finalize_at));
    assert_eq!(rows.pet.pending_adopter_id, None);
    assert_eq!(rows.adoption.as_ref().unwrap().adopter_id, "adopter-7");

    // Reconciliation finds nothing left to confirm.
    let later = rows.apply(T0 + Duration::hours(200), Action::SystemReconcile);
    assert_eq!(later.outcome, Outcome::NoOp);
}

#[test]
fn manual_finalization_is_confirmed_by_reconciliation() {
    let mut rows = Rows::listed();
    rows.apply(T0, nominate());
    rows.apply(T0, adopter_confirms());
    rows.apply(T0, Action::Register { adopter_id: None });
    let fact = rows.adoption.clone().unwrap();
    assert_eq!(rows.pet.adopet_confirmed_at, None);

    let d = rows.apply(T0 + Duration::hours(49), Action::SystemReconcile);
    assert_eq!(d.outcome, Outcome::Applied);
    assert_eq!(rows.pet.adopet_confirmed_at, Some(T0 + Duration::hours(49)));
    assert_eq!(rows.adoption.unwrap(), fact);
}

#[test]
fn rejected_nomination_stays_off_feed_but_admin_can_override() {
    let mut rows = Rows::listed();
    rows.apply(T0, nominate());
    rows.apply(T0, adopter_confirms());
    rows.apply(
        T0 + Duration::hours(2),
        Action::RejectNomination {
            reason: Some("suspicious".to_string()),
        },
    );
    assert_eq!(rows.pet.status, PetStatus::Adopted);

    let timeout = rows.apply(T0 + Duration::days(5), Action::SystemTimeout);
    assert_eq!(timeout.outcome, Outcome::NoOp);
    assert!(rows.adoption.is_none());

    let d = rows.apply(
        T0 + Duration::days(6),
        Action::Register {
            adopter_id: Some("adopter-8".to_string()),
        },
    );
    assert_eq!((d.from, d.to), (StateName::Rejected, StateName::Finalized));
    assert_eq!(rows.adoption.unwrap().adopter_id, "adopter-8");
    assert!(!rows.pet.is_rejected());
}
