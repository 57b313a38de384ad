//! Lifecycle states derived from a pet row and its adoption fact.
//!
//! The store keeps nullable columns; this module is the only place that
//! interprets their combinations.

use std::fmt;

use adopet_storage::{AdoptionRecord, PetRecord, PetStatus};
use serde::Serialize;
use time::OffsetDateTime;

/// Tag of a [`LifecycleState`], for logs, errors, and projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StateName {
    Open,
    Nominated,
    AwaitingFinalization,
    Finalized,
    Rejected,
}

impl StateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::Open => "OPEN",
            StateName::Nominated => "NOMINATED",
            StateName::AwaitingFinalization => "AWAITING_FINALIZATION",
            StateName::Finalized => "FINALIZED",
            StateName::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a pet stands in the adoption lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listed and available.
    Open,
    /// The tutor marked the pet adopted. `adopter_id` is the nominated
    /// candidate; `None` when the tutor marked it without naming one.
    Nominated {
        adopter_id: Option<String>,
        marked_at: Option<OffsetDateTime>,
    },
    /// The nominated adopter self-confirmed; waiting for an admin or the
    /// escalation window.
    AwaitingFinalization {
        adopter_id: Option<String>,
        marked_at: Option<OffsetDateTime>,
        adopter_confirmed_at: OffsetDateTime,
    },
    /// An adoption fact exists. `rejected_at` is the post-hoc rejection badge.
    Finalized {
        adoption: AdoptionRecord,
        platform_confirmed_at: Option<OffsetDateTime>,
        rejected_at: Option<OffsetDateTime>,
    },
    /// The nomination was rejected before any adoption was registered.
    Rejected {
        rejected_at: OffsetDateTime,
        reason: Option<String>,
    },
}

impl LifecycleState {
    pub fn derive(pet: &PetRecord, adoption: Option<&AdoptionRecord>) -> Self {
        if let Some(adoption) = adoption {
            return LifecycleState::Finalized {
                adoption: adoption.clone(),
                platform_confirmed_at: pet.adopet_confirmed_at,
                rejected_at: pet.adoption_rejected_at,
            };
        }
        if let Some(rejected_at) = pet.adoption_rejected_at {
            return LifecycleState::Rejected {
                rejected_at,
                reason: pet.adoption_rejection_reason.clone(),
            };
        }
        if pet.status == PetStatus::Available {
            return LifecycleState::Open;
        }
        match pet.adopter_confirmed_at {
            Some(adopter_confirmed_at) => LifecycleState::AwaitingFinalization {
                adopter_id: pet.pending_adopter_id.clone(),
                marked_at: pet.marked_adopted_at,
                adopter_confirmed_at,
            },
            None => LifecycleState::Nominated {
                adopter_id: pet.pending_adopter_id.clone(),
                marked_at: pet.marked_adopted_at,
            },
        }
    }

    pub fn name(&self) -> StateName {
        match self {
            LifecycleState::Open => StateName::Open,
            LifecycleState::Nominated { .. } => StateName::Nominated,
            LifecycleState::AwaitingFinalization { .. } => StateName::AwaitingFinalization,
            LifecycleState::Finalized { .. } => StateName::Finalized,
            LifecycleState::Rejected { .. } => StateName::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2026-03-01 12:00 UTC);

    fn pet() -> PetRecord {
        PetRecord::listed("pet-1", "tutor-1", "Rex", T0)
    }

    fn adoption() -> AdoptionRecord {
        AdoptionRecord {
            id: AdoptionRecord::id_for_pet("pet-1"),
            pet_id: "pet-1".to_string(),
            tutor_id: "tutor-1".to_string(),
            adopter_id: "adopter-1".to_string(),
            adopted_at: T0,
        }
    }

    #[test]
    fn available_pet_is_open() {
        assert_eq!(LifecycleState::derive(&pet(), None), LifecycleState::Open);
    }

    #[test]
    fn marked_pet_with_candidate_is_nominated() {
        let mut p = pet();
        p.status = PetStatus::Adopted;
        p.pending_adopter_id = Some("adopter-1".to_string());
        p.marked_adopted_at = Some(T0);
        assert_eq!(
            LifecycleState::derive(&p, None),
            LifecycleState::Nominated {
                adopter_id: Some("adopter-1".to_string()),
                marked_at: Some(T0),
            }
        );
    }

    #[test]
    fn adopter_confirmation_moves_to_awaiting() {
        let mut p = pet();
        p.status = PetStatus::Adopted;
        p.pending_adopter_id = Some("adopter-1".to_string());
        p.adopter_confirmed_at = Some(T0);
        assert_eq!(
            LifecycleState::derive(&p, None).name(),
            StateName::AwaitingFinalization
        );
    }

    #[test]
    fn rejection_without_adoption_is_rejected() {
        let mut p = pet();
        p.status = PetStatus::Adopted;
        p.adopter_confirmed_at = Some(T0);
        p.adoption_rejected_at = Some(T0);
        p.adoption_rejection_reason = Some("fraud".to_string());
        assert_eq!(
            LifecycleState::derive(&p, None),
            LifecycleState::Rejected {
                rejected_at: T0,
                reason: Some("fraud".to_string()),
            }
        );
    }

    #[test]
    fn adoption_fact_wins_over_every_column() {
        let mut p = pet();
        p.adoption_rejected_at = Some(T0);
        let state = LifecycleState::derive(&p, Some(&adoption()));
        match state {
            LifecycleState::Finalized {
                rejected_at,
                platform_confirmed_at,
                ..
            } => {
                assert_eq!(rejected_at, Some(T0));
                assert_eq!(platform_confirmed_at, None);
            }
            other => panic!("expected Finalized, got {other:?}"),
        }
    }

    #[test]
    fn state_names_match_wire_form() {
        assert_eq!(
            serde_json::to_string(&StateName::AwaitingFinalization).unwrap(),
            "\"AWAITING_FINALIZATION\""
        );
        assert_eq!(StateName::Rejected.to_string(), "REJECTED");
    }
}
