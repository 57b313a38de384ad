//! Transition table for the adoption lifecycle.
//!
//! | From | Action | To |
//! |---|---|---|
//! | OPEN | `Nominate` | NOMINATED |
//! | NOMINATED | `AdopterConfirm` | AWAITING_FINALIZATION |
//! | any but FINALIZED | `Register` | FINALIZED |
//! | AWAITING_FINALIZATION (window elapsed) | `SystemTimeout` | FINALIZED, platform-confirmed |
//! | NOMINATED, AWAITING_FINALIZATION | `RejectNomination` | REJECTED |
//! | FINALIZED | `PlatformConfirm` | FINALIZED, platform-confirmed |
//! | FINALIZED | `PlatformReject` | FINALIZED, rejection badge |
//! | FINALIZED (window elapsed, unconfirmed) | `SystemReconcile` | FINALIZED, platform-confirmed |
//!
//! Actions driven by the escalation scheduler never fail because a pet no
//! longer qualifies; they return [`Outcome::NoOp`] so a sweep that lost a
//! race with a human actor moves on quietly.

use adopet_storage::{AdoptionRecord, PetRecord, PetStatus};
use serde::Serialize;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::error::TransitionError;
use crate::state::{LifecycleState, StateName};

/// How long a self-confirmed nomination or an unconfirmed adoption waits
/// before the scheduler advances it.
pub const DEFAULT_CONFIRMATION_WINDOW: Duration = Duration::hours(48);

/// Inputs the engine needs besides the rows themselves.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    pub now: OffsetDateTime,
    pub confirmation_window: Duration,
}

impl Context {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now,
            confirmation_window: DEFAULT_CONFIRMATION_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.confirmation_window = window;
        self
    }

    /// Anything stamped at or before this instant has waited out the window.
    ///
    /// Saturates at the earliest representable instant, so a window longer
    /// than the calendar allows matches nothing.
    pub fn cutoff(&self) -> OffsetDateTime {
        self.now
            .checked_sub(self.confirmation_window)
            .unwrap_or_else(|| PrimitiveDateTime::MIN.assume_utc())
    }
}

/// An actor's request against one pet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Tutor proposes a specific adopter.
    Nominate { tutor_id: String, adopter_id: String },
    /// The nominated adopter confirms taking the pet.
    AdopterConfirm { adopter_id: String },
    /// Admin registers the adoption; an explicit adopter overrides the nomination.
    Register { adopter_id: Option<String> },
    /// Scheduler: the self-confirmed nomination outlived the window.
    SystemTimeout,
    /// Admin rejects the tutor's nomination before anything is registered.
    RejectNomination { reason: Option<String> },
    /// Admin affirms a registered adoption. On a post-hoc-rejected adoption
    /// this reverses the rejection and re-stamps the badge.
    PlatformConfirm,
    /// Admin flags a registered adoption after the fact. Only the rejection
    /// stamp and reason are added; an earlier platform confirmation stays on
    /// the record.
    PlatformReject { reason: Option<String> },
    /// Scheduler: a registered adoption outlived the window unconfirmed.
    SystemReconcile,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Nominate { .. } => "nominate",
            Action::AdopterConfirm { .. } => "confirm_by_adopter",
            Action::Register { .. } => "register",
            Action::SystemTimeout => "system_timeout",
            Action::RejectNomination { .. } => "reject_nomination",
            Action::PlatformConfirm => "confirm_by_platform",
            Action::PlatformReject { .. } => "reject_by_platform",
            Action::SystemReconcile => "system_reconcile",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// The adoption was registered.
    AdoptionFinalized,
    /// The platform confirmed an already registered adoption.
    PlatformConfirmed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::AdoptionFinalized => "adoption_finalized",
            NotificationKind::PlatformConfirmed => "platform_confirmed",
        }
    }
}

/// Which side of the adoption a notification addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Tutor,
    Adopter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub pet_id: String,
    pub pet_name: String,
    pub tutor_id: String,
    pub adopter_id: String,
    pub recipient: Party,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: OffsetDateTime,
    pub platform_confirmed: bool,
}

/// Work to do after the transaction commits. Best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    Notify {
        user_id: String,
        kind: NotificationKind,
        payload: NotificationPayload,
    },
    AwardAdoption {
        tutor_id: String,
        adopter_id: String,
    },
}

/// What the orchestrator must write and fire for one action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub from: StateName,
    pub to: StateName,
    /// Updated pet row, if it changes.
    pub pet: Option<PetRecord>,
    /// Adoption fact to insert, if one is created.
    pub adoption: Option<AdoptionRecord>,
    /// Drop favorites/interest artifacts tied to the pet.
    pub clear_interests: bool,
    pub effects: Vec<SideEffect>,
}

impl Decision {
    fn no_op(state: StateName) -> Self {
        Self {
            outcome: Outcome::NoOp,
            from: state,
            to: state,
            pet: None,
            adoption: None,
            clear_interests: false,
            effects: Vec::new(),
        }
    }

    fn update(from: StateName, to: StateName, pet: PetRecord) -> Self {
        Self {
            outcome: Outcome::Applied,
            from,
            to,
            pet: Some(pet),
            adoption: None,
            clear_interests: false,
            effects: Vec::new(),
        }
    }
}

/// Decide the effect of `action` on pet `pet_id`.
///
/// `pet` is `None` when the row does not exist. `adoption` is the pet's
/// adoption fact as read inside the caller's transaction.
pub fn decide(
    ctx: &Context,
    pet_id: &str,
    pet: Option<&PetRecord>,
    adoption: Option<&AdoptionRecord>,
    action: &Action,
) -> Result<Decision, TransitionError> {
    let pet = pet.ok_or_else(|| TransitionError::PetNotFound {
        pet_id: pet_id.to_string(),
    })?;
    let state = LifecycleState::derive(pet, adoption);
    let from = state.name();
    let invalid = || TransitionError::InvalidState {
        pet_id: pet.id.clone(),
        action: action.name(),
        state: from,
    };

    match action {
        Action::Nominate {
            tutor_id,
            adopter_id,
        } => {
            if !matches!(state, LifecycleState::Open) {
                return Err(invalid());
            }
            if *tutor_id != pet.owner_id {
                return Err(TransitionError::NotOwner {
                    pet_id: pet.id.clone(),
                    user_id: tutor_id.clone(),
                });
            }
            ensure_not_owner(pet, adopter_id)?;
            let mut next = pet.clone();
            next.status = PetStatus::Adopted;
            next.pending_adopter_id = Some(adopter_id.clone());
            next.marked_adopted_at = Some(ctx.now);
            next.adopter_confirmed_at = None;
            next.updated_at = ctx.now;
            Ok(Decision::update(from, StateName::Nominated, next))
        }

        Action::AdopterConfirm { adopter_id } => match &state {
            LifecycleState::Nominated {
                adopter_id: Some(candidate),
                ..
            } if candidate == adopter_id => {
                let mut next = pet.clone();
                next.adopter_confirmed_at = Some(ctx.now);
                next.updated_at = ctx.now;
                Ok(Decision::update(
                    from,
                    StateName::AwaitingFinalization,
                    next,
                ))
            }
            LifecycleState::AwaitingFinalization {
                adopter_id: Some(candidate),
                ..
            } if candidate == adopter_id => Ok(Decision::no_op(from)),
            LifecycleState::Nominated { .. } | LifecycleState::AwaitingFinalization { .. } => {
                Err(TransitionError::NotNominatedAdopter {
                    pet_id: pet.id.clone(),
                    user_id: adopter_id.clone(),
                })
            }
            _ => Err(invalid()),
        },

        Action::Register { adopter_id } => {
            if let Some(explicit) = adopter_id {
                ensure_not_owner(pet, explicit)?;
            }
            if adoption.is_some() {
                return Err(TransitionError::DuplicateAdoption {
                    pet_id: pet.id.clone(),
                });
            }
            let effective = adopter_id
                .as_ref()
                .or(pet.pending_adopter_id.as_ref())
                .ok_or_else(|| TransitionError::MissingAdopter {
                    pet_id: pet.id.clone(),
                })?;
            ensure_not_owner(pet, effective)?;
            Ok(finalize(ctx, from, pet, effective, false))
        }

        Action::SystemTimeout => match &state {
            LifecycleState::AwaitingFinalization {
                adopter_id: Some(candidate),
                marked_at: Some(marked_at),
                ..
            } if *marked_at <= ctx.cutoff() => {
                ensure_not_owner(pet, candidate)?;
                Ok(finalize(ctx, from, pet, candidate, true))
            }
            _ => Ok(Decision::no_op(from)),
        },

        Action::RejectNomination { reason } => match &state {
            LifecycleState::Nominated { .. } | LifecycleState::AwaitingFinalization { .. } => {
                let mut next = pet.clone();
                next.adoption_rejected_at = Some(ctx.now);
                next.adoption_rejection_reason = reason.clone();
                next.pending_adopter_id = None;
                next.updated_at = ctx.now;
                Ok(Decision::update(from, StateName::Rejected, next))
            }
            LifecycleState::Rejected { .. } => Ok(Decision::no_op(from)),
            LifecycleState::Finalized { .. } => Err(TransitionError::DuplicateAdoption {
                pet_id: pet.id.clone(),
            }),
            LifecycleState::Open => Err(invalid()),
        },

        Action::PlatformConfirm => match &state {
            LifecycleState::Finalized {
                adoption,
                platform_confirmed_at,
                rejected_at,
            } if platform_confirmed_at.is_none() || rejected_at.is_some() => {
                Ok(platform_confirm(ctx, from, pet, adoption))
            }
            LifecycleState::Finalized { .. } => Ok(Decision::no_op(from)),
            _ => Err(TransitionError::NoAdoptionRecord {
                pet_id: pet.id.clone(),
            }),
        },

        Action::PlatformReject { reason } => match &state {
            LifecycleState::Finalized {
                rejected_at: None, ..
            } => {
                let mut next = pet.clone();
                next.adoption_rejected_at = Some(ctx.now);
                next.adoption_rejection_reason = reason.clone();
                next.updated_at = ctx.now;
                Ok(Decision::update(from, StateName::Finalized, next))
            }
            LifecycleState::Finalized { .. } => Ok(Decision::no_op(from)),
            _ => Err(TransitionError::NoAdoptionRecord {
                pet_id: pet.id.clone(),
            }),
        },

        Action::SystemReconcile => match &state {
            LifecycleState::Finalized {
                adoption,
                platform_confirmed_at: None,
                rejected_at: None,
            } if adoption.adopted_at <= ctx.cutoff() => {
                Ok(platform_confirm(ctx, from, pet, adoption))
            }
            _ => Ok(Decision::no_op(from)),
        },
    }
}

fn ensure_not_owner(pet: &PetRecord, adopter_id: &str) -> Result<(), TransitionError> {
    if adopter_id == pet.owner_id {
        return Err(TransitionError::SelfAdoptionForbidden {
            pet_id: pet.id.clone(),
            user_id: adopter_id.to_string(),
        });
    }
    Ok(())
}

/// Create the adoption fact. `auto_confirm` stamps the platform badge at
/// creation time, which is how the escalation path skips the manual confirm.
fn finalize(
    ctx: &Context,
    from: StateName,
    pet: &PetRecord,
    adopter_id: &str,
    auto_confirm: bool,
) -> Decision {
    let mut next = pet.clone();
    next.status = PetStatus::Adopted;
    next.pending_adopter_id = None;
    next.marked_adopted_at = next.marked_adopted_at.or(Some(ctx.now));
    next.adoption_rejected_at = None;
    next.adoption_rejection_reason = None;
    if auto_confirm {
        next.adopet_confirmed_at = Some(ctx.now);
    }
    next.updated_at = ctx.now;

    let adoption = AdoptionRecord {
        id: AdoptionRecord::id_for_pet(&pet.id),
        pet_id: pet.id.clone(),
        tutor_id: pet.owner_id.clone(),
        adopter_id: adopter_id.to_string(),
        adopted_at: ctx.now,
    };

    let mut effects = notify_both(
        ctx,
        pet,
        &adoption,
        NotificationKind::AdoptionFinalized,
        auto_confirm,
    );
    effects.push(SideEffect::AwardAdoption {
        tutor_id: adoption.tutor_id.clone(),
        adopter_id: adoption.adopter_id.clone(),
    });

    Decision {
        outcome: Outcome::Applied,
        from,
        to: StateName::Finalized,
        pet: Some(next),
        adoption: Some(adoption),
        clear_interests: true,
        effects,
    }
}

fn platform_confirm(
    ctx: &Context,
    from: StateName,
    pet: &PetRecord,
    adoption: &AdoptionRecord,
) -> Decision {
    let mut next = pet.clone();
    next.adopet_confirmed_at = Some(ctx.now);
    next.adoption_rejected_at = None;
    next.adoption_rejection_reason = None;
    next.updated_at = ctx.now;

    let mut decision = Decision::update(from, StateName::Finalized, next);
    decision.effects = notify_both(ctx, pet, adoption, NotificationKind::PlatformConfirmed, true);
    decision
}

fn notify_both(
    ctx: &Context,
    pet: &PetRecord,
    adoption: &AdoptionRecord,
    kind: NotificationKind,
    platform_confirmed: bool,
) -> Vec<SideEffect> {
    [
        (adoption.tutor_id.as_str(), Party::Tutor),
        (adoption.adopter_id.as_str(), Party::Adopter),
    ]
    .into_iter()
    .map(|(user_id, recipient)| SideEffect::Notify {
        user_id: user_id.to_string(),
        kind,
        payload: NotificationPayload {
            pet_id: pet.id.clone(),
            pet_name: pet.name.clone(),
            tutor_id: adoption.tutor_id.clone(),
            adopter_id: adoption.adopter_id.clone(),
            recipient,
            occurred_at: ctx.now,
            platform_confirmed,
        },
    })
    .collect()
}
