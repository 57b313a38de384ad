use std::sync::Arc;

use adopet_lifecycle::{
    decide, Action, Context, Decision, LifecycleState, Outcome, StateName,
    DEFAULT_CONFIRMATION_WINDOW,
};
use adopet_storage::{AdoptionRecord, AdoptionStorage, PetRecord, PetStatus, StorageError};
use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::clock::Clock;
use crate::error::ServiceError;
use crate::outbox::EffectOutbox;
use crate::sinks::{GamificationSink, NotificationSink};

/// Attempts per operation when the store reports a version conflict.
const MAX_ATTEMPTS: u32 = 3;

/// Read projection of a pet's adoption lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdoptionView {
    pub pet_id: String,
    pub pet_name: String,
    pub owner_id: String,
    pub status: PetStatus,
    pub state: StateName,
    pub pending_adopter_id: Option<String>,
    pub adoption: Option<AdoptionRecord>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub platform_confirmed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub rejected_at: Option<OffsetDateTime>,
    pub rejection_reason: Option<String>,
}

impl AdoptionView {
    pub fn from_rows(pet: &PetRecord, adoption: Option<&AdoptionRecord>) -> Self {
        Self {
            pet_id: pet.id.clone(),
            pet_name: pet.name.clone(),
            owner_id: pet.owner_id.clone(),
            status: pet.status,
            state: LifecycleState::derive(pet, adoption).name(),
            pending_adopter_id: pet.pending_adopter_id.clone(),
            adoption: adoption.cloned(),
            platform_confirmed_at: pet.adopet_confirmed_at,
            rejected_at: pet.adoption_rejected_at,
            rejection_reason: pet.adoption_rejection_reason.clone(),
        }
    }
}

/// Result of one lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub outcome: Outcome,
    /// State before the action; `view.state` is the state after it.
    pub from: StateName,
    pub view: AdoptionView,
}

/// Per-run counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Stalled nominations finalized by the timeout sweep.
    pub finalized: usize,
    /// Registered adoptions platform-confirmed by the reconcile sweep.
    pub confirmed: usize,
    /// Candidates that no longer qualified once locked.
    pub skipped: usize,
    /// Candidates whose transaction failed; retried on the next run.
    pub failed: usize,
}

impl ReconcileReport {
    /// Records advanced by this run.
    pub fn advanced(&self) -> usize {
        self.finalized + self.confirmed
    }
}

/// Rows written by one committed attempt.
struct Applied {
    decision: Decision,
    pet: PetRecord,
    adoption: Option<AdoptionRecord>,
    interests_cleared: usize,
}

/// Transactional orchestrator over an [`AdoptionStorage`] backend.
///
/// Every mutating call locks the pet row, lets the lifecycle engine decide,
/// writes the decision, commits, and only then enqueues side effects.
pub struct AdoptionService<S: AdoptionStorage> {
    storage: Arc<S>,
    clock: Arc<dyn Clock>,
    outbox: EffectOutbox,
    confirmation_window: Duration,
}

impl<S: AdoptionStorage> AdoptionService<S> {
    /// Must be called inside a tokio runtime; the outbox worker is spawned here.
    pub fn new(
        storage: Arc<S>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
        gamification: Arc<dyn GamificationSink>,
    ) -> Self {
        Self {
            storage,
            clock,
            outbox: EffectOutbox::spawn(notifier, gamification),
            confirmation_window: DEFAULT_CONFIRMATION_WINDOW,
        }
    }

    pub fn with_confirmation_window(mut self, window: Duration) -> Self {
        self.confirmation_window = window;
        self
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn confirmation_window(&self) -> Duration {
        self.confirmation_window
    }

    fn context(&self) -> Context {
        Context::new(self.clock.now()).with_window(self.confirmation_window)
    }

    // ── Actor operations ─────────────────────────────────────────────────────

    /// Tutor marks their pet adopted by `adopter_id`.
    pub async fn nominate(
        &self,
        pet_id: &str,
        tutor_id: &str,
        adopter_id: &str,
    ) -> Result<TransitionReport, ServiceError> {
        self.execute(
            pet_id,
            Action::Nominate {
                tutor_id: tutor_id.to_string(),
                adopter_id: adopter_id.to_string(),
            },
        )
        .await
    }

    /// The nominated adopter confirms.
    pub async fn confirm_by_adopter(
        &self,
        pet_id: &str,
        adopter_id: &str,
    ) -> Result<TransitionReport, ServiceError> {
        self.execute(
            pet_id,
            Action::AdopterConfirm {
                adopter_id: adopter_id.to_string(),
            },
        )
        .await
    }

    /// Admin registers the adoption. An explicit adopter takes precedence
    /// over the tutor's nomination.
    pub async fn register_adoption(
        &self,
        pet_id: &str,
        adopter_id: Option<&str>,
    ) -> Result<TransitionReport, ServiceError> {
        self.execute(
            pet_id,
            Action::Register {
                adopter_id: adopter_id.map(str::to_string),
            },
        )
        .await
    }

    pub async fn confirm_by_platform(&self, pet_id: &str) -> Result<TransitionReport, ServiceError> {
        self.execute(pet_id, Action::PlatformConfirm).await
    }

    pub async fn reject_by_platform(
        &self,
        pet_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionReport, ServiceError> {
        self.execute(
            pet_id,
            Action::PlatformReject {
                reason: reason.map(str::to_string),
            },
        )
        .await
    }

    pub async fn reject_nomination(
        &self,
        pet_id: &str,
        reason: Option<&str>,
    ) -> Result<TransitionReport, ServiceError> {
        self.execute(
            pet_id,
            Action::RejectNomination {
                reason: reason.map(str::to_string),
            },
        )
        .await
    }

    /// Finalize one stalled nomination if it still qualifies once locked.
    pub async fn finalize_stalled(&self, pet_id: &str) -> Result<TransitionReport, ServiceError> {
        self.execute(pet_id, Action::SystemTimeout).await
    }

    /// Platform-confirm one stale adoption if it still qualifies once locked.
    pub async fn confirm_stale(&self, pet_id: &str) -> Result<TransitionReport, ServiceError> {
        self.execute(pet_id, Action::SystemReconcile).await
    }

    /// Run both escalation sweeps once.
    ///
    /// Each candidate gets its own transaction. A failure is logged and
    /// counted and the sweep moves on; the next run picks the record up again.
    pub async fn reconcile(&self) -> ReconcileReport {
        let cutoff = self.context().cutoff();
        let mut report = ReconcileReport::default();

        match self.storage.list_stalled_nominations(cutoff).await {
            Ok(pets) => {
                for pet in pets {
                    match self.finalize_stalled(&pet.id).await {
                        Ok(r) if r.outcome == Outcome::Applied => report.finalized += 1,
                        Ok(_) => report.skipped += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(pet_id = %pet.id, error = %e, "stalled nomination not finalized");
                        }
                    }
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(error = %e, "listing stalled nominations failed");
            }
        }

        match self.storage.list_unconfirmed_adoptions(cutoff).await {
            Ok(adoptions) => {
                for adoption in adoptions {
                    match self.confirm_stale(&adoption.pet_id).await {
                        Ok(r) if r.outcome == Outcome::Applied => report.confirmed += 1,
                        Ok(_) => report.skipped += 1,
                        Err(e) => {
                            report.failed += 1;
                            tracing::warn!(pet_id = %adoption.pet_id, error = %e, "stale adoption not confirmed");
                        }
                    }
                }
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(error = %e, "listing unconfirmed adoptions failed");
            }
        }

        tracing::info!(
            finalized = report.finalized,
            confirmed = report.confirmed,
            skipped = report.skipped,
            failed = report.failed,
            "reconcile finished"
        );
        report
    }

    // ── Listings and favorites ───────────────────────────────────────────────

    /// Create an available listing owned by `owner_id`.
    pub async fn list_pet(
        &self,
        pet_id: &str,
        owner_id: &str,
        name: &str,
    ) -> Result<AdoptionView, ServiceError> {
        let pet = PetRecord::listed(pet_id, owner_id, name, self.clock.now());
        let mut snapshot = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.insert_pet(&mut snapshot, pet.clone()).await {
            self.abort(snapshot, pet_id).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        tracing::info!(pet_id, owner_id, "pet listed");
        Ok(AdoptionView::from_rows(&pet, None))
    }

    /// Record that `user_id` favorited the pet.
    pub async fn record_interest(&self, pet_id: &str, user_id: &str) -> Result<(), ServiceError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let staged = match self.storage.get_pet_for_update(&mut snapshot, pet_id).await {
            Ok(_) => {
                self.storage
                    .record_interest(&mut snapshot, pet_id, user_id)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            self.abort(snapshot, pet_id).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snapshot).await?;
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn view(&self, pet_id: &str) -> Result<AdoptionView, ServiceError> {
        let pet = self.storage.get_pet(pet_id).await?;
        let adoption = self.storage.get_adoption(pet_id).await?;
        Ok(AdoptionView::from_rows(&pet, adoption.as_ref()))
    }

    /// Pets still available for adoption.
    pub async fn open_feed(&self) -> Result<Vec<AdoptionView>, ServiceError> {
        let pets = self.storage.list_open_pets().await?;
        Ok(pets
            .iter()
            .map(|pet| AdoptionView::from_rows(pet, None))
            .collect())
    }

    pub async fn interests(&self, pet_id: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.storage.list_interests(pet_id).await?)
    }

    /// Wait for every side effect enqueued so far to be delivered.
    pub async fn flush(&self) {
        self.outbox.flush().await;
    }

    // ── Transaction plumbing ─────────────────────────────────────────────────

    async fn execute(&self, pet_id: &str, action: Action) -> Result<TransitionReport, ServiceError> {
        let mut attempt = 1;
        loop {
            match self.attempt(pet_id, &action).await {
                Err(ServiceError::Storage(StorageError::ConcurrentConflict { .. }))
                    if attempt < MAX_ATTEMPTS =>
                {
                    tracing::debug!(pet_id, action = action.name(), attempt, "version conflict; retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn attempt(&self, pet_id: &str, action: &Action) -> Result<TransitionReport, ServiceError> {
        let mut snapshot = self.storage.begin_snapshot().await?;
        let applied = match self.stage(&mut snapshot, pet_id, action).await {
            Ok(applied) => applied,
            Err(e) => {
                self.abort(snapshot, pet_id).await;
                return Err(e);
            }
        };

        let Applied {
            decision,
            pet,
            adoption,
            interests_cleared,
        } = applied;

        if decision.outcome == Outcome::NoOp {
            self.abort(snapshot, pet_id).await;
            tracing::debug!(pet_id, action = action.name(), state = %decision.from, "no-op");
        } else {
            self.storage.commit_snapshot(snapshot).await?;
            tracing::info!(
                pet_id,
                action = action.name(),
                from = %decision.from,
                to = %decision.to,
                interests_cleared,
                "adoption transition applied"
            );
            self.outbox.enqueue(pet_id, decision.effects);
        }

        Ok(TransitionReport {
            outcome: decision.outcome,
            from: decision.from,
            view: AdoptionView::from_rows(&pet, adoption.as_ref()),
        })
    }

    /// Lock, decide and stage writes. Nothing is visible until commit.
    async fn stage(
        &self,
        snapshot: &mut S::Snapshot,
        pet_id: &str,
        action: &Action,
    ) -> Result<Applied, ServiceError> {
        let current = match self.storage.get_pet_for_update(snapshot, pet_id).await {
            Ok(pet) => Some(pet),
            Err(StorageError::PetNotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        let existing = match &current {
            Some(_) => self.storage.get_adoption_for_pet(snapshot, pet_id).await?,
            None => None,
        };

        let decision = decide(
            &self.context(),
            pet_id,
            current.as_ref(),
            existing.as_ref(),
            action,
        )?;
        let Some(mut pet) = current else {
            return Err(StorageError::PetNotFound {
                pet_id: pet_id.to_string(),
            }
            .into());
        };

        if let Some(next) = &decision.pet {
            let version = self.storage.update_pet(snapshot, next, pet.version).await?;
            pet = next.clone();
            pet.version = version;
        }
        let mut adoption = existing;
        if let Some(created) = &decision.adoption {
            self.storage.insert_adoption(snapshot, created.clone()).await?;
            adoption = Some(created.clone());
        }
        let interests_cleared = if decision.clear_interests {
            self.storage.clear_interests(snapshot, pet_id).await?
        } else {
            0
        };

        Ok(Applied {
            decision,
            pet,
            adoption,
            interests_cleared,
        })
    }

    async fn abort(&self, snapshot: S::Snapshot, pet_id: &str) {
        if let Err(e) = self.storage.abort_snapshot(snapshot).await {
            tracing::warn!(pet_id, error = %e, "snapshot abort failed");
        }
    }
}
