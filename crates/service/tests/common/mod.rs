//! Shared fixtures for the service integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use adopet_lifecycle::{NotificationKind, NotificationPayload};
use adopet_service::{AdoptionService, GamificationSink, ManualClock, NotificationSink, SinkError};
use adopet_storage::MemoryStorage;
use async_trait::async_trait;
use time::macros::datetime;
use time::OffsetDateTime;

pub const T0: OffsetDateTime = datetime!(2026-04-01 09:00 UTC);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub user_id: String,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn recipients(&self, kind: NotificationKind) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotifier {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<(), SinkError> {
        self.sent.lock().unwrap().push(Sent {
            user_id: user_id.to_string(),
            kind,
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Fails every delivery.
#[derive(Debug, Default)]
pub struct FailingNotifier;

#[async_trait]
impl NotificationSink for FailingNotifier {
    async fn notify(
        &self,
        _user_id: &str,
        _kind: NotificationKind,
        _payload: &NotificationPayload,
    ) -> Result<(), SinkError> {
        Err(SinkError("smtp relay unreachable".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingGamification {
    credited: Mutex<Vec<(String, String)>>,
}

impl RecordingGamification {
    pub fn credited(&self) -> Vec<(String, String)> {
        self.credited.lock().unwrap().clone()
    }
}

#[async_trait]
impl GamificationSink for RecordingGamification {
    async fn on_adoption_finalized(
        &self,
        tutor_id: &str,
        adopter_id: &str,
    ) -> Result<(), SinkError> {
        self.credited
            .lock()
            .unwrap()
            .push((tutor_id.to_string(), adopter_id.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub service: Arc<AdoptionService<MemoryStorage>>,
    pub storage: Arc<MemoryStorage>,
    pub clock: ManualClock,
    pub notifier: Arc<RecordingNotifier>,
    pub gamification: Arc<RecordingGamification>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_storage(MemoryStorage::new())
    }

    pub fn with_storage(storage: MemoryStorage) -> Self {
        let storage = Arc::new(storage);
        let clock = ManualClock::new(T0);
        let notifier = Arc::new(RecordingNotifier::default());
        let gamification = Arc::new(RecordingGamification::default());
        let service = AdoptionService::new(
            storage.clone(),
            Arc::new(clock.clone()),
            notifier.clone(),
            gamification.clone(),
        );
        Self {
            service: Arc::new(service),
            storage,
            clock,
            notifier,
            gamification,
        }
    }

    /// Listed pet owned by `tutor-1`.
    pub async fn listed(&self, pet_id: &str) {
        self.service.list_pet(pet_id, "tutor-1", "Bolt").await.unwrap();
    }

    /// Listed, nominated for `adopter-1` and self-confirmed, all at the current clock.
    pub async fn awaiting(&self, pet_id: &str) {
        self.listed(pet_id).await;
        self.service
            .nominate(pet_id, "tutor-1", "adopter-1")
            .await
            .unwrap();
        self.service
            .confirm_by_adopter(pet_id, "adopter-1")
            .await
            .unwrap();
    }

    /// Awaiting pet registered by an admin, without platform confirmation.
    pub async fn registered(&self, pet_id: &str) {
        self.awaiting(pet_id).await;
        self.service.register_adoption(pet_id, None).await.unwrap();
    }
}
