//! Collaborator interfaces for best-effort side effects.
//!
//! Delivery (email, push) and point accounting live elsewhere; the service
//! only decides whether and to whom something fires.

use adopet_lifecycle::{NotificationKind, NotificationPayload};
use async_trait::async_trait;

/// Failure reported by a collaborator. Logged, never propagated.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SinkError(pub String);

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<(), SinkError>;
}

#[async_trait]
pub trait GamificationSink: Send + Sync {
    async fn on_adoption_finalized(&self, tutor_id: &str, adopter_id: &str)
        -> Result<(), SinkError>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(
        &self,
        user_id: &str,
        kind: NotificationKind,
        payload: &NotificationPayload,
    ) -> Result<(), SinkError> {
        tracing::info!(
            user_id,
            kind = kind.as_str(),
            pet_id = %payload.pet_id,
            platform_confirmed = payload.platform_confirmed,
            "notification"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingGamification;

#[async_trait]
impl GamificationSink for TracingGamification {
    async fn on_adoption_finalized(
        &self,
        tutor_id: &str,
        adopter_id: &str,
    ) -> Result<(), SinkError> {
        tracing::info!(tutor_id, adopter_id, "adoption credited");
        Ok(())
    }
}
