//! In-process effect outbox.
//!
//! Side effects are enqueued only after their transaction committed and are
//! delivered by a single worker task, in order. A failing collaborator is
//! logged and skipped; it never reaches the caller of the lifecycle
//! operation and never holds a transaction open.

use std::sync::Arc;

use adopet_lifecycle::SideEffect;
use tokio::sync::{mpsc, oneshot};

use crate::sinks::{GamificationSink, NotificationSink};

enum Message {
    Effect { pet_id: String, effect: SideEffect },
    Flush(oneshot::Sender<()>),
}

/// Handle to the outbox worker. Cheap to clone; the worker stops once every
/// handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct EffectOutbox {
    tx: mpsc::UnboundedSender<Message>,
}

impl EffectOutbox {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(
        notifier: Arc<dyn NotificationSink>,
        gamification: Arc<dyn GamificationSink>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, notifier, gamification));
        Self { tx }
    }

    pub fn enqueue(&self, pet_id: &str, effects: Vec<SideEffect>) {
        for effect in effects {
            let message = Message::Effect {
                pet_id: pet_id.to_string(),
                effect,
            };
            if self.tx.send(message).is_err() {
                tracing::warn!(pet_id, "effect outbox worker stopped; dropping side effect");
            }
        }
    }

    /// Wait until everything enqueued before this call has been delivered
    /// (or has failed and been logged).
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Message>,
    notifier: Arc<dyn NotificationSink>,
    gamification: Arc<dyn GamificationSink>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Effect { pet_id, effect } => {
                deliver(&pet_id, effect, notifier.as_ref(), gamification.as_ref()).await
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("effect outbox worker finished");
}

async fn deliver(
    pet_id: &str,
    effect: SideEffect,
    notifier: &dyn NotificationSink,
    gamification: &dyn GamificationSink,
) {
    match effect {
        SideEffect::Notify {
            user_id,
            kind,
            payload,
        } => {
            if let Err(e) = notifier.notify(&user_id, kind, &payload).await {
                tracing::warn!(
                    pet_id,
                    user_id = %user_id,
                    kind = kind.as_str(),
                    error = %e,
                    "notification failed"
                );
            }
        }
        SideEffect::AwardAdoption {
            tutor_id,
            adopter_id,
        } => {
            if let Err(e) = gamification
                .on_adoption_finalized(&tutor_id, &adopter_id)
                .await
            {
                tracing::warn!(pet_id, tutor_id = %tutor_id, error = %e, "gamification credit failed");
            }
        }
    }
}
