//! Adoption orchestration.
//!
//! [`AdoptionService`] is the only mutation surface for the adoption
//! lifecycle: every call runs one engine decision inside one storage
//! snapshot, commits, then hands the decision's side effects to the
//! [`EffectOutbox`]. [`EscalationScheduler`] drives the same service on a
//! timer.

pub mod clock;
pub mod error;
pub mod outbox;
pub mod scheduler;
pub mod service;
pub mod sinks;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ServiceError;
pub use outbox::EffectOutbox;
pub use scheduler::{EscalationScheduler, DEFAULT_INTERVAL};
pub use service::{AdoptionService, AdoptionView, ReconcileReport, TransitionReport};
pub use sinks::{GamificationSink, NotificationSink, SinkError, TracingGamification, TracingNotifier};
