//! Adoption lifecycle engine -- pure decision logic.
//!
//! Given a pet row, its adoption fact (if any), and an incoming actor
//! action, [`decide`] computes the rows to write and the side effects to
//! fire once the write has committed. Nothing here performs I/O; the
//! orchestrator owns transactions and dispatch.

pub mod engine;
pub mod error;
pub mod state;

pub use engine::{
    decide, Action, Context, Decision, NotificationKind, NotificationPayload, Outcome, Party,
    SideEffect, DEFAULT_CONFIRMATION_WINDOW,
};
pub use error::{ErrorKind, TransitionError};
pub use state::{LifecycleState, StateName};
