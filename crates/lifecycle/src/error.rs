use serde::Serialize;

use crate::state::StateName;

/// Failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Pet or adoption record missing.
    NotFound,
    /// A guard failed.
    InvalidTransition,
    /// An adoption fact already exists.
    AlreadyFinalized,
}

/// A transition the engine refuses to make.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("pet not found: {pet_id}")]
    PetNotFound { pet_id: String },

    #[error("pet {pet_id} has no registered adoption")]
    NoAdoptionRecord { pet_id: String },

    #[error("pet {pet_id} already has a registered adoption")]
    DuplicateAdoption { pet_id: String },

    #[error("user {user_id} owns pet {pet_id} and cannot adopt it")]
    SelfAdoptionForbidden { pet_id: String, user_id: String },

    #[error("pet {pet_id} has no explicit adopter and no nominated candidate")]
    MissingAdopter { pet_id: String },

    #[error("user {user_id} is not the owner of pet {pet_id}")]
    NotOwner { pet_id: String, user_id: String },

    #[error("user {user_id} is not the nominated adopter of pet {pet_id}")]
    NotNominatedAdopter { pet_id: String, user_id: String },

    #[error("cannot {action} pet {pet_id} in state {state}")]
    InvalidState {
        pet_id: String,
        action: &'static str,
        state: StateName,
    },
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::PetNotFound { .. } | TransitionError::NoAdoptionRecord { .. } => {
                ErrorKind::NotFound
            }
            TransitionError::DuplicateAdoption { .. } => ErrorKind::AlreadyFinalized,
            TransitionError::SelfAdoptionForbidden { .. }
            | TransitionError::MissingAdopter { .. }
            | TransitionError::NotOwner { .. }
            | TransitionError::NotNominatedAdopter { .. }
            | TransitionError::InvalidState { .. } => ErrorKind::InvalidTransition,
        }
    }
}
