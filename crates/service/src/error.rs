use adopet_lifecycle::{ErrorKind, TransitionError};
use adopet_storage::StorageError;

/// Failure of an [`AdoptionService`](crate::AdoptionService) operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The lifecycle refused the transition.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The store failed for reasons unrelated to the lifecycle.
    #[error(transparent)]
    Storage(StorageError),
}

impl ServiceError {
    /// Taxonomy of lifecycle failures; `None` for infrastructure errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Transition(e) => Some(e.kind()),
            ServiceError::Storage(_) => None,
        }
    }
}

/// Constraint violations the store reports are lifecycle failures in
/// disguise; surface them as such.
impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::PetNotFound { pet_id } => {
                ServiceError::Transition(TransitionError::PetNotFound { pet_id })
            }
            StorageError::UniqueViolation { pet_id } => {
                ServiceError::Transition(TransitionError::DuplicateAdoption { pet_id })
            }
            other => ServiceError::Storage(other),
        }
    }
}
