/// All errors that can be returned by an AdoptionStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No pet row with the given id.
    #[error("pet not found: {pet_id}")]
    PetNotFound { pet_id: String },

    /// A pet row with this id already exists.
    #[error("pet already exists: {pet_id}")]
    AlreadyExists { pet_id: String },

    /// Optimistic concurrency control conflict: the stored version is not
    /// the one the caller read.
    #[error("concurrent conflict on pet {pet_id}: expected version {expected_version}")]
    ConcurrentConflict {
        pet_id: String,
        expected_version: i64,
    },

    /// Unique constraint on `AdoptionRecord.pet_id` would be violated.
    #[error("adoption already recorded for pet {pet_id}")]
    UniqueViolation { pet_id: String },

    /// A backend-specific storage error (I/O, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
