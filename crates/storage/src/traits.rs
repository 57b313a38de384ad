use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{AdoptionRecord, PetRecord};

/// The storage trait for Adopet adoption backends.
///
/// An `AdoptionStorage` implementation provides durable, transactional
/// storage for pet rows, adoption facts, and the interest artifacts
/// (favorites) attached to a pet.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)` — commit and consume the transaction
///    OR `abort_snapshot(snapshot)` — roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back and any row locks it holds released.
///
/// ## Row Locking
///
/// `get_pet_for_update` locks the pet row until the snapshot ends. Two
/// snapshots touching the same pet are serialized: the second one observes
/// the first one's committed writes.
///
/// ## Unique Adoption
///
/// At most one `AdoptionRecord` exists per `pet_id`. `insert_adoption` and
/// `commit_snapshot` both return `StorageError::UniqueViolation` if the
/// constraint would be broken; a failed commit applies nothing.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared with the
/// background scheduler and across async task boundaries.
#[async_trait]
pub trait AdoptionStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Pet operations (within snapshot) ─────────────────────────────────────

    /// Insert a new pet row.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the id is taken.
    async fn insert_pet(
        &self,
        snapshot: &mut Self::Snapshot,
        record: PetRecord,
    ) -> Result<(), StorageError>;

    /// Read a pet, locking the row for update.
    ///
    /// Returns `Err(StorageError::PetNotFound)` if the pet does not exist.
    async fn get_pet_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        pet_id: &str,
    ) -> Result<PetRecord, StorageError>;

    /// Apply a version-validated update to a pet row (OCC).
    ///
    /// The write is conditional on the stored version equalling
    /// `expected_version`; otherwise `Err(StorageError::ConcurrentConflict)`.
    /// The stored record takes every field of `record` except `version`,
    /// which becomes `expected_version + 1` and is returned.
    async fn update_pet(
        &self,
        snapshot: &mut Self::Snapshot,
        record: &PetRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Adoption operations (within snapshot) ────────────────────────────────

    /// Read the adoption fact for a pet, including writes staged in this snapshot.
    async fn get_adoption_for_pet(
        &self,
        snapshot: &mut Self::Snapshot,
        pet_id: &str,
    ) -> Result<Option<AdoptionRecord>, StorageError>;

    /// Insert the adoption fact for a pet.
    ///
    /// Returns `Err(StorageError::UniqueViolation)` if one already exists.
    async fn insert_adoption(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AdoptionRecord,
    ) -> Result<(), StorageError>;

    // ── Interest artifacts (within snapshot) ─────────────────────────────────

    /// Register a user's interest (favorite) in a pet. Idempotent.
    async fn record_interest(
        &self,
        snapshot: &mut Self::Snapshot,
        pet_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError>;

    /// Remove every interest artifact tied to a pet; returns how many were removed.
    async fn clear_interests(
        &self,
        snapshot: &mut Self::Snapshot,
        pet_id: &str,
    ) -> Result<usize, StorageError>;

    // ── Query operations (outside snapshot, committed data only) ─────────────

    /// Read a pet without locking.
    ///
    /// Returns `Err(StorageError::PetNotFound)` if the pet does not exist.
    async fn get_pet(&self, pet_id: &str) -> Result<PetRecord, StorageError>;

    /// Read the adoption fact for a pet, if any.
    async fn get_adoption(&self, pet_id: &str) -> Result<Option<AdoptionRecord>, StorageError>;

    /// Users currently interested in a pet, sorted.
    async fn list_interests(&self, pet_id: &str) -> Result<Vec<String>, StorageError>;

    /// The open feed: every pet whose status is `AVAILABLE`, sorted by id.
    async fn list_open_pets(&self) -> Result<Vec<PetRecord>, StorageError>;

    /// Nominations stalled past `cutoff`: status `ADOPTED`, no adoption fact,
    /// not rejected, a pending adopter who has self-confirmed, and
    /// `marked_adopted_at <= cutoff`. Sorted by pet id.
    async fn list_stalled_nominations(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<PetRecord>, StorageError>;

    /// Adoption facts whose pet has no platform confirmation, is not
    /// rejected, and whose `adopted_at <= cutoff`. Sorted by pet id.
    async fn list_unconfirmed_adoptions(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<AdoptionRecord>, StorageError>;
}
