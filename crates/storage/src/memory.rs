//! In-memory `AdoptionStorage` backend.
//!
//! Committed rows live behind a mutex that is never held across an await.
//! A snapshot stages its writes privately and applies them in one critical
//! section on commit, after re-validating versions and the unique adoption
//! constraint. Row locks are per-pet `tokio::sync::Mutex`es whose owned
//! guards travel with the snapshot, so dropping a snapshot releases them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;

use crate::error::StorageError;
use crate::record::{AdoptionRecord, PetRecord, PetStatus};
use crate::traits::AdoptionStorage;

/// Committed contents of a [`MemoryStorage`]. Serializable so the whole
/// store can be persisted as one JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryTables {
    #[serde(default)]
    pub pets: BTreeMap<String, PetRecord>,
    /// Keyed by pet id, which is what enforces one adoption per pet.
    #[serde(default)]
    pub adoptions: BTreeMap<String, AdoptionRecord>,
    #[serde(default)]
    pub interests: BTreeMap<String, BTreeSet<String>>,
}

/// Transactional in-memory storage.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<MemoryTables>,
    row_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[derive(Debug)]
struct StagedPet {
    record: PetRecord,
    /// Committed version this write was based on; `None` for inserts.
    base_version: Option<i64>,
}

#[derive(Debug)]
enum InterestOp {
    Add { pet_id: String, user_id: String },
    Clear { pet_id: String },
}

/// A pending transaction against [`MemoryStorage`].
pub struct MemorySnapshot {
    pets: BTreeMap<String, StagedPet>,
    adoptions: BTreeMap<String, AdoptionRecord>,
    interests: Vec<InterestOp>,
    locked: BTreeSet<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl MemorySnapshot {
    fn new() -> Self {
        Self {
            pets: BTreeMap::new(),
            adoptions: BTreeMap::new(),
            interests: Vec::new(),
            locked: BTreeSet::new(),
            guards: Vec::new(),
        }
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: MemoryTables) -> Self {
        Self {
            tables: Mutex::new(tables),
            row_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Load a store previously written with [`MemoryStorage::to_json`].
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        let tables: MemoryTables =
            serde_json::from_str(json).map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self::from_tables(tables))
    }

    /// Serialize all committed data.
    pub fn to_json(&self) -> Result<String, StorageError> {
        let tables = self.lock_tables()?;
        serde_json::to_string_pretty(&*tables).map_err(|e| StorageError::Backend(e.to_string()))
    }

    /// A copy of the committed tables.
    pub fn tables(&self) -> Result<MemoryTables, StorageError> {
        Ok(self.lock_tables()?.clone())
    }

    fn lock_tables(&self) -> Result<MutexGuard<'_, MemoryTables>, StorageError> {
        self.tables
            .lock()
            .map_err(|_| StorageError::Backend("memory tables poisoned".to_string()))
    }

    fn row_lock(&self, pet_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>, StorageError> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StorageError::Backend("row lock table poisoned".to_string()))?;
        // Holders and waiters keep a clone; an entry only the map references is idle.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks
            .entry(pet_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    #[cfg(test)]
    fn row_lock_count(&self) -> usize {
        self.row_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    /// Pet as seen from inside `snapshot`: staged write first, then committed row.
    fn visible_pet(
        &self,
        snapshot: &MemorySnapshot,
        pet_id: &str,
    ) -> Result<Option<PetRecord>, StorageError> {
        if let Some(staged) = snapshot.pets.get(pet_id) {
            return Ok(Some(staged.record.clone()));
        }
        Ok(self.lock_tables()?.pets.get(pet_id).cloned())
    }

    fn visible_interests(
        tables: &MemoryTables,
        snapshot: &MemorySnapshot,
        pet_id: &str,
    ) -> BTreeSet<String> {
        let mut set = tables.interests.get(pet_id).cloned().unwrap_or_default();
        for op in &snapshot.interests {
            match op {
                InterestOp::Add {
                    pet_id: p,
                    user_id,
                } if p == pet_id => {
                    set.insert(user_id.clone());
                }
                InterestOp::Clear { pet_id: p } if p == pet_id => set.clear(),
                _ => {}
            }
        }
        set
    }
}

#[async_trait]
impl AdoptionStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        Ok(MemorySnapshot::new())
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let mut tables = self.lock_tables()?;

        // Validate everything before applying anything.
        for (pet_id, staged) in &snapshot.pets {
            let current = tables.pets.get(pet_id).map(|p| p.version);
            match (staged.base_version, current) {
                (None, Some(_)) => {
                    return Err(StorageError::AlreadyExists {
                        pet_id: pet_id.clone(),
                    })
                }
                (Some(_), None) => {
                    return Err(StorageError::PetNotFound {
                        pet_id: pet_id.clone(),
                    })
                }
                (Some(base), Some(found)) if base != found => {
                    return Err(StorageError::ConcurrentConflict {
                        pet_id: pet_id.clone(),
                        expected_version: base,
                    })
                }
                _ => {}
            }
        }
        for pet_id in snapshot.adoptions.keys() {
            if tables.adoptions.contains_key(pet_id) {
                return Err(StorageError::UniqueViolation {
                    pet_id: pet_id.clone(),
                });
            }
        }

        let MemorySnapshot {
            pets,
            adoptions,
            interests,
            guards,
            ..
        } = snapshot;
        for (pet_id, staged) in pets {
            tables.pets.insert(pet_id, staged.record);
        }
        tables.adoptions.extend(adoptions);
        for op in interests {
            match op {
                InterestOp::Add { pet_id, user_id } => {
                    tables.interests.entry(pet_id).or_default().insert(user_id);
                }
                InterestOp::Clear { pet_id } => {
                    tables.interests.remove(&pet_id);
                }
            }
        }
        drop(tables);
        drop(guards);
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert_pet(
        &self,
        snapshot: &mut MemorySnapshot,
        record: PetRecord,
    ) -> Result<(), StorageError> {
        if self.visible_pet(snapshot, &record.id)?.is_some() {
            return Err(StorageError::AlreadyExists {
                pet_id: record.id.clone(),
            });
        }
        let mut record = record;
        record.version = 0;
        snapshot.pets.insert(
            record.id.clone(),
            StagedPet {
                record,
                base_version: None,
            },
        );
        Ok(())
    }

    async fn get_pet_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        pet_id: &str,
    ) -> Result<PetRecord, StorageError> {
        if !snapshot.locked.contains(pet_id) {
            if self.visible_pet(snapshot, pet_id)?.is_none() {
                return Err(StorageError::PetNotFound {
                    pet_id: pet_id.to_string(),
                });
            }
            let lock = self.row_lock(pet_id)?;
            let guard = lock.lock_owned().await;
            snapshot.guards.push(guard);
            snapshot.locked.insert(pet_id.to_string());
        }
        self.visible_pet(snapshot, pet_id)?
            .ok_or_else(|| StorageError::PetNotFound {
                pet_id: pet_id.to_string(),
            })
    }

    async fn update_pet(
        &self,
        snapshot: &mut MemorySnapshot,
        record: &PetRecord,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let current = self
            .visible_pet(snapshot, &record.id)?
            .ok_or_else(|| StorageError::PetNotFound {
                pet_id: record.id.clone(),
            })?;
        if current.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                pet_id: record.id.clone(),
                expected_version,
            });
        }
        let base_version = match snapshot.pets.get(&record.id) {
            Some(staged) => staged.base_version,
            None => Some(current.version),
        };
        let mut updated = record.clone();
        updated.version = expected_version + 1;
        let new_version = updated.version;
        snapshot.pets.insert(
            record.id.clone(),
            StagedPet {
                record: updated,
                base_version,
            },
        );
        Ok(new_version)
    }

    async fn get_adoption_for_pet(
        &self,
        snapshot: &mut MemorySnapshot,
        pet_id: &str,
    ) -> Result<Option<AdoptionRecord>, StorageError> {
        if let Some(staged) = snapshot.adoptions.get(pet_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.lock_tables()?.adoptions.get(pet_id).cloned())
    }

    async fn insert_adoption(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AdoptionRecord,
    ) -> Result<(), StorageError> {
        let exists = snapshot.adoptions.contains_key(&record.pet_id)
            || self.lock_tables()?.adoptions.contains_key(&record.pet_id);
        if exists {
            return Err(StorageError::UniqueViolation {
                pet_id: record.pet_id.clone(),
            });
        }
        snapshot.adoptions.insert(record.pet_id.clone(), record);
        Ok(())
    }

    async fn record_interest(
        &self,
        snapshot: &mut MemorySnapshot,
        pet_id: &str,
        user_id: &str,
    ) -> Result<(), StorageError> {
        if self.visible_pet(snapshot, pet_id)?.is_none() {
            return Err(StorageError::PetNotFound {
                pet_id: pet_id.to_string(),
            });
        }
        snapshot.interests.push(InterestOp::Add {
            pet_id: pet_id.to_string(),
            user_id: user_id.to_string(),
        });
        Ok(())
    }

    async fn clear_interests(
        &self,
        snapshot: &mut MemorySnapshot,
        pet_id: &str,
    ) -> Result<usize, StorageError> {
        let removed = {
            let tables = self.lock_tables()?;
            Self::visible_interests(&tables, snapshot, pet_id).len()
        };
        snapshot.interests.push(InterestOp::Clear {
            pet_id: pet_id.to_string(),
        });
        Ok(removed)
    }

    async fn get_pet(&self, pet_id: &str) -> Result<PetRecord, StorageError> {
        self.lock_tables()?
            .pets
            .get(pet_id)
            .cloned()
            .ok_or_else(|| StorageError::PetNotFound {
                pet_id: pet_id.to_string(),
            })
    }

    async fn get_adoption(&self, pet_id: &str) -> Result<Option<AdoptionRecord>, StorageError> {
        Ok(self.lock_tables()?.adoptions.get(pet_id).cloned())
    }

    async fn list_interests(&self, pet_id: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .lock_tables()?
            .interests
            .get(pet_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_open_pets(&self) -> Result<Vec<PetRecord>, StorageError> {
        Ok(self
            .lock_tables()?
            .pets
            .values()
            .filter(|p| p.status == PetStatus::Available)
            .cloned()
            .collect())
    }

    async fn list_stalled_nominations(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<PetRecord>, StorageError> {
        let tables = self.lock_tables()?;
        Ok(tables
            .pets
            .values()
            .filter(|p| {
                p.status == PetStatus::Adopted
                    && !tables.adoptions.contains_key(&p.id)
                    && !p.is_rejected()
                    && p.pending_adopter_id.is_some()
                    && p.adopter_confirmed_at.is_some()
                    && p.marked_adopted_at.is_some_and(|at| at <= cutoff)
            })
            .cloned()
            .collect())
    }

    async fn list_unconfirmed_adoptions(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<AdoptionRecord>, StorageError> {
        let tables = self.lock_tables()?;
        Ok(tables
            .adoptions
            .values()
            .filter(|a| a.adopted_at <= cutoff)
            .filter(|a| {
                tables
                    .pets
                    .get(&a.pet_id)
                    .is_some_and(|p| p.adopet_confirmed_at.is_none() && !p.is_rejected())
            })
            .cloned()
            .collect())
    }
}
