//! JSON state file backing the in-memory store between invocations.

use std::io::Write;
use std::path::{Path, PathBuf};

use adopet_storage::{MemoryStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("could not read state file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write state file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("state file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: StorageError,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub(crate) struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Load the store; an absent file is an empty store.
    pub(crate) fn load(&self) -> Result<MemoryStorage, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => MemoryStorage::from_json(&json).map_err(|source| StateError::Corrupt {
                path: self.path.clone(),
                source,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MemoryStorage::new()),
            Err(source) => Err(StateError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Replace the file atomically with the store's committed data.
    pub(crate) fn save(&self, storage: &MemoryStorage) -> Result<(), StateError> {
        let json = storage.to_json()?;
        let write_err = |source| StateError::Write {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adopet_storage::{AdoptionStorage, PetRecord};
    use time::macros::datetime;

    #[tokio::test]
    async fn save_then_load_keeps_committed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("state.json"));

        let storage = file.load().unwrap();
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .insert_pet(
                &mut snap,
                PetRecord::listed("pet-1", "tutor-1", "Luna", datetime!(2026-02-02 10:00 UTC)),
            )
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();
        file.save(&storage).unwrap();

        let reloaded = file.load().unwrap();
        assert_eq!(reloaded.get_pet("pet-1").await.unwrap().name, "Luna");
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = StateFile::new(&path).load().err().unwrap();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }
}
