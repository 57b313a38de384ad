pub mod conformance;
mod error;
pub mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use memory::{MemorySnapshot, MemoryStorage, MemoryTables};
pub use record::{AdoptionRecord, PetRecord, PetStatus};
pub use traits::AdoptionStorage;
