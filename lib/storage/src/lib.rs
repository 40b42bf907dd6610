pub mod manager;
pub mod memory;
pub mod lmdb_storage;

pub use manager::{StorageBackend, StorageManager, DEFAULT_SWEEP_INTERVAL};
pub use memory::{MemoryCache, MemoryLedger};
pub use lmdb_storage::LmdbStorage;
