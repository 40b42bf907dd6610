use crate::lmdb_storage::LmdbStorage;
use crate::memory::{MemoryCache, MemoryLedger};
use revisit_core::{FingerprintCache, Result, VisitLedger};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default interval between expired-cache sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Where the ledger and cache live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Memory,
    Lmdb,
}

/// Owns the ledger and cache handed to the resolver
pub struct StorageManager {
    ledger: Arc<dyn VisitLedger>,
    cache: Arc<dyn FingerprintCache>,
    backend: StorageBackend,
    data_dir: Option<PathBuf>,
    /// Run flag of the live sweeper; each sweeper thread owns its own flag
    sweeper: Mutex<Option<Arc<AtomicBool>>>,
}

impl StorageManager {
    /// Volatile storage; nothing survives the process
    pub fn in_memory() -> Self {
        Self {
            ledger: Arc::new(MemoryLedger::new()),
            cache: Arc::new(MemoryCache::new()),
            backend: StorageBackend::Memory,
            data_dir: None,
            sweeper: Mutex::new(None),
        }
    }

    /// LMDB storage under `data_dir/lmdb`
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        let lmdb = Arc::new(LmdbStorage::new(data_dir.join("lmdb"))?);
        info!(
            "Opened visitor ledger with {} records",
            lmdb.count()?
        );

        Ok(Self {
            ledger: lmdb.clone(),
            cache: lmdb,
            backend: StorageBackend::Lmdb,
            data_dir: Some(data_dir),
            sweeper: Mutex::new(None),
        })
    }

    pub fn with_backend<P: AsRef<Path>>(backend: StorageBackend, data_dir: P) -> Result<Self> {
        match backend {
            StorageBackend::Memory => Ok(Self::in_memory()),
            StorageBackend::Lmdb => Self::open(data_dir),
        }
    }

    /// Assemble from externally built collaborators
    pub fn from_parts(ledger: Arc<dyn VisitLedger>, cache: Arc<dyn FingerprintCache>) -> Self {
        Self {
            ledger,
            cache,
            backend: StorageBackend::Memory,
            data_dir: None,
            sweeper: Mutex::new(None),
        }
    }

    #[inline]
    pub fn ledger(&self) -> Arc<dyn VisitLedger> {
        self.ledger.clone()
    }

    #[inline]
    pub fn cache(&self) -> Arc<dyn FingerprintCache> {
        self.cache.clone()
    }

    #[inline]
    #[must_use]
    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    #[inline]
    #[must_use]
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Start the background thread dropping expired cache entries.
    /// Returns false if a sweeper is already running.
    pub fn start_cache_sweeper(&self, interval: Duration) -> bool {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return false;
        }

        let running = Arc::new(AtomicBool::new(true));
        *sweeper = Some(running.clone());

        let cache = self.cache.clone();
        std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                std::thread::sleep(interval);
                if !running.load(Ordering::Acquire) {
                    break;
                }
                match cache.purge_expired() {
                    Ok(0) => {}
                    Ok(n) => debug!("Purged {} expired cache entries", n),
                    Err(e) => warn!("Cache sweep failed: {}", e),
                }
            }
        });
        true
    }

    /// Ask the sweeper to exit after its current sleep. A sweeper started
    /// later runs independently of the one being stopped.
    pub fn stop_cache_sweeper(&self) {
        if let Some(running) = self.sweeper.lock().take() {
            running.store(false, Ordering::Release);
        }
    }
}

impl Drop for StorageManager {
    fn drop(&mut self) {
        self.stop_cache_sweeper();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revisit_core::{CacheEntry, ContentHash, FeatureVector, RecordId};

    #[test]
    fn test_open_creates_lmdb_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::open(dir.path()).unwrap();
        assert_eq!(storage.backend(), StorageBackend::Lmdb);
        assert!(dir.path().join("lmdb").exists());
        assert_eq!(storage.data_dir(), Some(dir.path()));
        assert_eq!(storage.ledger().count().unwrap(), 0);
    }

    #[test]
    fn test_ledger_and_cache_share_backend() {
        let storage = StorageManager::in_memory();
        assert_eq!(storage.data_dir(), None);
        let hash = ContentHash::of(&serde_json::json!({"platform": "Win32"}));
        let record = storage
            .ledger()
            .insert(&hash, &FeatureVector::default(), chrono::Utc::now())
            .unwrap();
        storage
            .cache()
            .put(&hash.cache_key(), CacheEntry { record_id: record.id }, Duration::from_secs(60))
            .unwrap();

        assert_eq!(
            storage.cache().get(&hash.cache_key()).unwrap(),
            Some(CacheEntry { record_id: RecordId(1) })
        );
    }

    #[test]
    fn test_restarted_sweeper_does_not_revive_old_one() {
        let storage = StorageManager::in_memory();
        assert!(storage.start_cache_sweeper(Duration::from_secs(60)));
        let first = storage.sweeper.lock().clone().unwrap();

        storage.stop_cache_sweeper();
        assert!(storage.start_cache_sweeper(Duration::from_secs(60)));
        let second = storage.sweeper.lock().clone().unwrap();

        assert!(!first.load(Ordering::Acquire));
        assert!(second.load(Ordering::Acquire));
        assert!(!Arc::ptr_eq(&first, &second));

        storage.stop_cache_sweeper();
        assert!(!second.load(Ordering::Acquire));
        assert!(storage.sweeper.lock().is_none());
    }

    #[test]
    fn test_sweeper_starts_once() {
        let storage = StorageManager::in_memory();
        assert!(storage.start_cache_sweeper(Duration::from_millis(10)));
        assert!(!storage.start_cache_sweeper(Duration::from_millis(10)));
        storage.stop_cache_sweeper();
    }
}
