// LMDB-backed visitor ledger and fingerprint cache sharing one environment
use chrono::{DateTime, Utc};
use heed::types::{Bytes, Str, U64};
use heed::byteorder::BE;
use heed::{Database, Env, EnvOpenOptions};
use revisit_core::{
    CacheEntry, ContentHash, Error, FeatureVector, FingerprintCache, RecordId, Result,
    VisitLedger, VisitorRecord,
};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::memory::expiry;

const DB_VISITORS: &str = "visitors";
const DB_CACHE: &str = "fingerprint_cache";

/// Default LMDB map size (10GB)
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024 * 1024;

/// Cache value as stored: the wire entry plus its expiry (unix seconds)
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    #[serde(flatten)]
    entry: CacheEntry,
    expires_at: i64,
}

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

fn cache_err(e: impl std::fmt::Display) -> Error {
    Error::Cache(e.to_string())
}

pub struct LmdbStorage {
    env: Arc<Env>,
    visitors_db: Database<U64<BE>, Bytes>,
    cache_db: Database<Str, Bytes>,
}

impl LmdbStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn with_map_size<P: AsRef<Path>>(path: P, map_size: usize) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(
            unsafe {
                EnvOpenOptions::new()
                    .map_size(map_size)
                    .max_dbs(4)
                    .open(path.as_ref())
            }
            .map_err(storage_err)?,
        );

        let mut wtxn = env.write_txn().map_err(storage_err)?;

        let visitors_db = env
            .create_database(&mut wtxn, Some(DB_VISITORS))
            .map_err(storage_err)?;

        let cache_db = env
            .create_database(&mut wtxn, Some(DB_CACHE))
            .map_err(storage_err)?;

        wtxn.commit().map_err(storage_err)?;

        Ok(Self {
            env,
            visitors_db,
            cache_db,
        })
    }

    fn decode_record(id: u64, bytes: &[u8]) -> Option<VisitorRecord> {
        match bincode::deserialize::<VisitorRecord>(bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping unreadable visitor record {}: {}", id, e);
                None
            }
        }
    }

    fn encode_record(record: &VisitorRecord) -> Result<Vec<u8>> {
        bincode::serialize(record).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl VisitLedger for LmdbStorage {
    fn get(&self, id: RecordId) -> Result<Option<VisitorRecord>> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        let bytes = self.visitors_db.get(&rtxn, &id.0).map_err(storage_err)?;
        Ok(bytes.and_then(|b| Self::decode_record(id.0, b)))
    }

    fn scan(&self, visit: &mut dyn FnMut(&VisitorRecord) -> ControlFlow<()>) -> Result<()> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        for item in self.visitors_db.iter(&rtxn).map_err(storage_err)? {
            let (id, bytes) = item.map_err(storage_err)?;
            let Some(record) = Self::decode_record(id, bytes) else {
                continue;
            };
            if visit(&record).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        fingerprint_hash: &ContentHash,
        features: &FeatureVector,
        now: DateTime<Utc>,
    ) -> Result<VisitorRecord> {
        // LMDB admits one writer at a time, so reading the last id and
        // writing the next one cannot interleave with another insert.
        let mut wtxn = self.env.write_txn().map_err(storage_err)?;
        let last = self
            .visitors_db
            .last(&wtxn)
            .map_err(storage_err)?
            .map(|(id, _)| id)
            .unwrap_or(0);

        let record = VisitorRecord::new(
            RecordId(last + 1),
            fingerprint_hash.as_hex(),
            features.clone(),
            now,
        );
        let bytes = Self::encode_record(&record)?;
        self.visitors_db
            .put(&mut wtxn, &record.id.0, bytes.as_slice())
            .map_err(storage_err)?;
        wtxn.commit().map_err(storage_err)?;
        Ok(record)
    }

    fn record_visit(&self, id: RecordId, now: DateTime<Utc>) -> Result<Option<VisitorRecord>> {
        let mut wtxn = self.env.write_txn().map_err(storage_err)?;
        let before = match self.visitors_db.get(&wtxn, &id.0).map_err(storage_err)? {
            Some(bytes) => Self::decode_record(id.0, bytes),
            None => None,
        };
        let Some(before) = before else {
            return Ok(None);
        };

        let mut after = before.clone();
        after.register_visit(now);
        let bytes = Self::encode_record(&after)?;
        self.visitors_db
            .put(&mut wtxn, &id.0, bytes.as_slice())
            .map_err(storage_err)?;
        wtxn.commit().map_err(storage_err)?;
        Ok(Some(before))
    }

    fn count(&self) -> Result<usize> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        let len = self.visitors_db.len(&rtxn).map_err(storage_err)?;
        Ok(len as usize)
    }
}

impl FingerprintCache for LmdbStorage {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let rtxn = self.env.read_txn().map_err(cache_err)?;
        let Some(bytes) = self.cache_db.get(&rtxn, key).map_err(cache_err)? else {
            return Ok(None);
        };
        let stored: StoredEntry = match serde_json::from_slice(bytes) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", key, e);
                return Ok(None);
            }
        };
        if stored.expires_at <= Utc::now().timestamp() {
            return Ok(None);
        }
        Ok(Some(stored.entry))
    }

    fn put(&self, key: &str, entry: CacheEntry, ttl: Duration) -> Result<()> {
        let stored = StoredEntry {
            entry,
            expires_at: expiry(Utc::now(), ttl)?.timestamp(),
        };
        let bytes = serde_json::to_vec(&stored)?;

        let mut wtxn = self.env.write_txn().map_err(cache_err)?;
        self.cache_db
            .put(&mut wtxn, key, bytes.as_slice())
            .map_err(cache_err)?;
        wtxn.commit().map_err(cache_err)?;
        Ok(())
    }

    fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now().timestamp();
        let mut wtxn = self.env.write_txn().map_err(cache_err)?;

        let mut expired = Vec::new();
        for item in self.cache_db.iter(&wtxn).map_err(cache_err)? {
            let (key, bytes) = item.map_err(cache_err)?;
            let live = serde_json::from_slice::<StoredEntry>(bytes)
                .map(|stored| stored.expires_at > now)
                .unwrap_or(false);
            if !live {
                expired.push(key.to_string());
            }
        }

        for key in &expired {
            self.cache_db
                .delete(&mut wtxn, key.as_str())
                .map_err(cache_err)?;
        }
        wtxn.commit().map_err(cache_err)?;
        Ok(expired.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open() -> (tempfile::TempDir, LmdbStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LmdbStorage::with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_insert_get_and_count() {
        let (_dir, storage) = open();
        let now = Utc::now();
        let features = FeatureVector {
            platform: "Win32".to_string(),
            local_storage: true,
            ..Default::default()
        };
        let hash = ContentHash::of(&json!({"platform": "Win32"}));

        let first = storage.insert(&hash, &features, now).unwrap();
        let second = storage.insert(&hash, &features, now).unwrap();
        assert_eq!(first.id, RecordId(1));
        assert_eq!(second.id, RecordId(2));
        assert_eq!(VisitLedger::count(&storage).unwrap(), 2);

        let loaded = VisitLedger::get(&storage, first.id).unwrap().unwrap();
        assert_eq!(loaded, first);
        assert_eq!(loaded.features, features);
    }

    #[test]
    fn test_scan_in_insertion_order() {
        let (_dir, storage) = open();
        let now = Utc::now();
        for n in 0..4 {
            let hash = ContentHash::of(&json!({ "n": n }));
            storage.insert(&hash, &FeatureVector::default(), now).unwrap();
        }

        let mut ids = Vec::new();
        storage
            .scan(&mut |r| {
                ids.push(r.id.0);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_record_visit_persists() {
        let (_dir, storage) = open();
        let t0 = Utc::now();
        let hash = ContentHash::of(&json!({"n": 1}));
        let record = storage.insert(&hash, &FeatureVector::default(), t0).unwrap();

        let t1 = t0 + chrono::Duration::seconds(3);
        let before = storage.record_visit(record.id, t1).unwrap().unwrap();
        assert_eq!(before.visit_count, 1);

        let after = VisitLedger::get(&storage, record.id).unwrap().unwrap();
        assert_eq!(after.visit_count, 2);
        assert_eq!(after.last_visit, t1);
        assert_eq!(after.created_at, t0);
        assert!(storage.record_visit(RecordId(42), t1).unwrap().is_none());
    }

    #[test]
    fn test_cache_expiry_and_purge() {
        let (_dir, storage) = open();
        let entry = CacheEntry { record_id: RecordId(9) };

        storage.put("fp:live", entry, Duration::from_secs(3600)).unwrap();
        storage.put("fp:dead", entry, Duration::ZERO).unwrap();

        assert_eq!(FingerprintCache::get(&storage, "fp:live").unwrap(), Some(entry));
        assert_eq!(FingerprintCache::get(&storage, "fp:dead").unwrap(), None);
        assert_eq!(storage.purge_expired().unwrap(), 1);
        assert_eq!(FingerprintCache::get(&storage, "fp:live").unwrap(), Some(entry));
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let hash = ContentHash::of(&json!({"n": 1}));
        {
            let storage = LmdbStorage::with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
            storage.insert(&hash, &FeatureVector::default(), Utc::now()).unwrap();
        }
        let storage = LmdbStorage::with_map_size(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(VisitLedger::count(&storage).unwrap(), 1);
        let next = storage.insert(&hash, &FeatureVector::default(), Utc::now()).unwrap();
        assert_eq!(next.id, RecordId(2));
    }
}
