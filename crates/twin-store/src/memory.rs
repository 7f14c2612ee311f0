//! In-memory reference driver.
//!
//! [`MemoryDriver`] is the simplest backend that honors the full
//! [`StorageDriver`] contract, and the executable target of the conformance
//! suite. Each bucket is its own `HashMap` behind its own `RwLock`, so the
//! two generations never contend, and the root lives behind a third lock.

use std::collections::HashMap;
use std::sync::RwLock;

use twin_types::{Bucket, BucketStats};

use crate::error::StoreResult;
use crate::traits::StorageDriver;

type BucketMap = RwLock<HashMap<String, Vec<u8>>>;

/// HashMap-backed driver for tests and embedding.
pub struct MemoryDriver {
    buckets: [BucketMap; 2],
    root: RwLock<String>,
}

impl MemoryDriver {
    /// Create an empty driver.
    pub fn new() -> Self {
        Self {
            buckets: [RwLock::new(HashMap::new()), RwLock::new(HashMap::new())],
            root: RwLock::new(String::new()),
        }
    }

    fn bucket(&self, bucket: Bucket) -> &BucketMap {
        &self.buckets[bucket.index()]
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load_root(&self) -> StoreResult<String> {
        Ok(self.root.read()?.clone())
    }

    fn store_root(&self, hash: &str) -> StoreResult<()> {
        *self.root.write()? = hash.to_string();
        Ok(())
    }

    fn load(&self, key: &str, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        let map = self.bucket(bucket).read()?;
        Ok(map.get(key).cloned())
    }

    fn store(&self, key: &str, value: &[u8], bucket: Bucket) -> StoreResult<()> {
        let mut map = self.bucket(bucket).write()?;
        map.entry(key.to_string()).or_insert_with(|| value.to_vec());
        Ok(())
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        *self.bucket(bucket).write()? = HashMap::new();
        Ok(())
    }

    fn stats(&self, bucket: Bucket) -> StoreResult<BucketStats> {
        let map = self.bucket(bucket).read()?;
        Ok(BucketStats {
            entries: map.len() as u64,
            bytes: map.values().map(|v| v.len() as u64).sum(),
        })
    }
}

impl std::fmt::Debug for MemoryDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = |b: Bucket| self.bucket(b).read().map(|m| m.len()).unwrap_or(0);
        f.debug_struct("MemoryDriver")
            .field("primary_entries", &count(Bucket::Primary))
            .field("secondary_entries", &count(Bucket::Secondary))
            .finish()
    }
}
