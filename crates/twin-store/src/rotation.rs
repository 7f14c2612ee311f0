//! Generational orchestration on top of [`Storage`].
//!
//! The two buckets form a double buffer. New objects go to the active
//! bucket; the inactive one holds the previous generation and stays
//! readable. Reclamation copies the live set into the inactive bucket,
//! flips the [`BucketFlag`], then bulk-erases the stale bucket, so its cost
//! is O(live) to copy plus one bulk erase, independent of how much garbage
//! the stale generation holds.
//!
//! Locking:
//! - `gate` is read-held by every write and write-held only to open the
//!   reclamation window and to flip. While the window is open, writes go to
//!   both the active bucket and the reclamation target, so nothing written
//!   after reclamation starts can be lost by the erase.
//! - `bucket_locks` are read-held by every call touching a bucket and
//!   write-held while that bucket is erased. This is what makes "no call
//!   targets a bucket during its erase" hold instead of being assumed.
//! - `reclaim_lock` admits one reclamation (or explicit erase) at a time.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, TryLockError};

use serde::Serialize;
use tracing::{debug, info, warn};
use twin_types::{Bucket, BucketFlag, BucketStats, Lookup};

use crate::error::{StoreError, StoreResult};
use crate::plugin::{Migration, Storage};

/// Summary of one reclamation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Bucket that is active after the pass.
    pub active: Option<Bucket>,
    /// Bucket that was erased.
    pub reclaimed: Option<Bucket>,
    /// Live values copied into the new active bucket.
    pub copied: u64,
    /// Live values that were already in the new active bucket.
    pub already_present: u64,
    /// Live keys found in neither bucket.
    pub missing: u64,
}

/// Per-bucket statistics plus the active bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    pub active: Bucket,
    pub primary: BucketStats,
    pub secondary: BucketStats,
}

/// Orchestrator owning the active-bucket flag for one [`Storage`].
pub struct GenerationalStore {
    storage: Storage,
    flag: BucketFlag,
    /// Reclamation target while the window is open.
    gate: RwLock<Option<Bucket>>,
    bucket_locks: [RwLock<()>; 2],
    reclaim_lock: Mutex<()>,
}

impl GenerationalStore {
    /// Wrap `storage` with `active` as the current generation.
    pub fn new(storage: Storage, active: Bucket) -> Self {
        Self {
            storage,
            flag: BucketFlag::new(active),
            gate: RwLock::new(None),
            bucket_locks: [RwLock::new(()), RwLock::new(())],
            reclaim_lock: Mutex::new(()),
        }
    }

    /// The currently active bucket.
    pub fn active(&self) -> Bucket {
        self.flag.current()
    }

    /// The bucket holding the previous generation.
    pub fn inactive(&self) -> Bucket {
        self.flag.current().other()
    }

    /// Read-only view of the shared flag.
    pub fn flag(&self) -> &BucketFlag {
        &self.flag
    }

    /// The wrapped storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn bucket_read(&self, bucket: Bucket) -> RwLockReadGuard<'_, ()> {
        self.bucket_locks[bucket.index()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_exclusive(&self) -> StoreResult<MutexGuard<'_, ()>> {
        match self.reclaim_lock.try_lock() {
            Ok(guard) => Ok(guard),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(StoreError::ReclaimInProgress),
        }
    }

    fn set_window(&self, target: Option<Bucket>, flip: bool) {
        let mut window = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        if flip {
            self.flag.flip();
        }
        *window = target;
    }

    fn write_value(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let window = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        let active = self.flag.current();
        let targets = match *window {
            Some(target) if target != active => vec![active, target],
            _ => vec![active],
        };
        for bucket in targets {
            let _bucket = self.bucket_read(bucket);
            if !self.storage.store(key, value, bucket) {
                return Err(StoreError::Backend { op: "store", bucket });
            }
        }
        Ok(())
    }

    /// Store `value` under its digest in the active generation.
    pub fn put(&self, value: &[u8]) -> StoreResult<String> {
        let key = self.storage.digest().digest(value);
        self.write_value(&key, value)?;
        debug!(key = %key, bytes = value.len(), "object stored");
        Ok(key)
    }

    /// Store `value` under a caller-chosen key in the active generation.
    pub fn put_keyed(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.write_value(key, value)
    }

    /// Look up `key` in the active generation, then the previous one.
    pub fn get(&self, key: &str) -> Lookup {
        let _primary = self.bucket_read(Bucket::Primary);
        let _secondary = self.bucket_read(Bucket::Secondary);
        self.storage.load_object(key, &self.flag)
    }

    /// Current root hash, `""` if none.
    pub fn root(&self) -> String {
        self.storage.load_root()
    }

    /// Replace the root hash.
    pub fn set_root(&self, hash: &str) -> StoreResult<()> {
        if self.storage.store_root(hash) {
            Ok(())
        } else {
            Err(StoreError::Backend {
                op: "store_root",
                bucket: self.active(),
            })
        }
    }

    /// Copy `live` into the inactive bucket, make it active, and erase the
    /// stale bucket.
    ///
    /// The caller computes `live` (keys reachable from the current root).
    /// A failed copy aborts before the flip, leaving both generations as
    /// they were.
    pub fn reclaim<I, K>(&self, live: I) -> StoreResult<ReclaimReport>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let _running = self.begin_exclusive()?;
        let stale = self.flag.current();
        let target = stale.other();

        self.set_window(Some(target), false);
        info!(from = %stale, to = %target, "reclamation started");

        let mut report = ReclaimReport {
            active: Some(target),
            reclaimed: Some(stale),
            ..ReclaimReport::default()
        };
        for key in live {
            let key = key.as_ref();
            let outcome = {
                let _stale = self.bucket_read(stale);
                let _target = self.bucket_read(target);
                self.storage.try_migrate(key, stale)
            };
            match outcome {
                Ok(Migration::Copied) => report.copied += 1,
                Ok(Migration::AlreadyPresent) => report.already_present += 1,
                Ok(Migration::Missing) => {
                    warn!(key, "live key found in neither bucket");
                    report.missing += 1;
                }
                Err(e) => {
                    self.set_window(None, false);
                    warn!(key, "reclamation aborted before flip: {e}");
                    return Err(e);
                }
            }
        }

        self.set_window(None, true);
        debug!(active = %self.flag.current(), "active bucket flipped");

        self.erase(stale)?;
        info!(
            active = %target,
            copied = report.copied,
            already_present = report.already_present,
            missing = report.missing,
            "reclamation finished"
        );
        Ok(report)
    }

    /// Erase `bucket` outright, waiting for in-flight calls on it.
    ///
    /// Erasing the active bucket discards the current generation; this is
    /// for operators recovering from a failed reclamation.
    pub fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        let _running = self.begin_exclusive()?;
        let _window = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if bucket == self.flag.current() {
            warn!(%bucket, "erasing the active bucket");
        }
        self.erase(bucket)
    }

    fn erase(&self, bucket: Bucket) -> StoreResult<()> {
        let _exclusive = self.bucket_locks[bucket.index()]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.storage.empty_bucket(bucket) {
            Ok(())
        } else {
            Err(StoreError::Backend {
                op: "empty_bucket",
                bucket,
            })
        }
    }

    /// Counts for both buckets.
    pub fn stats(&self) -> StoreResult<GenerationStats> {
        Ok(GenerationStats {
            active: self.active(),
            primary: self.storage.stats(Bucket::Primary)?,
            secondary: self.storage.stats(Bucket::Secondary)?,
        })
    }

    /// Tear down the underlying storage.
    pub fn cleanup(&self) {
        self.storage.cleanup();
    }
}

impl std::fmt::Debug for GenerationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationalStore")
            .field("storage", &self.storage)
            .field("active", &self.active())
            .finish()
    }
}
