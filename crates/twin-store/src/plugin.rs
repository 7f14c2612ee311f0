//! Shared plumbing around a [`StorageDriver`].
//!
//! [`Storage`] owns one driver together with the injected digest and the
//! lifecycle state. It exposes the backend contract with boolean/optional
//! outcomes: driver errors are logged here and folded into `false`,
//! [`Lookup::NotFound`] or an empty root, so no error crosses the storage
//! boundary for expected conditions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};
use twin_crypto::{Digest, RandomSource};
use twin_types::{Bucket, BucketFlag, BucketStats, Lookup};

use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::factory;
use crate::traits::StorageDriver;

/// Outcome of copying one value into the other bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Migration {
    /// The destination bucket already held the key.
    AlreadyPresent,
    /// The value was copied.
    Copied,
    /// The key exists in neither bucket.
    Missing,
}

/// A storage backend with validated configuration and a managed lifecycle.
pub struct Storage {
    driver: Box<dyn StorageDriver>,
    digest: Arc<dyn Digest>,
    closed: AtomicBool,
}

impl Storage {
    /// Validate `config`, build its driver and run the driver's `init`.
    pub fn try_new(
        config: &StorageConfig,
        digest: Arc<dyn Digest>,
        random: Arc<dyn RandomSource>,
    ) -> StoreResult<Self> {
        config.validate()?;
        let driver = factory::open_driver(config, random)?;
        Self::with_driver(driver, digest)
    }

    /// Like [`Storage::try_new`], for callers that cannot run without storage.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or the backend cannot be
    /// initialized. A misconfigured backend must never be handed out.
    pub fn new(
        config: &StorageConfig,
        digest: Arc<dyn Digest>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        match Self::try_new(config, digest, random) {
            Ok(storage) => storage,
            Err(e) => panic!("refusing to start with unusable storage backend: {e}"),
        }
    }

    /// Wrap an already-built driver and run its `init`.
    pub fn with_driver(
        driver: Box<dyn StorageDriver>,
        digest: Arc<dyn Digest>,
    ) -> StoreResult<Self> {
        driver.init()?;
        info!(driver = driver.name(), "storage ready");
        Ok(Self {
            driver,
            digest,
            closed: AtomicBool::new(false),
        })
    }

    /// Name of the underlying driver.
    pub fn driver_name(&self) -> &'static str {
        self.driver.name()
    }

    /// Whether [`Storage::cleanup`] has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn open_for(&self, op: &'static str) -> bool {
        if self.is_closed() {
            warn!(op, "call on closed storage refused");
            return false;
        }
        true
    }

    /// Most recent root hash, or `""` if none was ever stored.
    pub fn load_root(&self) -> String {
        if !self.open_for("load_root") {
            return String::new();
        }
        self.driver.load_root().unwrap_or_else(|e| {
            warn!(driver = self.driver.name(), "load_root failed: {e}");
            String::new()
        })
    }

    /// Replace the root hash. Returns whether it was persisted.
    pub fn store_root(&self, hash: &str) -> bool {
        if !self.open_for("store_root") {
            return false;
        }
        match self.driver.store_root(hash) {
            Ok(()) => {
                debug!(root = hash, "root updated");
                true
            }
            Err(e) => {
                warn!(driver = self.driver.name(), "store_root failed: {e}");
                false
            }
        }
    }

    /// Look up `key` in `bucket`.
    pub fn load(&self, key: &str, bucket: Bucket) -> Lookup {
        if !self.open_for("load") || key.is_empty() {
            return Lookup::NotFound;
        }
        match self.driver.load(key, bucket) {
            Ok(value) => value.into(),
            Err(e) => {
                warn!(driver = self.driver.name(), key, %bucket, "load failed: {e}");
                Lookup::NotFound
            }
        }
    }

    /// Store `value` under `key` in `bucket`. Returns whether the write
    /// succeeded; repeating an identical call succeeds again.
    pub fn store(&self, key: &str, value: &[u8], bucket: Bucket) -> bool {
        if !self.open_for("store") {
            return false;
        }
        if key.is_empty() {
            warn!(%bucket, "store with empty key refused");
            return false;
        }
        match self.driver.store(key, value, bucket) {
            Ok(()) => true,
            Err(e) => {
                warn!(driver = self.driver.name(), key, %bucket, "store failed: {e}");
                false
            }
        }
    }

    /// Erase all of `bucket`. On failure the bucket keeps its contents.
    pub fn empty_bucket(&self, bucket: Bucket) -> bool {
        if !self.open_for("empty_bucket") {
            return false;
        }
        match self.driver.empty_bucket(bucket) {
            Ok(()) => true,
            Err(e) => {
                warn!(driver = self.driver.name(), %bucket, "empty_bucket failed: {e}");
                false
            }
        }
    }

    /// Store `value` under its digest in the flag's current bucket.
    /// Returns the key on success.
    pub fn store_object(&self, value: &[u8], flag: &BucketFlag) -> Option<String> {
        let key = self.digest.digest(value);
        self.store(&key, value, flag.current()).then_some(key)
    }

    /// Look up `key` in the flag's current bucket, then in the other one.
    pub fn load_object(&self, key: &str, flag: &BucketFlag) -> Lookup {
        let current = flag.current();
        match self.load(key, current) {
            Lookup::NotFound => self.load(key, current.other()),
            found => found,
        }
    }

    /// Copy `key` from `from` into the other bucket.
    pub fn try_migrate(&self, key: &str, from: Bucket) -> StoreResult<Migration> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let to = from.other();
        if self.driver.load(key, to)?.is_some() {
            return Ok(Migration::AlreadyPresent);
        }
        match self.driver.load(key, from)? {
            Some(value) => {
                self.driver.store(key, &value, to)?;
                Ok(Migration::Copied)
            }
            None => Ok(Migration::Missing),
        }
    }

    /// Boolean form of [`Storage::try_migrate`]: `true` when the value is
    /// present in the destination bucket afterwards.
    pub fn migrate(&self, key: &str, from: Bucket) -> bool {
        match self.try_migrate(key, from) {
            Ok(Migration::AlreadyPresent | Migration::Copied) => true,
            Ok(Migration::Missing) => false,
            Err(e) => {
                warn!(key, %from, "migrate failed: {e}");
                false
            }
        }
    }

    /// Entry and byte counts for `bucket`.
    pub fn stats(&self, bucket: Bucket) -> StoreResult<BucketStats> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        self.driver.stats(bucket)
    }

    /// The injected digest.
    pub fn digest(&self) -> &dyn Digest {
        self.digest.as_ref()
    }

    /// Run the driver's cleanup. Only the first call has an effect; every
    /// later operation is refused.
    pub fn cleanup(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.driver.cleanup();
        info!(driver = self.driver.name(), "storage closed");
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("driver", &self.driver.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}
