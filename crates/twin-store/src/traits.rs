use twin_types::{Bucket, BucketStats};

use crate::error::StoreResult;

/// Backend contract for two-bucket key-value storage.
///
/// All implementations must satisfy these invariants:
/// - Values are immutable once written. Keys are content hashes, so storing
///   an existing key again with the same value is a successful no-op.
/// - `load`/`store` on distinct keys, or on different buckets, never
///   interfere with each other.
/// - `load_root`/`store_root` are serialized: a reader never sees a partial
///   root, and after concurrent writers the root equals one of the
///   submitted values.
/// - `empty_bucket` is the only operation that removes data, and it removes
///   the whole bucket as one unit. On failure the bucket keeps its prior
///   contents.
/// - The store never interprets values.
///
/// Drivers never own the active-bucket flag; every call names its bucket.
pub trait StorageDriver: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Most recently stored root hash, or an empty string if none.
    fn load_root(&self) -> StoreResult<String>;

    /// Replace the root hash.
    fn store_root(&self, hash: &str) -> StoreResult<()>;

    /// Read `key` from `bucket`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    fn load(&self, key: &str, bucket: Bucket) -> StoreResult<Option<Vec<u8>>>;

    /// Write `value` under `key` in `bucket`. Idempotent.
    fn store(&self, key: &str, value: &[u8], bucket: Bucket) -> StoreResult<()>;

    /// Erase all of `bucket` as a single unit and leave it ready for writes.
    ///
    /// Callers guarantee that no `load`/`store` on this bucket is in flight
    /// for the duration of the call.
    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()>;

    /// Entry and byte counts for `bucket`.
    fn stats(&self, bucket: Bucket) -> StoreResult<BucketStats>;

    /// Backend-specific setup, run once when construction completes.
    fn init(&self) -> StoreResult<()> {
        Ok(())
    }

    /// Backend-specific teardown, run exactly once before destruction.
    fn cleanup(&self) {}
}
