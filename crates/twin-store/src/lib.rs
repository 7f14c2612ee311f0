//! Two-bucket content-addressed storage.
//!
//! Values are immutable and keyed by their digest. Every backend keeps two
//! buckets plus a single root hash, and presents the same contract:
//! load/store of the root, load/store of a value in a bucket, and a bulk
//! erase of one bucket. On top of that contract, [`GenerationalStore`]
//! rotates the buckets so that reclaiming garbage costs a copy of the live
//! set plus one bulk erase.
//!
//! # Backends
//!
//! All backends implement [`StorageDriver`] and are wrapped by [`Storage`]:
//!
//! - [`MemoryDriver`] -- `HashMap`-based reference backend
//! - [`SqliteDriver`] -- one table per bucket plus a control table
//! - [`FsDriver`] -- one directory per bucket, erased by rename and
//!   background delete on a [`ReclaimPool`]
//!
//! Drivers are chosen from a [`StorageConfig`] by [`open_driver`]; there is
//! no global instance.
//!
//! # Design Rules
//!
//! 1. Values are never modified once written; storing a key again is a no-op
//!    that still reports success.
//! 2. Expected failures surface as `false` or [`Lookup::NotFound`](twin_types::Lookup)
//!    at the [`Storage`] boundary, never as panics.
//! 3. The active bucket is owned by the orchestrator; backends only receive
//!    it per call.
//! 4. A bucket is never erased while another call is using it.

pub mod config;
pub mod error;
pub mod factory;
pub mod fs;
pub mod memory;
pub mod plugin;
pub mod pool;
pub mod rotation;
pub mod sqlite;
pub mod traits;

#[cfg(test)]
mod conformance;

// Re-export primary types at crate root for ergonomic imports.
pub use config::{DriverKind, StorageConfig};
pub use error::{StoreError, StoreResult};
pub use factory::open_driver;
pub use fs::FsDriver;
pub use memory::MemoryDriver;
pub use plugin::{Migration, Storage};
pub use pool::ReclaimPool;
pub use rotation::{GenerationStats, GenerationalStore, ReclaimReport};
pub use sqlite::SqliteDriver;
pub use traits::StorageDriver;
