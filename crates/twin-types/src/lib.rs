//! Foundation types for twinstore.
//!
//! Every other twinstore crate depends on `twin-types`. The types here are
//! deliberately small: a store is addressed by an opaque string key inside
//! one of two buckets, and the only shared mutable state that crosses the
//! orchestrator/backend boundary is the [`BucketFlag`].
//!
//! # Key Types
//!
//! - [`Bucket`] -- one of the two storage generations (primary / secondary)
//! - [`BucketFlag`] -- atomic cell naming the currently active bucket
//! - [`Lookup`] -- outcome of a keyed load: found with a value, or not found
//! - [`BucketStats`] -- entry and byte counts for one bucket

pub mod bucket;
pub mod error;
pub mod lookup;

pub use bucket::{Bucket, BucketFlag};
pub use error::TypeError;
pub use lookup::{BucketStats, Lookup};
