//! Capabilities injected into every twinstore backend.
//!
//! Backends never reach for global hashing or randomness. They receive a
//! [`Digest`] (content addressing) and a [`RandomSource`] (ephemeral names,
//! e.g. the discard directory of a reclaimed bucket) at construction.
//!
//! Both traits have blanket implementations for plain closures, so tests and
//! embedders can pass `|data: &[u8]| ...` directly.

pub mod digest;
pub mod random;

pub use digest::{Blake3Digest, Digest};
pub use random::{OsRandom, RandomSource};
