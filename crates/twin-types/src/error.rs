use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown bucket: {0} (expected \"primary\" or \"secondary\")")]
    UnknownBucket(String),
}
