use twin_types::Bucket;

/// Errors from storage operations.
///
/// The steady-state contract exposed by [`Storage`](crate::Storage) is
/// boolean/optional; these errors carry the cause up to that boundary,
/// where they are logged and folded into `false` or `NotFound`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Construction-time configuration problem. Fatal for the backend.
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// The key cannot be used (empty).
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Error reported by the SQLite engine.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration could not be rendered.
    #[error("config render error: {0}")]
    TomlRender(#[from] toml::ser::Error),

    /// The backend has been cleaned up; no further calls are allowed.
    #[error("storage backend is closed")]
    Closed,

    /// A bucket operation failed at the backend.
    #[error("{op} failed on {bucket} bucket")]
    Backend { op: &'static str, bucket: Bucket },

    /// Another reclamation is already running.
    #[error("reclamation already in progress")]
    ReclaimInProgress,

    /// A lock was poisoned by a panicking thread.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned(e.to_string())
    }
}
