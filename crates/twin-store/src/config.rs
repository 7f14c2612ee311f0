use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use twin_types::Bucket;

use crate::error::{StoreError, StoreResult};

/// Which physical backend a store runs on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// In-process map; contents are lost when the store is dropped.
    #[default]
    Memory,
    /// One SQLite table per bucket plus a control table for the root.
    Sqlite,
    /// One directory per bucket plus a root sentinel file.
    Filesystem,
}

impl DriverKind {
    /// Whether the driver persists to `path`.
    pub fn is_on_disk(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Sqlite => write!(f, "sqlite"),
            Self::Filesystem => write!(f, "filesystem"),
        }
    }
}

impl FromStr for DriverKind {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "filesystem" | "fs" => Ok(Self::Filesystem),
            other => Err(StoreError::InvalidConfig(format!("unknown driver: {other}"))),
        }
    }
}

/// Read-only backend parameters, fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub driver: DriverKind,
    /// Storage folder for on-disk drivers. For SQLite, `":memory:"` opens
    /// an in-memory database.
    pub path: PathBuf,
    pub sqlite_file: String,
    pub primary_table: String,
    pub secondary_table: String,
    pub control_table: String,
    pub primary_dir: String,
    pub secondary_dir: String,
    pub root_file: String,
    /// Worker threads deleting reclaimed bucket directories.
    pub reclaim_workers: usize,
    /// Bound on queued deletions before new ones are deferred.
    pub reclaim_queue: usize,
    /// How long SQLite waits on a locked database before failing a call.
    pub sqlite_busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            driver: DriverKind::Memory,
            path: PathBuf::from("."),
            sqlite_file: "twin.sqlite3".into(),
            primary_table: "a".into(),
            secondary_table: "b".into(),
            control_table: "control".into(),
            primary_dir: "a".into(),
            secondary_dir: "b".into(),
            root_file: "root".into(),
            reclaim_workers: 2,
            reclaim_queue: 16,
            sqlite_busy_timeout_ms: 5_000,
        }
    }
}

impl StorageConfig {
    /// Default configuration for `driver` rooted at `path`.
    pub fn new(driver: DriverKind, path: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> StoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Table holding `bucket`'s values.
    pub fn table_name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Primary => &self.primary_table,
            Bucket::Secondary => &self.secondary_table,
        }
    }

    /// Directory (relative to `path`) holding `bucket`'s values.
    pub fn dir_name(&self, bucket: Bucket) -> &str {
        match bucket {
            Bucket::Primary => &self.primary_dir,
            Bucket::Secondary => &self.secondary_dir,
        }
    }

    /// Check every rule a backend relies on. A backend must not be built
    /// from a configuration that fails here.
    pub fn validate(&self) -> StoreResult<()> {
        if self.driver.is_on_disk() && self.path.as_os_str().is_empty() {
            return Err(invalid("path must not be empty for on-disk drivers"));
        }
        if self.reclaim_workers == 0 {
            return Err(invalid("reclaim_workers must be at least 1"));
        }
        if self.reclaim_queue == 0 {
            return Err(invalid("reclaim_queue must be at least 1"));
        }

        let tables = [
            ("primary_table", &self.primary_table),
            ("secondary_table", &self.secondary_table),
            ("control_table", &self.control_table),
        ];
        for (field, name) in tables {
            if !is_sql_identifier(name) {
                return Err(invalid(format!(
                    "{field} {name:?} is not a plain SQL identifier"
                )));
            }
            if name.to_ascii_lowercase().starts_with("sqlite_") {
                return Err(invalid(format!(
                    "{field} {name:?} uses the prefix reserved by SQLite"
                )));
            }
        }
        distinct(&tables)?;

        let files = [
            ("primary_dir", &self.primary_dir),
            ("secondary_dir", &self.secondary_dir),
            ("root_file", &self.root_file),
        ];
        for (field, name) in files {
            if !is_path_component(name) {
                return Err(invalid(format!(
                    "{field} {name:?} is not a single path component"
                )));
            }
        }
        distinct(&files)?;

        if !is_path_component(&self.sqlite_file) {
            return Err(invalid(format!(
                "sqlite_file {:?} is not a single path component",
                self.sqlite_file
            )));
        }
        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> StoreError {
    StoreError::InvalidConfig(reason.into())
}

// SQLite identifiers, quoted or not, and some filesystems ignore ASCII case.
fn distinct(names: &[(&str, &String)]) -> StoreResult<()> {
    let mut seen = HashSet::new();
    for (field, name) in names {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(invalid(format!("{field} {name:?} is used twice")));
        }
    }
    Ok(())
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// Dot-prefixed names are reserved for in-flight temporary files.
fn is_path_component(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with(".trash")
        && !name.contains(['/', '\\', '\0'])
}
