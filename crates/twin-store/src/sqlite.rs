//! SQLite driver.
//!
//! Each bucket is its own table with schema `(key TEXT PRIMARY KEY, value
//! BLOB)`, and a single-row control table holds the root hash. Emptying a
//! bucket drops and re-creates its table inside one transaction, so
//! reclamation costs O(1) statements regardless of how many rows the stale
//! generation holds.
//!
//! The connection sits behind a `Mutex`; every call is one lock scope and
//! at most one transaction.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};
use twin_types::{Bucket, BucketStats};

use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::traits::StorageDriver;

const ROOT_ROW: i64 = 0;

struct SqliteState {
    conn: Connection,
    /// Whether each bucket's table is known to exist.
    ready: [bool; 2],
}

/// Driver mapping buckets onto SQLite tables.
pub struct SqliteDriver {
    state: Mutex<Option<SqliteState>>,
    tables: [String; 2],
    control: String,
    location: String,
}

impl SqliteDriver {
    /// Open (or create) the database described by `config`.
    ///
    /// `config.path == ":memory:"` opens a private in-memory database.
    pub fn open(config: &StorageConfig) -> StoreResult<Self> {
        let (conn, location) = if config.path == Path::new(":memory:") {
            (Connection::open_in_memory()?, ":memory:".to_string())
        } else {
            std::fs::create_dir_all(&config.path)?;
            let file = config.path.join(&config.sqlite_file);
            let conn = Connection::open(&file)?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(file = %file.display(), journal_mode = %mode, "opened sqlite database");
            (conn, file.display().to_string())
        };
        conn.busy_timeout(Duration::from_millis(config.sqlite_busy_timeout_ms))?;

        Ok(Self {
            state: Mutex::new(Some(SqliteState {
                conn,
                ready: [false; 2],
            })),
            tables: [
                config.table_name(Bucket::Primary).to_string(),
                config.table_name(Bucket::Secondary).to_string(),
            ],
            control: config.control_table.clone(),
            location,
        })
    }

    fn table(&self, bucket: Bucket) -> &str {
        &self.tables[bucket.index()]
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SqliteState) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.state.lock()?;
        let state = guard.as_mut().ok_or(StoreError::Closed)?;
        f(state)
    }

    /// Create `bucket`'s table if this connection has not seen it yet.
    fn ensure_table(&self, state: &mut SqliteState, bucket: Bucket) -> StoreResult<()> {
        if state.ready[bucket.index()] {
            return Ok(());
        }
        state.conn.execute_batch(&create_table_sql(self.table(bucket)))?;
        state.ready[bucket.index()] = true;
        debug!(table = self.table(bucket), %bucket, "bucket table ready");
        Ok(())
    }
}

fn create_table_sql(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS \"{table}\" (key TEXT PRIMARY KEY, value BLOB);")
}

impl StorageDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn init(&self) -> StoreResult<()> {
        self.with_state(|state| {
            state.conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{}\" \
                 (id INTEGER PRIMARY KEY, root_hash TEXT NOT NULL);",
                self.control
            ))?;
            Ok(())
        })?;
        info!(location = %self.location, "sqlite storage initialized");
        Ok(())
    }

    fn load_root(&self) -> StoreResult<String> {
        self.with_state(|state| {
            let sql = format!("SELECT root_hash FROM \"{}\" WHERE id = ?1", self.control);
            let root: Option<String> = state
                .conn
                .prepare_cached(&sql)?
                .query_row(params![ROOT_ROW], |row| row.get(0))
                .optional()?;
            Ok(root.unwrap_or_default())
        })
    }

    fn store_root(&self, hash: &str) -> StoreResult<()> {
        self.with_state(|state| {
            let sql = format!(
                "INSERT OR REPLACE INTO \"{}\" (id, root_hash) VALUES (?1, ?2)",
                self.control
            );
            state.conn.prepare_cached(&sql)?.execute(params![ROOT_ROW, hash])?;
            Ok(())
        })
    }

    fn load(&self, key: &str, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        self.with_state(|state| {
            self.ensure_table(state, bucket)?;
            let sql = format!("SELECT value FROM \"{}\" WHERE key = ?1", self.table(bucket));
            let value = state
                .conn
                .prepare_cached(&sql)?
                .query_row(params![key], |row| row.get::<_, Vec<u8>>(0))
                .optional()?;
            Ok(value)
        })
    }

    fn store(&self, key: &str, value: &[u8], bucket: Bucket) -> StoreResult<()> {
        self.with_state(|state| {
            self.ensure_table(state, bucket)?;
            let sql = format!(
                "INSERT OR IGNORE INTO \"{}\" (key, value) VALUES (?1, ?2)",
                self.table(bucket)
            );
            state.conn.prepare_cached(&sql)?.execute(params![key, value])?;
            Ok(())
        })
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        let table = self.table(bucket);
        self.with_state(|state| {
            // Cached statements still reference the table about to be dropped.
            state.conn.flush_prepared_statement_cache();
            let tx = state.conn.transaction()?;
            tx.execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\";"))?;
            tx.execute_batch(&create_table_sql(table))?;
            tx.commit()?;
            state.ready[bucket.index()] = true;
            Ok(())
        })?;
        info!(table, %bucket, "bucket table dropped and re-created");
        Ok(())
    }

    fn stats(&self, bucket: Bucket) -> StoreResult<BucketStats> {
        self.with_state(|state| {
            self.ensure_table(state, bucket)?;
            let sql = format!(
                "SELECT COUNT(*), COALESCE(SUM(LENGTH(value)), 0) FROM \"{}\"",
                self.table(bucket)
            );
            let (entries, bytes): (i64, i64) = state
                .conn
                .query_row(&sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
            Ok(BucketStats {
                entries: u64::try_from(entries).unwrap_or_default(),
                bytes: u64::try_from(bytes).unwrap_or_default(),
            })
        })
    }

    fn cleanup(&self) {
        let state = match self.state.lock() {
            Ok(mut guard) => guard.take(),
            Err(e) => {
                warn!("sqlite state lock poisoned during cleanup: {e}");
                return;
            }
        };
        if let Some(state) = state {
            if let Err((_, e)) = state.conn.close() {
                warn!(location = %self.location, "closing sqlite database failed: {e}");
            } else {
                debug!(location = %self.location, "sqlite database closed");
            }
        }
    }
}

impl std::fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDriver")
            .field("location", &self.location)
            .field("tables", &self.tables)
            .field("control", &self.control)
            .finish()
    }
}
