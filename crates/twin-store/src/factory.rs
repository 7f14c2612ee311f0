//! Driver selection by configuration.
//!
//! There is no global storage instance: the caller picks a driver through
//! [`open_driver`] (usually via [`Storage::try_new`](crate::Storage::try_new))
//! and owns the handle it gets back.

use std::sync::Arc;

use tracing::debug;
use twin_crypto::RandomSource;

use crate::config::{DriverKind, StorageConfig};
use crate::error::StoreResult;
use crate::fs::FsDriver;
use crate::memory::MemoryDriver;
use crate::sqlite::SqliteDriver;
use crate::traits::StorageDriver;

/// Build the driver named by `config.driver`. Does not run `init`.
pub fn open_driver(
    config: &StorageConfig,
    random: Arc<dyn RandomSource>,
) -> StoreResult<Box<dyn StorageDriver>> {
    config.validate()?;
    debug!(driver = %config.driver, path = %config.path.display(), "opening storage driver");
    let driver: Box<dyn StorageDriver> = match config.driver {
        DriverKind::Memory => Box::new(MemoryDriver::new()),
        DriverKind::Sqlite => Box::new(SqliteDriver::open(config)?),
        DriverKind::Filesystem => Box::new(FsDriver::open(config, random)?),
    };
    Ok(driver)
}
