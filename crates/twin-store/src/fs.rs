//! Filesystem driver.
//!
//! Layout under the configured folder:
//!
//! ```text
//! <path>/<primary_dir>/<entry>     values of the primary bucket
//! <path>/<secondary_dir>/<entry>   values of the secondary bucket
//! <path>/<root_file>               root hash sentinel
//! <path>/<random>.trash            reclaimed bucket awaiting deletion
//! ```
//!
//! Every write goes to a dot-prefixed temporary file and is renamed into
//! place, so readers see either nothing or a complete value. Emptying a
//! bucket renames its directory to a random `.trash` name, re-creates the
//! original directory, and hands the recursive delete to the
//! [`ReclaimPool`]. Trash left behind by a crash or a full queue is swept on
//! the next [`init`](StorageDriver::init).

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, info, warn};
use twin_crypto::{Blake3Digest, Digest, RandomSource};
use twin_types::{Bucket, BucketStats};
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::{StoreError, StoreResult};
use crate::pool::ReclaimPool;
use crate::traits::StorageDriver;

const TRASH_SUFFIX: &str = ".trash";

/// Longest entry name written verbatim or escaped; longer keys are hashed.
const MAX_ENTRY_NAME: usize = 200;

/// Marker for hashed entry names. Outside both the plain and `%` forms.
const HASHED_PREFIX: char = '~';

const ENTRY_DIGEST: Blake3Digest = Blake3Digest::new("twin-fs-entry-v1");

/// Driver mapping buckets onto directories.
pub struct FsDriver {
    folder: PathBuf,
    dirs: [PathBuf; 2],
    root_path: PathBuf,
    random: Arc<dyn RandomSource>,
    pool: ReclaimPool,
    root_lock: RwLock<()>,
    swap_locks: [Mutex<()>; 2],
}

impl FsDriver {
    /// Build a driver for `config`. Nothing touches the disk until `init`.
    pub fn open(config: &StorageConfig, random: Arc<dyn RandomSource>) -> StoreResult<Self> {
        let folder = config.path.clone();
        Ok(Self {
            dirs: [
                folder.join(config.dir_name(Bucket::Primary)),
                folder.join(config.dir_name(Bucket::Secondary)),
            ],
            root_path: folder.join(&config.root_file),
            folder,
            random,
            pool: ReclaimPool::new(config.reclaim_workers, config.reclaim_queue)?,
            root_lock: RwLock::new(()),
            swap_locks: [Mutex::new(()), Mutex::new(())],
        })
    }

    fn bucket_dir(&self, bucket: Bucket) -> &Path {
        &self.dirs[bucket.index()]
    }

    fn entry_path(&self, key: &str, bucket: Bucket) -> StoreResult<PathBuf> {
        Ok(self.bucket_dir(bucket).join(entry_name(key)?))
    }

    /// Write `data` to `target` via a temporary file in `dir`.
    fn write_atomic(&self, dir: &Path, target: &Path, data: &[u8]) -> StoreResult<()> {
        let tmp = dir.join(format!(".{}.tmp", self.random.random_name()));
        let result = write_synced(&tmp, data).and_then(|()| fs::rename(&tmp, target));
        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(result?)
    }

    fn schedule_delete(&self, trash: PathBuf) {
        let shown = trash.display().to_string();
        if self.pool.submit(move || remove_trash(&trash)) {
            debug!(trash = %shown, "queued reclaimed directory for deletion");
        } else {
            warn!(trash = %shown, "reclaimed directory left for the next sweep");
        }
    }

    /// Queue deletion of trash directories and drop temporary files left by
    /// an earlier process, both in the storage folder and in bucket
    /// directories.
    fn sweep(&self) -> StoreResult<()> {
        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let file_type = entry.file_type()?;
            if file_type.is_dir() && name.ends_with(TRASH_SUFFIX) {
                self.schedule_delete(entry.path());
            } else if file_type.is_file() && is_temp_name(&name) {
                fs::remove_file(entry.path())?;
            }
        }
        for dir in &self.dirs {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let temp = is_temp_name(&entry.file_name().to_string_lossy());
                if temp && entry.file_type()?.is_file() {
                    fs::remove_file(entry.path())?;
                    debug!(path = %entry.path().display(), "removed partial write");
                }
            }
        }
        Ok(())
    }
}

/// Map a key onto a file name. Keys made of `[A-Za-z0-9_.-]` that do not
/// start with `.` are used verbatim; anything else becomes `%` + hex. Names
/// longer than [`MAX_ENTRY_NAME`] become `~` + a digest of the key.
fn entry_name(key: &str) -> StoreResult<String> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    let plain = !key.starts_with('.')
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    let name = if plain {
        key.to_string()
    } else {
        format!("%{}", hex::encode(key.as_bytes()))
    };
    if name.len() > MAX_ENTRY_NAME {
        return Ok(format!("{HASHED_PREFIX}{}", ENTRY_DIGEST.digest(key.as_bytes())));
    }
    Ok(name)
}

/// Move `dir` aside to `trash` and put a directory made by `create` in its
/// place. If `create` fails, `dir` is moved back before the error returns.
fn swap_out(
    dir: &Path,
    trash: &Path,
    create: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<()> {
    fs::rename(dir, trash)?;
    if let Err(e) = create(dir) {
        if let Err(restore) = fs::rename(trash, dir) {
            warn!(
                dir = %dir.display(),
                trash = %trash.display(),
                "restoring bucket directory failed: {restore}"
            );
        }
        return Err(e);
    }
    Ok(())
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(".tmp")
}

fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn remove_trash(trash: &Path) {
    match fs::remove_dir_all(trash) {
        Ok(()) => debug!(trash = %trash.display(), "reclaimed directory deleted"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(trash = %trash.display(), "deleting reclaimed directory failed: {e}"),
    }
}

impl StorageDriver for FsDriver {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn init(&self) -> StoreResult<()> {
        fs::create_dir_all(&self.folder)?;
        for dir in &self.dirs {
            fs::create_dir_all(dir)?;
        }
        self.sweep()?;
        info!(folder = %self.folder.display(), "filesystem storage initialized");
        Ok(())
    }

    fn load_root(&self) -> StoreResult<String> {
        let _guard = self.root_lock.read()?;
        match fs::read_to_string(&self.root_path) {
            Ok(root) => Ok(root),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn store_root(&self, hash: &str) -> StoreResult<()> {
        let _guard = self.root_lock.write()?;
        self.write_atomic(&self.folder, &self.root_path, hash.as_bytes())
    }

    fn load(&self, key: &str, bucket: Bucket) -> StoreResult<Option<Vec<u8>>> {
        let path = self.entry_path(key, bucket)?;
        match fs::read(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, key: &str, value: &[u8], bucket: Bucket) -> StoreResult<()> {
        let path = self.entry_path(key, bucket)?;
        if path.is_file() {
            return Ok(());
        }
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            fs::create_dir_all(dir)?;
        }
        self.write_atomic(dir, &path, value)
    }

    fn empty_bucket(&self, bucket: Bucket) -> StoreResult<()> {
        let _guard = self.swap_locks[bucket.index()].lock()?;
        let dir = self.bucket_dir(bucket);
        let trash = self
            .folder
            .join(format!("{}{TRASH_SUFFIX}", self.random.random_name()));

        if !dir.is_dir() {
            fs::create_dir_all(dir)?;
            return Ok(());
        }
        swap_out(dir, &trash, |dir| fs::create_dir(dir))?;
        info!(%bucket, dir = %dir.display(), "bucket directory swapped out");
        self.schedule_delete(trash);
        Ok(())
    }

    fn stats(&self, bucket: Bucket) -> StoreResult<BucketStats> {
        let dir = self.bucket_dir(bucket);
        let mut stats = BucketStats::default();
        if !dir.is_dir() {
            return Ok(stats);
        }
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e)))?;
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !entry.file_type().is_file() || hidden {
                continue;
            }
            let meta = entry.metadata().map_err(|e| StoreError::Io(io::Error::other(e)))?;
            stats.entries += 1;
            stats.bytes += meta.len();
        }
        Ok(stats)
    }

    fn cleanup(&self) {
        self.pool.shutdown();
        debug!(folder = %self.folder.display(), "filesystem storage closed");
    }
}

impl std::fmt::Debug for FsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsDriver")
            .field("folder", &self.folder)
            .field("dirs", &self.dirs)
            .field("root_path", &self.root_path)
            .finish()
    }
}
