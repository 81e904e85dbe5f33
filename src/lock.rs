//! Locking and atomic writes for archive mutations
//!
//! Two layers serialize writers of a project archive:
//! - An in-process async mutex per lock path, so concurrent tasks in one
//!   process queue up instead of racing for the OS lock
//! - An fs2/flock file lock, so separate processes serialize as well
//!
//! Readers never lock. Files are replaced with a temp-file-and-rename so a
//! reader sees either the old or the new content.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tempfile::NamedTempFile;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 50;

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // Windows reports sharing and lock violations as raw os errors 32/33.
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// A file lock guard that releases the lock when dropped
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive lock on a file, creating it if needed.
    ///
    /// Fails with [`Error::LockFailed`] once `timeout_ms` has elapsed.
    pub fn acquire(path: impl AsRef<Path>, timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(FileLock {
                        file,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockFailed(path.to_path_buf()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Try to acquire a lock without waiting
    ///
    /// Returns `Ok(None)` if another holder has it.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let file = open_lock_file(path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLock {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Get the path to the locked file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

// =============================================================================
// Async project lock
// =============================================================================

type LockRegistry = Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>;

fn registry() -> &'static LockRegistry {
    static REGISTRY: OnceLock<LockRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The process-wide async mutex guarding `path`.
///
/// Entries only the registry still references are idle and get pruned here,
/// so the map holds just the paths with a holder or a waiter.
fn process_mutex(path: &Path) -> Arc<AsyncMutex<()>> {
    let mut map = registry()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    map.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    Arc::clone(map.entry(path.to_path_buf()).or_default())
}

/// Holds both lock layers; dropping it releases the file lock, then the mutex
#[derive(Debug)]
pub struct ArchiveWriteGuard {
    file: FileLock,
    _process: OwnedMutexGuard<()>,
}

impl ArchiveWriteGuard {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Acquire the write lock at `path` from async code.
///
/// Tasks in this process wait on the in-process mutex; the blocking file lock
/// wait runs off the async executor.
pub async fn acquire_async(path: impl AsRef<Path>, timeout_ms: u64) -> Result<ArchiveWriteGuard> {
    let path = path.as_ref().to_path_buf();
    let process = process_mutex(&path).lock_owned().await;

    let file = tokio::task::spawn_blocking(move || FileLock::acquire(&path, timeout_ms))
        .await
        .map_err(|err| Error::OperationFailed(format!("lock task failed: {err}")))??;

    Ok(ArchiveWriteGuard {
        file,
        _process: process,
    })
}

// =============================================================================
// Atomic writes
// =============================================================================

/// Atomically replace `path` with `data`.
///
/// The temp file lives in the target directory so the final rename never
/// crosses a filesystem.
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| Error::Io(err.error))?;

    Ok(())
}

/// Atomically write string data to a file
pub fn write_atomic_str(path: impl AsRef<Path>, data: &str) -> Result<()> {
    write_atomic(path, data.as_bytes())
}
