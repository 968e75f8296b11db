//! Advisory locks on download destinations.
//!
//! A destination file may only be written by one download at a time. The
//! registry only tracks which paths are held; the [`FileLock`] guard ties the
//! release of a path to the lifetime of whoever owns the guard.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use path_clean::clean;
use tracing::{debug, warn};

use crate::shared::errors::TransferError;

static SHARED_LOCKS: LazyLock<Arc<FileLocks>> = LazyLock::new(|| Arc::new(FileLocks::default()));

pub trait LockRegistry: Send + Sync {
    ///Try to take the lock on `path`, returns false if it is already held.
    fn try_lock(&self, path: &Path) -> bool;
    ///Release the lock on `path`, returns false if it wasn't held.
    fn unlock(&self, path: &Path) -> bool;
}

/// In-process lock registry keyed by the lexically cleaned path.
#[derive(Default, Debug)]
pub struct FileLocks {
    held: Mutex<HashSet<PathBuf>>,
}

impl FileLocks {
    ///Registry shared by every download of this process.
    pub fn shared() -> Arc<FileLocks> {
        SHARED_LOCKS.clone()
    }

    pub fn is_locked(&self, path: &Path) -> bool {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.contains(&clean(path))
    }
}

impl LockRegistry for FileLocks {
    fn try_lock(&self, path: &Path) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.insert(clean(path))
    }

    fn unlock(&self, path: &Path) -> bool {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&clean(path))
    }
}

/// Owned lock on a destination file.
///
/// Whoever holds the guard is the only party allowed to release the lock.
/// Release happens once: either through [`FileLock::release`] or, on any
/// other exit path (early return, panic, dropped future), when the guard is dropped.
pub struct FileLock {
    registry: Arc<dyn LockRegistry>,
    path: PathBuf,
    released: bool,
}

impl FileLock {
    pub fn acquire(registry: Arc<dyn LockRegistry>, path: impl Into<PathBuf>) -> Result<Self, TransferError> {
        let path = path.into();
        if !registry.try_lock(&path) {
            return Err(TransferError::FileLocked(path));
        }
        debug!(path = %path.display(), "Acquired destination file lock");
        Ok(Self { registry, path, released: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) {
        self.unlock_once();
    }

    fn unlock_once(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.registry.unlock(&self.path) {
            debug!(path = %self.path.display(), "Released destination file lock");
        } else {
            warn!(path = %self.path.display(), "Destination file lock was not held on release");
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.unlock_once();
    }
}

impl std::fmt::Debug for FileLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLock")
            .field("path", &self.path)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let locks: Arc<dyn LockRegistry> = Arc::new(FileLocks::default());
        let first = FileLock::acquire(locks.clone(), "/tmp/video.mp4");
        assert!(first.is_ok());

        let second = FileLock::acquire(locks.clone(), "/tmp/./video.mp4");
        assert!(matches!(second, Err(TransferError::FileLocked(_))));
    }

    #[test]
    fn test_release_and_drop_unlock() {
        let locks = Arc::new(FileLocks::default());
        let path = Path::new("/tmp/archive.zip");

        let lock = FileLock::acquire(locks.clone(), path).expect("lock should be free");
        assert!(locks.is_locked(path));
        lock.release();
        assert!(!locks.is_locked(path));

        {
            let _lock = FileLock::acquire(locks.clone(), path).expect("lock should be free again");
            assert!(locks.is_locked(path));
        }
        assert!(!locks.is_locked(path));
    }

    #[test]
    fn test_shared_registry_is_process_wide() {
        let path = Path::new("/tmp/mpdl-shared-registry-test.bin");
        let lock = FileLock::acquire(FileLocks::shared(), path).expect("lock should be free");
        assert!(FileLocks::shared().is_locked(path));
        drop(lock);
        assert!(!FileLocks::shared().is_locked(path));
    }
}
