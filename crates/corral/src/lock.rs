//! Entity locks.
//!
//! Every pod and container carries an [`EntityLock`]: an in-process mutex
//! over its mutable data, optionally paired with an advisory `flock` on a
//! lock file so that several processes sharing one state directory serialise
//! on the same entity.
//!
//! Lock order across the crate is Runtime → Pod → Container(s). Guards
//! release in reverse order when dropped.

use std::fs::{File, OpenOptions};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use corral_common::{CorralError, CorralResult};
use parking_lot::{Mutex, MutexGuard};
use rustix::fs::{FlockOperation, flock};

/// An exclusive advisory lock on a file, released on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl FileLockGuard {
    /// Block until an exclusive lock on `path` is held.
    ///
    /// The file and its parent directories are created if missing.
    pub fn acquire(path: &Path) -> CorralResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        flock(&file, FlockOperation::LockExclusive).map_err(|e| {
            CorralError::backend(
                format!("error locking {}", path.display()),
                std::io::Error::from(e),
            )
        })?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the locked file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = flock(&self.file, FlockOperation::Unlock) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release file lock");
        }
    }
}

/// Mutex over an entity's mutable data plus its optional lock file.
#[derive(Debug)]
pub struct EntityLock<T> {
    data: Mutex<T>,
    lock_file: Option<PathBuf>,
}

impl<T> EntityLock<T> {
    /// Create a lock around `data`.
    pub fn new(data: T, lock_file: Option<PathBuf>) -> Self {
        Self {
            data: Mutex::new(data),
            lock_file,
        }
    }

    /// Acquire the lock, blocking without timeout.
    pub fn lock(&self) -> CorralResult<EntityGuard<'_, T>> {
        let data = self.data.lock();
        let file = self
            .lock_file
            .as_deref()
            .map(FileLockGuard::acquire)
            .transpose()?;
        Ok(EntityGuard {
            file,
            data,
            lock_file: self.lock_file.as_deref(),
        })
    }

    /// Run `f` against the data while briefly holding only the in-process
    /// mutex. Must not be called by a thread that already holds the guard.
    pub fn peek<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.data.lock())
    }

    /// The lock file, if inter-process locking is enabled.
    #[must_use]
    pub fn lock_file(&self) -> Option<&Path> {
        self.lock_file.as_deref()
    }
}

/// Guard returned by [`EntityLock::lock`].
#[derive(Debug)]
pub struct EntityGuard<'a, T> {
    // Declared before `data` so the file lock is released first.
    file: Option<FileLockGuard>,
    data: MutexGuard<'a, T>,
    lock_file: Option<&'a Path>,
}

impl<T> EntityGuard<'_, T> {
    /// Unlink the lock file of an entity that is going away.
    ///
    /// The lock itself stays held until the guard drops.
    pub fn discard_lock_file(&self) {
        let Some(path) = self.lock_file else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed lock file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove lock file");
            }
        }
    }

    /// Whether an inter-process lock is held alongside the mutex.
    #[must_use]
    pub const fn holds_file_lock(&self) -> bool {
        self.file.is_some()
    }
}

impl<T> Deref for EntityGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for EntityGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn lock_without_file() {
        let lock = EntityLock::new(1u32, None);
        {
            let mut guard = lock.lock().unwrap();
            *guard += 1;
            assert!(!guard.holds_file_lock());
        }
        assert_eq!(lock.peek(|v| *v), 2);
    }

    #[test]
    fn lock_creates_lock_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("locks/pods/p1.lock");
        let lock = EntityLock::new((), Some(path.clone()));

        let guard = lock.lock().unwrap();
        assert!(guard.holds_file_lock());
        assert!(path.exists());

        guard.discard_lock_file();
        assert!(!path.exists());
    }

    #[test]
    fn file_lock_excludes_second_open_file_description() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("entity.lock");

        let first = FileLockGuard::acquire(&path).unwrap();

        // flock locks belong to the open file description, so a second
        // descriptor must not be able to take the lock without blocking.
        let other = File::open(&path).unwrap();
        assert!(flock(&other, FlockOperation::NonBlockingLockExclusive).is_err());

        drop(first);
        assert!(flock(&other, FlockOperation::NonBlockingLockExclusive).is_ok());
    }

    #[test]
    fn entity_lock_serialises_threads() {
        let lock = Arc::new(EntityLock::new(Vec::<u32>::new(), None));

        let guard = lock.lock().unwrap();
        let worker = {
            let lock = Arc::clone(&lock);
            std::thread::spawn(move || lock.lock().unwrap().push(2))
        };
        std::thread::sleep(Duration::from_millis(50));
        drop(guard);
        worker.join().unwrap();

        lock.lock().unwrap().push(3);
        assert_eq!(lock.peek(Clone::clone), vec![2, 3]);
    }
}
