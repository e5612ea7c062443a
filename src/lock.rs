//! Named exclusive lock shared by every process and thread touching a medium
//!
//! Exclusion is two-layered: an advisory lock on `<dir>/<name>` keeps other
//! processes out, and a process-wide mutex registered under the same path
//! keeps other threads of this process out regardless of how the platform
//! scopes file locks. Ownership is released when the returned guard drops,
//! so early returns and `?` never leave the medium locked.

use crate::error::Result;
use fs2::FileExt;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// In-process mutexes keyed by lock file path
static LOCAL_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A process-wide, cross-process exclusive lock keyed by name
pub struct ExclusiveLock {
    /// Path of the lock file
    path: PathBuf,
    /// Handle the advisory lock is taken on
    file: File,
    /// In-process mutex shared by every handle on the same path
    local: Arc<Mutex<()>>,
}

impl ExclusiveLock {
    /// Open (creating if needed) the lock named `name` inside `dir`
    pub fn open<P: AsRef<Path>>(dir: P, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(name);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let local = LOCAL_LOCKS
            .lock()
            .entry(path.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        Ok(Self { path, file, local })
    }

    /// Path of the underlying lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until exclusive ownership is held
    ///
    /// Not re-entrant: acquiring again while a guard from the same lock is
    /// alive blocks forever.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        let local = self.local.lock();
        // fully qualified: std::fs::File grew inherent lock methods
        FileExt::lock_exclusive(&self.file)?;
        Ok(LockGuard {
            lock: self,
            _local: local,
        })
    }
}

impl std::fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveLock")
            .field("path", &self.path)
            .finish()
    }
}

/// Proof of ownership; dropping it releases the lock
pub struct LockGuard<'a> {
    lock: &'a ExclusiveLock,
    _local: MutexGuard<'a, ()>,
}

impl LockGuard<'_> {
    /// Relinquish ownership explicitly
    pub fn release(self) {}
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // the in-process mutex is released after this, when `_local` drops
        if let Err(e) = FileExt::unlock(&self.lock.file) {
            warn!(path = %self.lock.path.display(), error = %e, "failed to unlock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_lock_file_created() {
        let dir = tempdir().unwrap();
        let lock = ExclusiveLock::open(dir.path(), "test.lock").unwrap();
        assert!(lock.path().exists());

        let guard = lock.acquire().unwrap();
        guard.release();

        // released, so a second acquire does not block
        let _guard = lock.acquire().unwrap();
    }

    #[test]
    fn test_lock_excludes_other_threads() {
        let dir = tempdir().unwrap();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = dir.path().to_path_buf();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    // each thread opens its own handle on the same name
                    let lock = ExclusiveLock::open(&path, "shared.lock").unwrap();
                    for _ in 0..10 {
                        let _guard = lock.acquire().unwrap();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(200));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_on_error_path() {
        fn fails_while_locked(lock: &ExclusiveLock) -> Result<()> {
            let _guard = lock.acquire()?;
            Err(std::io::Error::other("medium failure").into())
        }

        let dir = tempdir().unwrap();
        let lock = ExclusiveLock::open(dir.path(), "err.lock").unwrap();
        assert!(fails_while_locked(&lock).is_err());
        let _guard = lock.acquire().unwrap();
    }
}
