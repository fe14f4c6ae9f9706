//! Mutual exclusion for ID allocation
//!
//! This module provides the lockers the store can be built with:
//! - [`ProcessLocker`]: in-process mutex for a single store instance
//! - [`FileLocker`]: OS advisory lock (fs2/flock) on a lock file, so
//!   separate processes sharing one tasks directory also serialize
//!
//! Callers take locks through [`LockGuard`], which releases on every exit
//! path and logs (never returns) release failures.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{Error, Result};

/// Default lock timeout in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default retry interval when waiting for a lock
const LOCK_RETRY_INTERVAL_MS: u64 = 50;

/// A mutual-exclusion primitive with explicit acquire and release.
pub trait Locker: Send + Sync {
    fn acquire(&self) -> Result<()>;

    fn release(&self) -> Result<()>;
}

/// Scope guard over a [`Locker`].
#[must_use = "the lock is released when the guard is dropped"]
pub struct LockGuard<'a> {
    locker: &'a dyn Locker,
}

impl<'a> LockGuard<'a> {
    pub fn acquire(locker: &'a dyn Locker) -> Result<Self> {
        locker.acquire()?;
        Ok(Self { locker })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.locker.release() {
            tracing::warn!(error = %err, "failed to release lock");
        }
    }
}

fn is_lock_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }

    // On Windows, fs2/libc can surface lock/sharing violations as "Other".
    #[cfg(windows)]
    {
        matches!(err.raw_os_error(), Some(32) | Some(33))
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// In-process lock built on a mutex and a condition variable.
#[derive(Debug, Default)]
pub struct ProcessLocker {
    held: Mutex<bool>,
    freed: Condvar,
    timeout: Option<Duration>,
}

impl ProcessLocker {
    /// Waits indefinitely for the lock.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            timeout: Some(Duration::from_millis(timeout_ms)),
            ..Self::default()
        }
    }

    fn held(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_held(&self) -> bool {
        *self.held()
    }
}

impl Locker for ProcessLocker {
    fn acquire(&self) -> Result<()> {
        let held = self.held();
        let mut held = match self.timeout {
            None => self
                .freed
                .wait_while(held, |held| *held)
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
            Some(timeout) => {
                let (held, result) = self
                    .freed
                    .wait_timeout_while(held, timeout, |held| *held)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if result.timed_out() && *held {
                    return Err(Error::Lock(format!(
                        "in-process lock not acquired within {}ms",
                        timeout.as_millis()
                    )));
                }
                held
            }
        };
        *held = true;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let mut held = self.held();
        if !*held {
            return Err(Error::Lock("release of a lock that is not held".to_string()));
        }
        *held = false;
        drop(held);
        self.freed.notify_one();
        Ok(())
    }
}

/// Advisory file lock with a timeout.
///
/// The lock file is created on first use. A local [`ProcessLocker`] gates
/// threads sharing this locker so only one of them holds the OS lock.
#[derive(Debug)]
pub struct FileLocker {
    path: PathBuf,
    timeout_ms: u64,
    gate: ProcessLocker,
    file: Mutex<Option<File>>,
}

impl FileLocker {
    pub fn new(path: impl Into<PathBuf>, timeout_ms: u64) -> Self {
        Self {
            path: path.into(),
            timeout_ms,
            gate: ProcessLocker::with_timeout(timeout_ms),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn slot(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_file(&self) -> Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;

        let start = Instant::now();
        let timeout = Duration::from_millis(self.timeout_ms);
        let retry_interval = Duration::from_millis(LOCK_RETRY_INTERVAL_MS);

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(file),
                Err(e) if is_lock_contended(&e) => {
                    if start.elapsed() >= timeout {
                        return Err(Error::LockTimeout(self.path.clone()));
                    }
                    std::thread::sleep(retry_interval);
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Locker for FileLocker {
    fn acquire(&self) -> Result<()> {
        self.gate.acquire()?;
        match self.lock_file() {
            Ok(file) => {
                *self.slot() = Some(file);
                Ok(())
            }
            Err(err) => {
                self.gate.release()?;
                Err(err)
            }
        }
    }

    fn release(&self) -> Result<()> {
        let file = self.slot().take();
        let unlocked = match file {
            Some(file) => file.unlock().map_err(Error::Io),
            None => Err(Error::Lock(format!(
                "{} is not locked by this process",
                self.path.display()
            ))),
        };
        let gate = self.gate.release();
        unlocked.and(gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use tempfile::TempDir;

    fn stress(locker: Arc<dyn Locker>) {
        let threads = 12;
        let barrier = Arc::new(Barrier::new(threads));
        let in_lock = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let acquired = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(threads);
        for _ in 0..threads {
            let barrier = Arc::clone(&barrier);
            let in_lock = Arc::clone(&in_lock);
            let max_concurrent = Arc::clone(&max_concurrent);
            let acquired = Arc::clone(&acquired);
            let locker = Arc::clone(&locker);

            handles.push(thread::spawn(move || {
                barrier.wait();
                let _guard = LockGuard::acquire(locker.as_ref()).unwrap();

                let current = in_lock.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = max_concurrent.fetch_max(current, Ordering::SeqCst);

                thread::sleep(Duration::from_millis(10));

                in_lock.fetch_sub(1, Ordering::SeqCst);
                acquired.fetch_add(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(acquired.load(Ordering::SeqCst), threads);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn process_locker_single_holder() {
        stress(Arc::new(ProcessLocker::new()));
    }

    #[test]
    fn file_locker_single_holder() {
        let temp_dir = TempDir::new().unwrap();
        let locker = FileLocker::new(temp_dir.path().join("stress.lock"), 5000);
        stress(Arc::new(locker));
    }

    #[test]
    fn guard_releases_on_drop() {
        let locker = ProcessLocker::new();
        {
            let _guard = LockGuard::acquire(&locker).unwrap();
            assert!(locker.is_held());
        }
        assert!(!locker.is_held());
    }

    #[test]
    fn release_without_acquire_fails() {
        let locker = ProcessLocker::new();
        assert!(matches!(locker.release(), Err(Error::Lock(_))));

        let temp_dir = TempDir::new().unwrap();
        let file_locker = FileLocker::new(temp_dir.path().join("x.lock"), 100);
        assert!(file_locker.release().is_err());
    }

    #[test]
    fn process_locker_times_out() {
        let locker = ProcessLocker::with_timeout(50);
        locker.acquire().unwrap();
        assert!(matches!(locker.acquire(), Err(Error::Lock(_))));
        locker.release().unwrap();
        locker.acquire().unwrap();
    }

    #[test]
    fn file_locker_timeout_returns_lock_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("timeout.lock");

        let holder = FileLocker::new(&path, 1000);
        holder.acquire().unwrap();
        assert!(path.exists());

        let other = FileLocker::new(&path, 50);
        assert!(matches!(other.acquire(), Err(Error::LockTimeout(_))));
        assert!(!other.gate.is_held());

        holder.release().unwrap();
        other.acquire().unwrap();
        other.release().unwrap();
    }
}
