//! Named cooperative locks.
//!
//! A [`LockLease`] holds the lock until it is dropped. Two providers exist:
//! [`LocalLocks`] for tabs inside one process and [`FileLocks`] for tabs
//! spread over several processes of the same profile.

use std::{
    collections::HashMap,
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::sync::oneshot,
    tracing::{debug, trace},
};

pub const FILE_LOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock primitive cannot be used at all in this environment.
    #[error("lock primitive unavailable: {0}")]
    Unavailable(String),
    #[error("failed to acquire lock '{name}': {source}")]
    Acquire {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Fails when locks can never be acquired here.
    fn check_available(&self) -> Result<(), LockError>;

    /// Wait until the named lock is free and take it.
    async fn acquire(&self, name: &str) -> Result<LockLease, LockError>;
}

/// Proof of lock ownership; dropping it releases the lock.
pub struct LockLease {
    name: String,
    _held: Box<dyn Send>,
}

impl LockLease {
    fn new(name: &str, held: Box<dyn Send>) -> Self {
        Self {
            name: name.to_string(),
            _held: held,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for LockLease {
    fn drop(&mut self) {
        trace!(name = %self.name, "lock released");
    }
}

impl std::fmt::Debug for LockLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockLease").field("name", &self.name).finish()
    }
}

/// In-process locks, one async mutex per name.
#[derive(Default)]
pub struct LocalLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn named(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

#[async_trait]
impl LockProvider for LocalLocks {
    fn check_available(&self) -> Result<(), LockError> {
        Ok(())
    }

    async fn acquire(&self, name: &str) -> Result<LockLease, LockError> {
        let guard = self.named(name).lock_owned().await;
        debug!(name, "local lock acquired");
        Ok(LockLease::new(name, Box::new(guard)))
    }
}

/// Exclusive `fd-lock` locks on `<dir>/<name>.lock`.
///
/// Each lease is held by a dedicated thread, because the guard borrows the
/// file. While the lock is taken elsewhere the thread retries every
/// [`FILE_LOCK_POLL`] and exits as soon as nobody waits for it any more.
pub struct FileLocks {
    dir: PathBuf,
}

impl FileLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.lock"))
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

#[async_trait]
impl LockProvider for FileLocks {
    fn check_available(&self) -> Result<(), LockError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            LockError::Unavailable(format!("cannot create {}: {e}", self.dir.display()))
        })?;
        let probe = self.path("probe");
        open_lock_file(&probe)
            .map(drop)
            .map_err(|e| LockError::Unavailable(format!("cannot open {}: {e}", probe.display())))
    }

    async fn acquire(&self, name: &str) -> Result<LockLease, LockError> {
        let path = self.path(name);
        let acquire_err = |source| LockError::Acquire {
            name: name.to_string(),
            source,
        };
        let (acquired_tx, acquired_rx) = oneshot::channel::<std::io::Result<()>>();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        std::thread::Builder::new()
            .name(format!("lock-{name}"))
            .spawn(move || {
                let file = match open_lock_file(&path) {
                    Ok(file) => file,
                    Err(e) => {
                        let _ = acquired_tx.send(Err(e));
                        return;
                    },
                };
                let mut lock = fd_lock::RwLock::new(file);
                loop {
                    match lock.try_write() {
                        Ok(guard) => {
                            if acquired_tx.send(Ok(())).is_err() {
                                // The waiter gave up; release right away.
                                return;
                            }
                            // Returns once the lease drops its sender.
                            let _ = release_rx.recv();
                            drop(guard);
                            return;
                        },
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {},
                        Err(e) => {
                            let _ = acquired_tx.send(Err(e));
                            return;
                        },
                    }
                    if acquired_tx.is_closed() {
                        trace!("lock waiter gone, giving up");
                        return;
                    }
                    std::thread::sleep(FILE_LOCK_POLL);
                }
            })
            .map_err(acquire_err)?;

        match acquired_rx.await {
            Ok(Ok(())) => {
                debug!(name, dir = %self.dir.display(), "file lock acquired");
                Ok(LockLease::new(name, Box::new(release_tx)))
            },
            Ok(Err(e)) => Err(acquire_err(e)),
            Err(_) => Err(acquire_err(std::io::Error::other("lock thread exited"))),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, tempfile::TempDir};

    #[tokio::test]
    async fn local_lock_is_exclusive_per_name() {
        let locks = Arc::new(LocalLocks::new());
        let first = locks.acquire("a").await.unwrap();

        // A different name is independent.
        let other = locks.acquire("b").await.unwrap();
        assert_eq!(other.name(), "b");

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire("a").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.name(), "a");
    }

    #[tokio::test]
    async fn file_lock_is_exclusive_across_handles() {
        let dir = TempDir::new().unwrap();
        let a = FileLocks::new(dir.path());
        let b = Arc::new(FileLocks::new(dir.path()));
        a.check_available().unwrap();

        let held = a.acquire("ims-eventsource").await.unwrap();
        let waiter = {
            let b = Arc::clone(&b);
            tokio::spawn(async move { b.acquire("ims-eventsource").await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let lease = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.name(), "ims-eventsource");
    }

    /// Threads of this process whose name starts with `prefix`.
    #[cfg(target_os = "linux")]
    fn threads_named(prefix: &str) -> usize {
        std::fs::read_dir("/proc/self/task")
            .unwrap()
            .filter_map(|task| std::fs::read_to_string(task.ok()?.path().join("comm")).ok())
            .filter(|comm| comm.starts_with(prefix))
            .count()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn abandoned_file_lock_waiter_exits() {
        let dir = TempDir::new().unwrap();
        let a = FileLocks::new(dir.path());
        let b = FileLocks::new(dir.path());
        let held = a.acquire("gone").await.unwrap();
        assert_eq!(threads_named("lock-gone"), 1);

        assert!(
            tokio::time::timeout(Duration::from_millis(100), b.acquire("gone"))
                .await
                .is_err()
        );
        tokio::time::sleep(FILE_LOCK_POLL * 4).await;
        assert_eq!(threads_named("lock-gone"), 1);

        drop(held);
        let again = tokio::time::timeout(Duration::from_secs(5), b.acquire("gone"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.name(), "gone");
    }

    #[test]
    fn file_locks_under_a_regular_file_are_unavailable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();
        let locks = FileLocks::new(file.join("locks"));
        assert!(matches!(
            locks.check_available(),
            Err(LockError::Unavailable(_))
        ));
    }
}
