//! Leader election for the push connection.
//!
//! Every tab spawns an arbiter. Arbiters of one profile compete for the
//! [`LOCK_NAME`] lock, and only the holder runs a push session. When the
//! session ends the lock is released and the arbiter waits out the cooldown
//! before it queues up again, so another tab gets a chance to lead.

use std::{sync::Arc, time::Duration};

use {
    tokio::{sync::watch, task::JoinHandle},
    tracing::{error, info, warn},
};

use crate::{
    eventsource::PushConnector,
    listener::PushListener,
    lock::{LockError, LockProvider},
};

pub const LOCK_NAME: &str = "ims-eventsource";

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("live updates unavailable: {0}")]
    Unavailable(#[source] LockError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderStatus {
    /// Queued on the lock.
    Waiting,
    /// Holding the lock and running a push session.
    Leading,
    Cooldown,
}

pub struct Arbiter {
    locks: Arc<dyn LockProvider>,
    connector: Arc<dyn PushConnector>,
    listener: Arc<PushListener>,
    cooldown: Duration,
    status: watch::Sender<LeaderStatus>,
}

/// Dropping the handle leaves the loop running.
pub struct ArbiterHandle {
    task: JoinHandle<()>,
    status: watch::Receiver<LeaderStatus>,
}

impl ArbiterHandle {
    pub fn status(&self) -> LeaderStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<LeaderStatus> {
        self.status.clone()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Arbiter {
    /// Start the retry loop on the current runtime.
    ///
    /// Fails without connecting when the lock primitive is unusable.
    pub fn spawn(
        locks: Arc<dyn LockProvider>,
        connector: Arc<dyn PushConnector>,
        listener: Arc<PushListener>,
        cooldown: Duration,
    ) -> Result<ArbiterHandle, ArbiterError> {
        locks.check_available().map_err(ArbiterError::Unavailable)?;

        let (status, status_rx) = watch::channel(LeaderStatus::Waiting);
        let arbiter = Self {
            locks,
            connector,
            listener,
            cooldown,
            status,
        };
        let task = tokio::spawn(arbiter.run());
        Ok(ArbiterHandle {
            task,
            status: status_rx,
        })
    }

    async fn run(self) {
        loop {
            self.status.send_replace(LeaderStatus::Waiting);
            match self.locks.acquire(LOCK_NAME).await {
                Ok(lease) => {
                    self.status.send_replace(LeaderStatus::Leading);
                    info!(lock = lease.name(), "became push leader");
                    let end = self.listener.run(self.connector.connect()).await;
                    drop(lease);
                    info!(
                        reason = %end.reason,
                        frames = end.frames,
                        cooldown_secs = self.cooldown.as_secs(),
                        "push session over, releasing leadership"
                    );
                },
                Err(LockError::Unavailable(reason)) => {
                    error!(%reason, "lock primitive went away, live updates stopped");
                    return;
                },
                Err(e) => warn!(error = %e, "could not take push lock"),
            }
            self.status.send_replace(LeaderStatus::Cooldown);
            tokio::time::sleep(self.cooldown).await;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            bus::FanoutBus,
            eventsource::SourceEvent,
            lock::{LocalLocks, LockLease},
        },
        async_trait::async_trait,
        futures::{StreamExt, stream::BoxStream},
        ims_common::{KvStore, MemoryKvStore},
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        tokio::time::Instant,
    };

    /// Sessions that stay open for `length`, then close.
    #[derive(Default)]
    struct FakeConnector {
        length: Duration,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        opened: Arc<Mutex<Vec<Instant>>>,
    }

    impl PushConnector for FakeConnector {
        fn connect(&self) -> BoxStream<'static, SourceEvent> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.opened.lock().unwrap().push(Instant::now());
            let active = Arc::clone(&self.active);
            let length = self.length;
            async_stream::stream! {
                yield SourceEvent::Open;
                tokio::time::sleep(length).await;
                active.fetch_sub(1, Ordering::SeqCst);
                yield SourceEvent::Closed("server went away".into());
            }
            .boxed()
        }
    }

    struct BrokenLocks;

    #[async_trait]
    impl LockProvider for BrokenLocks {
        fn check_available(&self) -> Result<(), LockError> {
            Err(LockError::Unavailable("no lock manager".into()))
        }

        async fn acquire(&self, _name: &str) -> Result<LockLease, LockError> {
            unreachable!("never called when unavailable")
        }
    }

    fn listener() -> Arc<PushListener> {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        Arc::new(PushListener::new(FanoutBus::new(), store))
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_tab_leads() {
        let locks: Arc<dyn LockProvider> = Arc::new(LocalLocks::new());
        let connector = Arc::new(FakeConnector {
            length: Duration::from_secs(5),
            ..Default::default()
        });
        let handles: Vec<_> = (0..3)
            .map(|_| {
                Arbiter::spawn(
                    Arc::clone(&locks),
                    Arc::clone(&connector) as Arc<dyn PushConnector>,
                    listener(),
                    DEFAULT_COOLDOWN,
                )
                .unwrap()
            })
            .collect();

        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(connector.peak.load(Ordering::SeqCst), 1);
        assert!(connector.opened.lock().unwrap().len() >= 3);
        let leading = handles
            .iter()
            .filter(|h| h.status() == LeaderStatus::Leading)
            .count();
        assert!(leading <= 1);
        for h in &handles {
            h.abort();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_separates_sessions_of_one_tab() {
        let locks: Arc<dyn LockProvider> = Arc::new(LocalLocks::new());
        let connector = Arc::new(FakeConnector::default());
        let handle = Arbiter::spawn(
            locks,
            Arc::clone(&connector) as Arc<dyn PushConnector>,
            listener(),
            DEFAULT_COOLDOWN,
        )
        .unwrap();

        tokio::time::sleep(Duration::from_secs(35)).await;
        handle.abort();

        let opened = connector.opened.lock().unwrap().clone();
        assert_eq!(opened.len(), 4);
        for pair in opened.windows(2) {
            assert!(pair[1] - pair[0] >= DEFAULT_COOLDOWN);
        }
    }

    #[tokio::test]
    async fn unavailable_locks_never_connect() {
        let connector = Arc::new(FakeConnector::default());
        let result = Arbiter::spawn(
            Arc::new(BrokenLocks),
            Arc::clone(&connector) as Arc<dyn PushConnector>,
            listener(),
            DEFAULT_COOLDOWN,
        );
        assert!(matches!(result, Err(ArbiterError::Unavailable(_))));
        assert!(connector.opened.lock().unwrap().is_empty());
    }
}
