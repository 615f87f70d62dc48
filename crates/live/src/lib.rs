//! Live update distribution.
//!
//! Every tab of a [`Profile`] runs an [`arbiter`] loop. The loops compete for
//! one named lock; the winner opens the server push stream and its
//! [`listener`] republishes decoded frames on the profile's [`bus`], which
//! every tab (the winner included) subscribes to. When the tabs are separate
//! processes the bus is carried between them by the [`relay`] log.

pub mod arbiter;
pub mod bus;
pub mod eventsource;
pub mod listener;
pub mod lock;
pub mod relay;
pub mod sse;

use std::{path::Path, sync::Arc};

use ims_common::{FileKvStore, KvStore};

pub use {
    arbiter::{Arbiter, ArbiterError, ArbiterHandle, LeaderStatus},
    bus::FanoutBus,
    eventsource::{EventSourceConnector, PushConnector, SourceEvent},
    listener::{PushListener, SessionEnd},
    lock::{FileLocks, LocalLocks, LockError, LockLease, LockProvider},
    relay::{FanoutLog, RelayError},
};

/// Storage file of a profile dir.
pub const STORE_FILE: &str = "profile.json";
/// Lock files of a profile dir.
pub const LOCK_DIR: &str = "locks";

/// State shared by all tabs of one browsing profile.
#[derive(Clone)]
pub struct Profile {
    pub store: Arc<dyn KvStore>,
    pub locks: Arc<dyn LockProvider>,
    pub bus: FanoutBus,
}

impl Profile {
    pub fn new(store: Arc<dyn KvStore>, locks: Arc<dyn LockProvider>) -> Self {
        Self {
            store,
            locks,
            bus: FanoutBus::new(),
        }
    }

    pub fn with_bus(store: Arc<dyn KvStore>, locks: Arc<dyn LockProvider>, bus: FanoutBus) -> Self {
        Self { store, locks, bus }
    }

    /// The profile kept in `dir`, shared with every process that opens it.
    ///
    /// Storage, the push lock and the fan-out log all live in the dir, so
    /// one process leads and every process sees each update.
    pub fn open_dir(dir: &Path) -> Result<Self, RelayError> {
        Ok(Self {
            store: Arc::new(FileKvStore::new(dir.join(STORE_FILE))),
            locks: Arc::new(FileLocks::new(dir.join(LOCK_DIR))),
            bus: FanoutBus::relayed(dir.join(relay::LOG_FILE))?,
        })
    }
}
