//! Storage shared by every tab of one profile.

pub mod keys;
pub mod prefs;
pub mod storage;

pub use storage::{FileKvStore, KvStore, MemoryKvStore, StorageError};
