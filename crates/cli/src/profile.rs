use std::{path::Path, sync::Arc};

use {
    ims_common::{FileKvStore, KvStore},
    ims_config::{ImsConfig, LockBackend},
    ims_live::{LocalLocks, Profile, RelayError, STORE_FILE},
    tracing::{debug, warn},
};

/// The profile shared by every `ims` process using the same data dir.
pub fn open(config: &ImsConfig) -> Result<Profile, RelayError> {
    open_in(&config.data_dir(), config.live.lock_backend)
}

pub fn open_in(data_dir: &Path, backend: LockBackend) -> Result<Profile, RelayError> {
    let profile = match backend {
        LockBackend::File => Profile::open_dir(data_dir)?,
        LockBackend::Local => {
            warn!("local lock backend: this process leads on its own push connection");
            let store: Arc<dyn KvStore> = Arc::new(FileKvStore::new(data_dir.join(STORE_FILE)));
            Profile::new(store, Arc::new(LocalLocks::new()))
        },
    };
    debug!(dir = %data_dir.display(), ?backend, "opened profile");
    Ok(profile)
}
