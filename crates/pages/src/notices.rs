//! Page banners.
//!
//! A tab shows at most one persistent warning (live updates are off) and one
//! error banner (the last operation failed). Observers watch the state.

use std::sync::Arc;

use {tokio::sync::watch, tracing::warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoticeState {
    /// Stays until the tab goes away.
    pub warning: Option<String>,
    /// Cleared by the next successful operation.
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct Notices {
    tx: Arc<watch::Sender<NoticeState>>,
}

impl Default for Notices {
    fn default() -> Self {
        Self::new()
    }
}

impl Notices {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(NoticeState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(%message, "persistent warning");
        self.tx.send_modify(|state| state.warning = Some(message));
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|state| state.error = Some(message));
    }

    pub fn clear_error(&self) {
        self.tx.send_if_modified(|state| state.error.take().is_some());
    }

    pub fn current(&self) -> NoticeState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<NoticeState> {
        self.tx.subscribe()
    }
}
