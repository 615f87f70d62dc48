//! Bearer token storage and proactive refresh.
//!
//! The token lives in the profile's [`KvStore`], so every tab of a profile
//! shares one login. Whichever tab notices that the refresh time has passed
//! refreshes it; concurrent refreshes from different tabs are harmless and
//! the last writer wins.

use std::{sync::Arc, time::Duration};

use {
    ims_common::{KvStore, keys},
    ims_protocol::auth::TokenResponse,
    secrecy::SecretString,
    tracing::debug,
};

use crate::error::ClientError;

pub struct TokenManager {
    store: Arc<dyn KvStore>,
    margin: Duration,
    refreshing: tokio::sync::Mutex<()>,
}

/// When a token issued at `now_ms` that expires at `expires_ms` should be
/// refreshed: `margin` before expiry, but never before half its lifetime.
pub fn refresh_due(now_ms: i64, expires_ms: i64, margin: Duration) -> i64 {
    let lifetime = (expires_ms - now_ms).max(0);
    let margin_ms = i64::try_from(margin.as_millis()).unwrap_or(i64::MAX);
    now_ms + (lifetime - margin_ms).max(lifetime / 2)
}

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl TokenManager {
    pub fn new(store: Arc<dyn KvStore>, margin: Duration) -> Self {
        Self {
            store,
            margin,
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn token(&self) -> Result<Option<SecretString>, ClientError> {
        Ok(self
            .store
            .get(keys::ACCESS_TOKEN)?
            .filter(|t| !t.is_empty())
            .map(SecretString::new))
    }

    /// Whether a stored token exists and its refresh time has passed.
    pub fn needs_refresh(&self) -> Result<bool, ClientError> {
        if self.token()?.is_none() {
            return Ok(false);
        }
        let due = self
            .store
            .get(keys::ACCESS_TOKEN_REFRESH_AFTER)?
            .and_then(|v| v.parse::<i64>().ok());
        Ok(match due {
            Some(due) => now_ms() >= due,
            // Unknown expiry: refresh once so we learn it.
            None => true,
        })
    }

    pub fn store_token(&self, response: &TokenResponse) -> Result<(), ClientError> {
        let due = refresh_due(now_ms(), response.expires_unix_ms, self.margin);
        self.store.set(keys::ACCESS_TOKEN, &response.token)?;
        self.store
            .set(keys::ACCESS_TOKEN_REFRESH_AFTER, &due.to_string())?;
        debug!(refresh_after_ms = due, "stored access token");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        self.store.remove(keys::ACCESS_TOKEN)?;
        self.store.remove(keys::ACCESS_TOKEN_REFRESH_AFTER)?;
        Ok(())
    }

    /// Serializes refreshes within this process.
    pub(crate) async fn refresh_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.refreshing.lock().await
    }
}
