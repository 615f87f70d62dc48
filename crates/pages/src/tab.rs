//! One open tab of the web app.
//!
//! A tab owns its banners and the viewer's permissions, shares the profile's
//! storage, locks and fan-out bus with every other tab, and hands out page
//! controllers.

use std::{sync::Arc, time::Duration};

use {
    ims_client::{ClientError, ImsClient},
    ims_common::prefs::Preferences,
    ims_config::LiveConfig,
    ims_live::{
        Arbiter, ArbiterHandle, EventSourceConnector, LeaderStatus, Profile, PushConnector,
        PushListener,
    },
    ims_protocol::{
        Record,
        access::{AuthInfo, EventAccess},
    },
    tracing::info,
};

use crate::{
    access,
    error::PageError,
    notices::Notices,
    page::EntityPage,
    table::EntityTable,
};

pub const LIVE_UPDATES_UNAVAILABLE: &str =
    "Live updates are not available here. Reload the page to see changes made by others.";

pub struct Tab {
    profile: Profile,
    client: ImsClient,
    notices: Notices,
    auth: AuthInfo,
    live: Option<ArbiterHandle>,
}

impl Tab {
    pub fn new(profile: Profile, client: ImsClient) -> Self {
        Self {
            profile,
            client,
            notices: Notices::new(),
            auth: AuthInfo::default(),
            live: None,
        }
    }

    pub fn with_auth(mut self, auth: AuthInfo) -> Self {
        self.auth = auth;
        self
    }

    /// Fetch the viewer's permissions, optionally scoped to one event.
    pub async fn refresh_auth(&mut self, event_id: Option<&str>) -> Result<&AuthInfo, ClientError> {
        self.auth = self.client.auth_info(event_id).await?;
        Ok(&self.auth)
    }

    pub fn access(&self, event_id: &str) -> EventAccess {
        self.auth.access_for(event_id)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn client(&self) -> &ImsClient {
        &self.client
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    pub fn preferences(&self) -> Preferences {
        Preferences::new(Arc::clone(&self.profile.store))
    }

    /// Join the leader election for the push connection.
    ///
    /// Returns `false` and posts a persistent warning when this tab cannot
    /// take part; no connection is made in that case.
    pub fn start_live_updates(&mut self, config: &LiveConfig) -> bool {
        let connector = Arc::new(EventSourceConnector::new(
            self.client.clone(),
            config.reconnect_delay(),
        ));
        self.start_live_updates_with(connector, config.cooldown())
    }

    pub fn start_live_updates_with(
        &mut self,
        connector: Arc<dyn PushConnector>,
        cooldown: Duration,
    ) -> bool {
        if self.live.is_some() {
            return true;
        }
        let listener = Arc::new(PushListener::new(
            self.profile.bus.clone(),
            Arc::clone(&self.profile.store),
        ));
        match Arbiter::spawn(Arc::clone(&self.profile.locks), connector, listener, cooldown) {
            Ok(handle) => {
                info!("joined push leader election");
                self.live = Some(handle);
                true
            },
            Err(e) => {
                self.notices.warn(format!("{LIVE_UPDATES_UNAVAILABLE} ({e})"));
                false
            },
        }
    }

    pub fn leader_status(&self) -> Option<LeaderStatus> {
        self.live.as_ref().map(ArbiterHandle::status)
    }

    /// Open a saved record.
    pub async fn open<E: Record>(
        &self,
        event_id: &str,
        number: u64,
    ) -> Result<EntityPage<E>, PageError> {
        let access = self.access(event_id);
        access::check_view(E::KIND, &access, event_id)?;
        let updates = self.profile.bus.subscribe(E::KIND);
        let placeholder = placeholder::<E>(event_id, number)?;
        let mut page = EntityPage::new(
            self.client.clone(),
            self.notices.clone(),
            access,
            updates,
            placeholder,
        );
        page.load().await?;
        Ok(page)
    }

    /// Start editing a record that does not exist yet. The first edit creates it.
    pub fn new_record<E: Record>(&self, draft: E) -> Result<EntityPage<E>, PageError> {
        let event_id = draft.event_id().to_string();
        let access = self.access(&event_id);
        access::check_edit(E::KIND, &access, &event_id)?;
        let updates = self.profile.bus.subscribe(E::KIND);
        Ok(EntityPage::new(
            self.client.clone(),
            self.notices.clone(),
            access,
            updates,
            draft,
        ))
    }

    pub async fn open_table<E: Record>(&self, event_id: &str) -> Result<EntityTable<E>, PageError> {
        let access = self.access(event_id);
        access::check_view(E::KIND, &access, event_id)?;
        let updates = self.profile.bus.subscribe(E::KIND);
        let mut table = EntityTable::new(
            self.client.clone(),
            self.notices.clone(),
            access,
            self.preferences(),
            event_id.to_string(),
            updates,
        );
        table.load_all().await?;
        Ok(table)
    }

    /// Close the tab, leaving the leader election.
    pub fn close(self) {
        if let Some(live) = &self.live {
            live.abort();
        }
    }
}

/// The minimal document naming a record, shown until the first load.
fn placeholder<E: Record>(event_id: &str, number: u64) -> Result<E, PageError> {
    serde_json::from_value(serde_json::json!({ "event": event_id, "number": number })).map_err(
        |source| PageError::Encode {
            kind: E::KIND,
            source,
        },
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ims_client::ClientOptions,
        ims_common::{KvStore, MemoryKvStore},
        ims_live::LocalLocks,
        ims_protocol::{FieldReport, Incident, Stay},
    };

    #[test]
    fn placeholders_decode_for_every_kind() {
        assert_eq!(placeholder::<Incident>("2025", 3).unwrap().number, Some(3));
        assert_eq!(placeholder::<FieldReport>("2025", 4).unwrap().event, "2025");
        assert_eq!(placeholder::<Stay>("2025", 5).unwrap().number, Some(5));
    }

    #[tokio::test]
    async fn open_without_read_access_is_refused() {
        let server = mockito::Server::new_async().await;
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let client = ImsClient::new(ClientOptions::new(server.url()), Arc::clone(&store)).unwrap();
        let tab = Tab::new(Profile::new(store, Arc::new(LocalLocks::new())), client);
        let err = tab.open::<Incident>("2025", 1).await.err().unwrap();
        assert_eq!(
            err.to_string(),
            "You are not authorized to view incidents in event 2025"
        );
    }
}
