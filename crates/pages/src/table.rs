//! Controller for a table of records of one event.

use std::collections::BTreeMap;

use {
    chrono::{Duration, Utc},
    ims_client::{ClientError, ImsClient},
    ims_common::prefs::{IncidentsFilter, Preferences, StateFilter},
    ims_protocol::{
        FanoutMessage, Incident, Record, access::EventAccess, model::IncidentState,
    },
    tokio::sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    tracing::{debug, warn},
};

use crate::{access, error::PageError, notices::Notices};

/// What applying a message did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableChange {
    Unchanged,
    Row(u64),
    All,
}

pub struct EntityTable<E: Record> {
    client: ImsClient,
    notices: Notices,
    access: EventAccess,
    prefs: Preferences,
    event_id: String,
    rows: BTreeMap<u64, E>,
    updates: broadcast::Receiver<FanoutMessage>,
}

impl<E: Record> EntityTable<E> {
    pub(crate) fn new(
        client: ImsClient,
        notices: Notices,
        access: EventAccess,
        prefs: Preferences,
        event_id: String,
        updates: broadcast::Receiver<FanoutMessage>,
    ) -> Self {
        Self {
            client,
            notices,
            access,
            prefs,
            event_id,
            rows: BTreeMap::new(),
            updates,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, number: u64) -> Option<&E> {
        self.rows.get(&number)
    }

    /// Rows, newest first.
    pub fn rows(&self) -> impl Iterator<Item = &E> {
        self.rows.values().rev()
    }

    pub fn page_size(&self) -> usize {
        self.prefs.page_size()
    }

    pub fn set_page_size(&self, size: usize) -> Result<usize, PageError> {
        self.prefs
            .set_page_size(size)
            .map_err(|e| PageError::Client(ClientError::Storage(e)))
    }

    /// One page of rows, newest first, sized by the stored preference.
    pub fn page(&self, index: usize) -> Vec<&E> {
        let size = self.page_size();
        self.rows().skip(index * size).take(size).collect()
    }

    fn client_err(&self, err: ClientError) -> PageError {
        PageError::from_client(
            err,
            access::view_permission(E::KIND, &self.access),
            &self.event_id,
        )
    }

    fn report(&self, err: PageError) -> PageError {
        self.notices
            .set_error(format!("Unable to load {} list: {err}", E::KIND));
        err
    }

    pub async fn load_all(&mut self) -> Result<(), PageError> {
        let records = match self.client.list_records::<E>(&self.event_id).await {
            Ok(records) => records,
            Err(e) => {
                let err = self.client_err(e);
                return Err(self.report(err));
            },
        };
        self.rows = records
            .into_iter()
            .filter_map(|record| record.number().map(|n| (n, record)))
            .collect();
        debug!(kind = %E::KIND, rows = self.rows.len(), "table loaded");
        self.notices.clear_error();
        Ok(())
    }

    /// Fetch one row. A row the server no longer has is dropped.
    pub async fn reload_row(&mut self, number: u64) -> Result<(), PageError> {
        match self.client.get_record::<E>(&self.event_id, number).await {
            Ok(record) => {
                self.rows.insert(number, record);
                Ok(())
            },
            Err(ClientError::Status { status: 404, .. }) => {
                self.rows.remove(&number);
                Ok(())
            },
            Err(e) => {
                let err = self.client_err(e);
                Err(self.report(err))
            },
        }
    }

    pub async fn handle(&mut self, message: &FanoutMessage) -> Result<TableChange, PageError> {
        match message {
            FanoutMessage::UpdateAll => {
                self.load_all().await?;
                Ok(TableChange::All)
            },
            FanoutMessage::Entity(update)
                if update.kind == E::KIND && update.event_id == self.event_id =>
            {
                self.reload_row(update.entity_number).await?;
                Ok(TableChange::Row(update.entity_number))
            },
            FanoutMessage::Entity(_) => Ok(TableChange::Unchanged),
        }
    }

    pub async fn next_update(&mut self) -> Option<Result<TableChange, PageError>> {
        let message = match self.updates.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, kind = %E::KIND, "table fell behind, reloading");
                FanoutMessage::UpdateAll
            },
            Err(RecvError::Closed) => return None,
        };
        Some(self.handle(&message).await)
    }

    pub async fn process_pending(&mut self) -> Result<Vec<TableChange>, PageError> {
        let mut changes = Vec::new();
        loop {
            let message = match self.updates.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Lagged(_)) => FanoutMessage::UpdateAll,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(changes),
            };
            changes.push(self.handle(&message).await?);
        }
    }
}

impl EntityTable<Incident> {
    pub fn filter(&self) -> IncidentsFilter {
        self.prefs.incidents_filter()
    }

    pub fn set_filter(&self, filter: &IncidentsFilter) -> Result<(), PageError> {
        self.prefs
            .set_incidents_filter(filter)
            .map_err(|e| PageError::Client(ClientError::Storage(e)))
    }

    /// Rows passing the stored incidents filter, newest first.
    pub fn filtered(&self) -> Vec<&Incident> {
        let filter = self.filter();
        self.rows()
            .filter(|incident| matches_filter(incident, &filter))
            .collect()
    }
}

pub fn matches_filter(incident: &Incident, filter: &IncidentsFilter) -> bool {
    let state_ok = match filter.state {
        StateFilter::All => true,
        StateFilter::Open => incident.state != IncidentState::Closed,
        StateFilter::Active => {
            !matches!(incident.state, IncidentState::Closed | IncidentState::OnHold)
        },
    };
    let recent = filter.days_back.is_none_or(|days| {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        incident
            .last_modified
            .or(incident.created)
            .is_some_and(|t| t >= cutoff)
    });
    let typed = filter.types.is_empty()
        || incident
            .incident_types
            .iter()
            .any(|t| filter.types.contains(t));
    state_ok && recent && typed
}
