//! Controller for a single record view.
//!
//! The page subscribes to its kind's topic before the first load, so updates
//! arriving while the record is fetched are queued and applied afterwards.
//! Every change is applied by reading the record back from the server; the
//! page never patches its copy locally.

use {
    async_trait::async_trait,
    ims_client::{ClientError, ImsClient, records::Attachment, urls::app_record_path},
    ims_protocol::{FanoutMessage, FieldReport, Incident, Record, access::EventAccess},
    serde_json::{Value, json},
    tokio::sync::broadcast::{
        self,
        error::{RecvError, TryRecvError},
    },
    tracing::{debug, info, warn},
};

use crate::{
    access::{self, Permission},
    address::AddressBar,
    error::PageError,
    forms::{self, EditSubmitter, FieldControl},
    notices::Notices,
};

pub struct EntityPage<E: Record> {
    client: ImsClient,
    notices: Notices,
    access: EventAccess,
    event_id: String,
    number: Option<u64>,
    record: E,
    address: AddressBar,
    updates: broadcast::Receiver<FanoutMessage>,
    loads: usize,
}

impl<E: Record> EntityPage<E> {
    pub(crate) fn new(
        client: ImsClient,
        notices: Notices,
        access: EventAccess,
        updates: broadcast::Receiver<FanoutMessage>,
        record: E,
    ) -> Self {
        let event_id = record.event_id().to_string();
        let number = record.number();
        Self {
            address: AddressBar::for_record(E::KIND, &event_id, number),
            client,
            notices,
            access,
            event_id,
            number,
            record,
            updates,
            loads: 0,
        }
    }

    pub fn record(&self) -> &E {
        &self.record
    }

    pub fn number(&self) -> Option<u64> {
        self.number
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn address(&self) -> &str {
        self.address.path()
    }

    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// How many times the record was read from the server.
    pub fn loads(&self) -> usize {
        self.loads
    }

    /// The record as a JSON document, for binding form controls.
    pub fn document(&self) -> Result<Value, PageError> {
        serde_json::to_value(&self.record).map_err(|source| PageError::Encode {
            kind: E::KIND,
            source,
        })
    }

    fn number_or_unsaved(&self) -> Result<u64, PageError> {
        self.number.ok_or(PageError::Unsaved(E::KIND))
    }

    fn client_err(&self, err: ClientError, permission: Permission) -> PageError {
        PageError::from_client(err, permission, &self.event_id)
    }

    /// Read the record back from the server.
    pub async fn load(&mut self) -> Result<(), PageError> {
        let number = self.number_or_unsaved()?;
        let permission = access::view_permission(E::KIND, &self.access);
        match self.client.get_record::<E>(&self.event_id, number).await {
            Ok(record) => {
                self.record = record;
                self.loads += 1;
                debug!(kind = %E::KIND, number, "record loaded");
                Ok(())
            },
            Err(e) => {
                let err = self.client_err(e, permission);
                self.notices
                    .set_error(format!("Unable to load {} {number}: {err}", E::KIND));
                Err(err)
            },
        }
    }

    /// Apply one fan-out message. Returns whether the record was reloaded.
    pub async fn handle(&mut self, message: &FanoutMessage) -> Result<bool, PageError> {
        let Some(number) = self.number else {
            return Ok(false);
        };
        let relevant = match message {
            FanoutMessage::UpdateAll => true,
            FanoutMessage::Entity(update) => {
                update.kind == E::KIND && update.concerns(&self.event_id, number)
            },
        };
        if !relevant {
            return Ok(false);
        }
        self.load().await?;
        Ok(true)
    }

    /// Wait for the next fan-out message and apply it.
    ///
    /// A lagged subscription counts as [`FanoutMessage::UpdateAll`]. Returns
    /// `None` once the bus is gone.
    pub async fn next_update(&mut self) -> Option<Result<bool, PageError>> {
        let message = match self.updates.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, kind = %E::KIND, "page fell behind, reloading");
                FanoutMessage::UpdateAll
            },
            Err(RecvError::Closed) => return None,
        };
        Some(self.handle(&message).await)
    }

    /// Apply every message already queued. Returns how many reloads happened.
    pub async fn process_pending(&mut self) -> Result<usize, PageError> {
        let mut reloads = 0;
        loop {
            let message = match self.updates.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Lagged(_)) => FanoutMessage::UpdateAll,
                Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(reloads),
            };
            if self.handle(&message).await? {
                reloads += 1;
            }
        }
    }

    /// Edit one control; see [`forms::edit_field`].
    pub async fn edit(
        &mut self,
        control: &mut FieldControl,
        value: Value,
    ) -> Result<bool, PageError> {
        let notices = self.notices.clone();
        forms::edit_field(self, &notices, control, value).await
    }

    /// Submit a partial document, reporting failure in the error banner.
    pub async fn submit(&mut self, edits: Value) -> Result<(), PageError> {
        match self.send_edits(edits).await {
            Ok(()) => {
                self.notices.clear_error();
                Ok(())
            },
            Err(e) => {
                self.notices
                    .set_error(format!("Unable to save {}: {e}", E::KIND));
                Err(e)
            },
        }
    }

    /// Append a report entry. Blank text is ignored.
    pub async fn add_report_entry(&mut self, text: &str) -> Result<bool, PageError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }
        self.submit(json!({ "report_entries": [{ "text": text }] }))
            .await?;
        Ok(true)
    }

    pub async fn set_entry_stricken(&mut self, entry_id: u64, stricken: bool) -> Result<(), PageError> {
        let notices = self.notices.clone();
        forms::set_stricken(self, &notices, entry_id, stricken).await
    }

    pub async fn attach_file(&mut self, attachment: Attachment) -> Result<(), PageError> {
        access::require(Permission::AttachFiles, &self.access, &self.event_id)?;
        let number = self.number_or_unsaved()?;
        info!(kind = %E::KIND, number, file = %attachment.file_name, "uploading attachment");
        if let Err(e) = self
            .client
            .upload_attachment(E::KIND, &self.event_id, number, attachment)
            .await
        {
            let err = self.client_err(e, Permission::AttachFiles);
            self.notices.set_error(format!("Unable to attach file: {err}"));
            return Err(err);
        }
        self.notices.clear_error();
        self.load().await
    }

    async fn create(&mut self, edits: Value) -> Result<(), PageError> {
        let mut document = self.document()?;
        forms::merge(&mut document, edits);
        if let Value::Object(fields) = &mut document {
            fields.remove("number");
        }
        let number = self
            .client
            .create_record(E::KIND, &self.event_id, &document)
            .await
            .map_err(|e| self.client_err(e, access::edit_permission(E::KIND)))?;
        self.number = Some(number);
        self.address
            .replace(app_record_path(E::KIND, &self.event_id, Some(number)));
        self.load().await
    }
}

#[async_trait]
impl<E: Record> EditSubmitter for EntityPage<E> {
    async fn send_edits(&mut self, edits: Value) -> Result<(), PageError> {
        access::check_edit(E::KIND, &self.access, &self.event_id)?;
        let Some(number) = self.number else {
            return self.create(edits).await;
        };
        self.client
            .edit_record(E::KIND, &self.event_id, number, &edits)
            .await
            .map_err(|e| self.client_err(e, access::edit_permission(E::KIND)))?;
        self.load().await
    }

    async fn strike(&mut self, entry_id: u64, stricken: bool) -> Result<(), PageError> {
        access::check_edit(E::KIND, &self.access, &self.event_id)?;
        let number = self.number_or_unsaved()?;
        self.client
            .set_report_entry_stricken(E::KIND, &self.event_id, number, entry_id, stricken)
            .await
            .map_err(|e| self.client_err(e, access::edit_permission(E::KIND)))
    }

    async fn on_strike_success(&mut self) -> Result<(), PageError> {
        self.load().await
    }
}

impl EntityPage<FieldReport> {
    /// Attach this report to an incident, or detach it with `None`.
    pub async fn attach_to_incident(&mut self, incident: Option<u64>) -> Result<(), PageError> {
        access::require(Permission::WriteIncidents, &self.access, &self.event_id)?;
        let number = self.number_or_unsaved()?;
        self.client
            .link_field_report(&self.event_id, number, incident)
            .await
            .map_err(|e| self.client_err(e, Permission::WriteIncidents))?;
        self.load().await
    }
}

impl EntityPage<Incident> {
    pub async fn link_field_report(&mut self, field_report: u64, attach: bool) -> Result<(), PageError> {
        access::require(Permission::WriteIncidents, &self.access, &self.event_id)?;
        let number = self.number_or_unsaved()?;
        self.client
            .link_field_report(&self.event_id, field_report, attach.then_some(number))
            .await
            .map_err(|e| self.client_err(e, Permission::WriteIncidents))?;
        self.load().await
    }
}
