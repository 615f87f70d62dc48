use {ims_client::urls::app_record_path, ims_protocol::EntityKind, tracing::debug};

/// The location shown for a page. Replacing it does not add history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBar {
    path: String,
}

impl AddressBar {
    pub fn for_record(kind: EntityKind, event_id: &str, number: Option<u64>) -> Self {
        Self {
            path: app_record_path(kind, event_id, number),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn replace(&mut self, path: String) {
        debug!(from = %self.path, to = %path, "replacing address");
        self.path = path;
    }
}
