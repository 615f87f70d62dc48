//! URL templates with `<placeholder>` segments.

use ims_protocol::EntityKind;

pub const EVENTS: &str = "/ims/api/events/";
pub const RECORDS: &str = "/ims/api/events/<event_id>/<collection>/";
pub const RECORD: &str = "/ims/api/events/<event_id>/<collection>/<number>";
pub const REPORT_ENTRY: &str =
    "/ims/api/events/<event_id>/<collection>/<number>/report_entries/<report_entry_id>";
pub const ATTACHMENTS: &str = "/ims/api/events/<event_id>/<collection>/<number>/attachments";
pub const DESTINATIONS: &str = "/ims/api/events/<event_id>/destinations";
pub const EVENT_SOURCE: &str = "/ims/api/eventsource";
pub const AUTH: &str = "/ims/api/auth";
pub const AUTH_REFRESH: &str = "/ims/api/auth/refresh";
pub const INCIDENT_TYPES: &str = "/ims/api/incident_types/";
pub const ACCESS: &str = "/ims/api/access";
pub const ACTION_LOGS: &str = "/ims/api/actionlogs";

/// Browser-facing page of one record, used for address bar rewrites.
pub const APP_RECORD: &str = "/ims/app/events/<event_id>/<collection>/<number>";
pub const APP_NEW_RECORD: &str = "/ims/app/events/<event_id>/<collection>/new";

/// Substitute `<name>` placeholders. Values are percent-encoded.
pub fn fill(template: &str, params: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (name, value) in params {
        out = out.replace(&format!("<{name}>"), &urlencoding::encode(value));
    }
    out
}

fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Resolves templates against the server's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplates {
    base: String,
}

impl UrlTemplates {
    pub fn new(base_url: &str) -> Self {
        Self {
            base: normalize_base_url(base_url),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn absolute(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub fn resolve(&self, template: &str, params: &[(&str, &str)]) -> String {
        self.absolute(&fill(template, params))
    }

    pub fn records(&self, kind: EntityKind, event_id: &str) -> String {
        self.resolve(RECORDS, &[
            ("event_id", event_id),
            ("collection", kind.collection()),
        ])
    }

    pub fn record(&self, kind: EntityKind, event_id: &str, number: u64) -> String {
        self.resolve(RECORD, &[
            ("event_id", event_id),
            ("collection", kind.collection()),
            ("number", &number.to_string()),
        ])
    }

    pub fn report_entry(
        &self,
        kind: EntityKind,
        event_id: &str,
        number: u64,
        entry_id: u64,
    ) -> String {
        self.resolve(REPORT_ENTRY, &[
            ("event_id", event_id),
            ("collection", kind.collection()),
            ("number", &number.to_string()),
            ("report_entry_id", &entry_id.to_string()),
        ])
    }

    pub fn attachments(&self, kind: EntityKind, event_id: &str, number: u64) -> String {
        self.resolve(ATTACHMENTS, &[
            ("event_id", event_id),
            ("collection", kind.collection()),
            ("number", &number.to_string()),
        ])
    }
}

/// Path (no host) of the page showing a record, or the "new" page.
pub fn app_record_path(kind: EntityKind, event_id: &str, number: Option<u64>) -> String {
    match number {
        Some(number) => fill(APP_RECORD, &[
            ("event_id", event_id),
            ("collection", kind.collection()),
            ("number", &number.to_string()),
        ]),
        None => fill(APP_NEW_RECORD, &[
            ("event_id", event_id),
            ("collection", kind.collection()),
        ]),
    }
}
