//! Entity documents as served by `/ims/api/events/<event_id>/...`.

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::events::EntityKind;

/// Common surface of the three tracked record types.
pub trait Record:
    Clone + std::fmt::Debug + Send + Sync + Serialize + serde::de::DeserializeOwned + 'static
{
    const KIND: EntityKind;

    fn number(&self) -> Option<u64>;
    fn event_id(&self) -> &str;
    fn report_entries(&self) -> &[ReportEntry];
}

/// A top-level event (one burn) under which all records are scoped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: u64,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub system_entry: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub stricken: bool,
    #[serde(default)]
    pub has_attachment: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    #[default]
    New,
    OnHold,
    Dispatched,
    OnScene,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub concentric: Option<String>,
    #[serde(default)]
    pub radial_hour: Option<u8>,
    #[serde(default)]
    pub radial_minute: Option<u8>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    #[serde(default)]
    pub number: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: IncidentState,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub incident_types: Vec<String>,
    #[serde(default)]
    pub ranger_handles: Vec<String>,
    #[serde(default)]
    pub field_reports: Vec<u64>,
    #[serde(default)]
    pub report_entries: Vec<ReportEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReport {
    #[serde(default)]
    pub number: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Incident this report is attached to.
    #[serde(default)]
    pub incident: Option<u64>,
    #[serde(default)]
    pub report_entries: Vec<ReportEntry>,
}

/// A guest stay at the sanctuary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    #[serde(default)]
    pub number: Option<u64>,
    pub event: String,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub incident: Option<u64>,
    #[serde(default)]
    pub guest_preferred_name: Option<String>,
    #[serde(default)]
    pub guest_legal_name: Option<String>,
    #[serde(default)]
    pub guest_description: Option<String>,
    #[serde(default)]
    pub guest_camp_name: Option<String>,
    #[serde(default)]
    pub guest_camp_address: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub arrival_method: Option<String>,
    #[serde(default)]
    pub arrival_state: Option<String>,
    #[serde(default)]
    pub arrival_reason: Option<String>,
    #[serde(default)]
    pub departure_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub departure_method: Option<String>,
    #[serde(default)]
    pub departure_state: Option<String>,
    #[serde(default)]
    pub resource_rest: Option<String>,
    #[serde(default)]
    pub resource_other: Option<String>,
    #[serde(default)]
    pub report_entries: Vec<ReportEntry>,
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr) => {
        impl Record for $ty {
            const KIND: EntityKind = $kind;

            fn number(&self) -> Option<u64> {
                self.number
            }

            fn event_id(&self) -> &str {
                &self.event
            }

            fn report_entries(&self) -> &[ReportEntry] {
                &self.report_entries
            }
        }
    };
}

impl_record!(Incident, EntityKind::Incident);
impl_record!(FieldReport, EntityKind::FieldReport);
impl_record!(Stay, EntityKind::Stay);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentType {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

/// A named place rangers can be sent to (camps, art, facilities).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub location_string: Option<String>,
    #[serde(default)]
    pub external_data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionLog {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub action_type: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}
