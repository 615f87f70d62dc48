//! Push notifications and the messages fanned out to page controllers.
//!
//! The server push stream emits named frames:
//!
//! - `InitialEvent` right after a connection opens, carrying a baseline id
//! - `Incident`, `FieldReport` and `Stay` whenever one record changes
//!
//! Entity frames carry a small JSON payload naming the event and the record
//! number. [`PushEvent::decode`] turns a frame into a typed value.

use serde::{Deserialize, Serialize};

/// The three record types that have their own fan-out topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Incident,
    FieldReport,
    Stay,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Incident, Self::FieldReport, Self::Stay];

    /// Name of the push frame announcing a change to this kind.
    pub fn push_event_name(self) -> &'static str {
        match self {
            Self::Incident => "Incident",
            Self::FieldReport => "FieldReport",
            Self::Stay => "Stay",
        }
    }

    /// URL path segment of the collection, e.g. `field_reports`.
    pub fn collection(self) -> &'static str {
        match self {
            Self::Incident => "incidents",
            Self::FieldReport => "field_reports",
            Self::Stay => "stays",
        }
    }

    /// Response header carrying the number of a freshly created record.
    pub fn number_header(self) -> &'static str {
        match self {
            Self::Incident => crate::headers::INCIDENT_NUMBER,
            Self::FieldReport => crate::headers::FIELD_REPORT_NUMBER,
            Self::Stay => crate::headers::STAY_NUMBER,
        }
    }

    pub fn from_push_event_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.push_event_name() == name)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incident => write!(f, "incident"),
            Self::FieldReport => write!(f, "field report"),
            Self::Stay => write!(f, "stay"),
        }
    }
}

/// A change to one record, as announced by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub kind: EntityKind,
    pub event_id: String,
    pub entity_number: u64,
    /// Transport-issued frame id, if the frame had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<String>,
}

impl UpdateEvent {
    /// Whether this update concerns the given record.
    pub fn concerns(&self, event_id: &str, number: u64) -> bool {
        self.event_id == event_id && self.entity_number == number
    }
}

/// A decoded push frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Baseline marker sent when a connection opens.
    InitialSync { sequence_id: Option<String> },
    Entity(UpdateEvent),
}

/// What travels on a fan-out topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutMessage {
    Entity(UpdateEvent),
    /// Refetch everything; events may have been missed.
    UpdateAll,
}

#[derive(Debug, thiserror::Error)]
pub enum PushPayloadError {
    #[error("malformed {kind} payload: {source}")]
    Json {
        kind: EntityKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Event ids are names on the wire but older servers send integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum EventIdValue {
    Name(String),
    Number(i64),
}

impl From<EventIdValue> for String {
    fn from(value: EventIdValue) -> Self {
        match value {
            EventIdValue::Name(name) => name,
            EventIdValue::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct IncidentPayload {
    event_id: EventIdValue,
    incident_number: u64,
}

#[derive(Deserialize)]
struct FieldReportPayload {
    event_id: EventIdValue,
    field_report_number: u64,
}

#[derive(Deserialize)]
struct StayPayload {
    event_id: EventIdValue,
    stay_number: u64,
}

impl PushEvent {
    /// Name of the baseline frame.
    pub const INITIAL_EVENT: &'static str = "InitialEvent";

    /// Decode a frame. Returns `Ok(None)` for frame names this client does
    /// not know about.
    pub fn decode(
        name: &str,
        id: Option<&str>,
        data: &str,
    ) -> Result<Option<PushEvent>, PushPayloadError> {
        let sequence_id = id.map(str::to_string);
        if name == Self::INITIAL_EVENT {
            return Ok(Some(PushEvent::InitialSync { sequence_id }));
        }
        let Some(kind) = EntityKind::from_push_event_name(name) else {
            return Ok(None);
        };
        let err = |source| PushPayloadError::Json { kind, source };
        let (event_id, entity_number) = match kind {
            EntityKind::Incident => {
                let p: IncidentPayload = serde_json::from_str(data).map_err(err)?;
                (String::from(p.event_id), p.incident_number)
            },
            EntityKind::FieldReport => {
                let p: FieldReportPayload = serde_json::from_str(data).map_err(err)?;
                (String::from(p.event_id), p.field_report_number)
            },
            EntityKind::Stay => {
                let p: StayPayload = serde_json::from_str(data).map_err(err)?;
                (String::from(p.event_id), p.stay_number)
            },
        };
        Ok(Some(PushEvent::Entity(UpdateEvent {
            kind,
            event_id,
            entity_number,
            sequence_id,
        })))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn initial_event_carries_frame_id() {
        let ev = PushEvent::decode("InitialEvent", Some("17"), "{}").unwrap();
        assert_eq!(
            ev,
            Some(PushEvent::InitialSync {
                sequence_id: Some("17".into())
            })
        );
    }

    #[rstest]
    #[case("Incident", r#"{"event_id":"2025","incident_number":7}"#, EntityKind::Incident, 7)]
    #[case(
        "FieldReport",
        r#"{"event_id":"2025","field_report_number":42}"#,
        EntityKind::FieldReport,
        42
    )]
    #[case("Stay", r#"{"event_id":"2025","stay_number":3}"#, EntityKind::Stay, 3)]
    fn entity_frames_decode(
        #[case] name: &str,
        #[case] data: &str,
        #[case] kind: EntityKind,
        #[case] number: u64,
    ) {
        let ev = PushEvent::decode(name, Some("9"), data).unwrap().unwrap();
        let PushEvent::Entity(update) = ev else {
            panic!("expected entity event");
        };
        assert_eq!(update.kind, kind);
        assert_eq!(update.event_id, "2025");
        assert_eq!(update.entity_number, number);
        assert_eq!(update.sequence_id.as_deref(), Some("9"));
    }

    #[test]
    fn numeric_event_id_is_accepted() {
        let ev = PushEvent::decode("Incident", None, r#"{"event_id":12,"incident_number":1}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(ev, PushEvent::Entity(u) if u.event_id == "12"));
    }

    #[test]
    fn unknown_frame_is_ignored() {
        assert!(PushEvent::decode("Ping", None, "x").unwrap().is_none());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let err = PushEvent::decode("FieldReport", None, "{not json").unwrap_err();
        assert!(err.to_string().contains("field report"));

        let err = PushEvent::decode("Incident", None, r#"{"event_id":"x"}"#).unwrap_err();
        assert!(err.to_string().contains("incident_number"));
    }

    #[test]
    fn update_matches_record() {
        let u = UpdateEvent {
            kind: EntityKind::Incident,
            event_id: "2025".into(),
            entity_number: 4,
            sequence_id: None,
        };
        assert!(u.concerns("2025", 4));
        assert!(!u.concerns("2025", 5));
        assert!(!u.concerns("2024", 4));
    }
}
