//! Response headers and endpoint names used by the IMS API.

/// Carries the number assigned to a newly created incident.
pub const INCIDENT_NUMBER: &str = "IMS-Incident-Number";
/// Carries the number assigned to a newly created field report.
pub const FIELD_REPORT_NUMBER: &str = "IMS-Field-Report-Number";
/// Carries the number assigned to a newly created stay.
pub const STAY_NUMBER: &str = "IMS-Stay-Number";

/// Sent by the event source on reconnect.
pub const LAST_EVENT_ID: &str = "Last-Event-ID";

pub const EVENT_STREAM_MIME: &str = "text/event-stream";
