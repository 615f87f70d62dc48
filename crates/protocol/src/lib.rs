//! Wire types shared by the IMS client crates.
//!
//! Everything here mirrors a document the IMS server sends or accepts:
//! push notifications, entity records, access documents and auth tokens.

pub mod access;
pub mod auth;
pub mod events;
pub mod headers;
pub mod model;

pub use {
    events::{EntityKind, FanoutMessage, PushEvent, PushPayloadError, UpdateEvent},
    model::{FieldReport, Incident, Record, ReportEntry, Stay},
};
