//! Page controllers for the IMS web app.
//!
//! A [`Tab`] hands out [`EntityPage`] and [`EntityTable`] controllers. Each
//! one subscribes to its kind's fan-out topic, loads from the server, and
//! reloads whenever a relevant update arrives. Edits go through
//! [`forms::edit_field`] and are confirmed by reading the record back.

pub mod access;
pub mod address;
pub mod error;
pub mod forms;
pub mod notices;
pub mod page;
pub mod tab;
pub mod table;

pub use {
    access::{AccessDenied, Permission},
    address::AddressBar,
    error::PageError,
    forms::{ControlState, EditSubmitter, FieldControl},
    notices::{NoticeState, Notices},
    page::EntityPage,
    tab::{LIVE_UPDATES_UNAVAILABLE, Tab},
    table::{EntityTable, TableChange},
};
