//! HTTP client for the IMS JSON API.
//!
//! [`ImsClient`] owns the bearer token lifecycle and maps every non-success
//! response onto [`ClientError`]. It never retries a request by itself.

pub mod admin;
pub mod api;
pub mod auth;
pub mod error;
pub mod records;
pub mod urls;

pub use {
    api::{ClientOptions, ImsClient},
    error::{ClientError, Problem},
    urls::UrlTemplates,
};
