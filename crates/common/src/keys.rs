//! Well-known storage keys.

pub const ACCESS_TOKEN: &str = "access_token";
/// Unix milliseconds after which the token should be refreshed.
pub const ACCESS_TOKEN_REFRESH_AFTER: &str = "access_token_refresh_after";
/// Id of the last push frame this profile has seen.
pub const LAST_PUSH_EVENT_ID: &str = "last_push_event_id";
pub const TABLE_PAGE_SIZE: &str = "table_page_size";
pub const INCIDENTS_TABLE_FILTER: &str = "incidents_table_filter";
pub const THEME: &str = "theme";
