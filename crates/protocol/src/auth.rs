//! Login and token refresh documents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub identification: String,
    pub password: String,
}

/// Issued by both `POST /ims/api/auth` and `POST /ims/api/auth/refresh`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    /// Absolute expiry, in milliseconds since the Unix epoch.
    pub expires_unix_ms: i64,
}
