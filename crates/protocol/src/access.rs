//! Access documents: the viewer's permissions and the admin access lists.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What the current viewer may do within one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccess {
    #[serde(default)]
    pub read_incidents: bool,
    #[serde(default)]
    pub write_incidents: bool,
    #[serde(default)]
    pub write_field_reports: bool,
    #[serde(default)]
    pub attach_files: bool,
}

/// Response of `GET /ims/api/auth`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default)]
    pub authenticated: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub event_access: HashMap<String, EventAccess>,
}

impl AuthInfo {
    /// Permissions for one event; none if the server said nothing about it.
    pub fn access_for(&self, event_id: &str) -> EventAccess {
        self.event_access.get(event_id).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    #[default]
    Always,
    Onsite,
}

/// One entry of an access list, e.g. `person:Hubcap` or `position:007`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub expression: String,
    #[serde(default)]
    pub validity: Validity,
}

/// Access lists for one event, as edited on the admin screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAccessList {
    #[serde(default)]
    pub readers: Vec<AccessRule>,
    #[serde(default)]
    pub writers: Vec<AccessRule>,
    #[serde(default)]
    pub reporters: Vec<AccessRule>,
}

/// Event name → access lists.
pub type AccessMap = HashMap<String, EventAccessList>;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn auth_info_uses_camel_case_permissions() {
        let info: AuthInfo = serde_json::from_value(json!({
            "authenticated": true,
            "user": "Hubcap",
            "event_access": {
                "2025": {"readIncidents": true, "writeFieldReports": true}
            }
        }))
        .unwrap();
        let access = info.access_for("2025");
        assert!(access.read_incidents);
        assert!(access.write_field_reports);
        assert!(!access.write_incidents);
        assert_eq!(info.access_for("1999"), EventAccess::default());
    }
}
