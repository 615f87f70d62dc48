//! Administrative endpoints: incident types, access lists, destinations and
//! the action log.

use {
    ims_protocol::{
        access::AccessMap,
        model::{ActionLog, Destination, IncidentType},
    },
    serde_json::json,
};

use crate::{api::ImsClient, error::ClientError, urls};

impl ImsClient {
    pub async fn incident_types(&self, include_hidden: bool) -> Result<Vec<IncidentType>, ClientError> {
        let mut url = self.urls().absolute(urls::INCIDENT_TYPES);
        if include_hidden {
            url.push_str("?hidden=true");
        }
        self.get_json(&url).await
    }

    pub async fn create_incident_type(&self, name: &str) -> Result<(), ClientError> {
        let url = self.urls().absolute(urls::INCIDENT_TYPES);
        self.post_json(&url, &json!({ "name": name, "hidden": false }))
            .await?;
        Ok(())
    }

    /// Hide or show incident types by name.
    pub async fn set_incident_types_hidden(
        &self,
        names: &[String],
        hidden: bool,
    ) -> Result<(), ClientError> {
        let url = self.urls().absolute(urls::INCIDENT_TYPES);
        let body = if hidden {
            json!({ "hide": names })
        } else {
            json!({ "show": names })
        };
        self.post_json(&url, &body).await?;
        Ok(())
    }

    pub async fn access(&self) -> Result<AccessMap, ClientError> {
        let url = self.urls().absolute(urls::ACCESS);
        self.get_json(&url).await
    }

    /// Replace the access lists of the events present in `access`.
    pub async fn set_access(&self, access: &AccessMap) -> Result<(), ClientError> {
        let url = self.urls().absolute(urls::ACCESS);
        self.post_json(&url, access).await?;
        Ok(())
    }

    pub async fn destinations(&self, event_id: &str) -> Result<Vec<Destination>, ClientError> {
        let url = self
            .urls()
            .resolve(urls::DESTINATIONS, &[("event_id", event_id)]);
        self.get_json(&url).await
    }

    pub async fn action_logs(&self) -> Result<Vec<ActionLog>, ClientError> {
        let url = self.urls().absolute(urls::ACTION_LOGS);
        self.get_json(&url).await
    }
}
