//! Incident, field report and stay endpoints.
//!
//! Edits are partial documents: only the fields present are changed. Both
//! edits and creations return nothing useful in the body; callers read the
//! record back afterwards.

use {
    ims_protocol::{EntityKind, Record, model::Event},
    reqwest::{Method, multipart},
    serde_json::{Value, json},
    tracing::{debug, info},
};

use crate::{
    api::{ImsClient, send},
    error::ClientError,
    urls,
};

/// A file to attach to a record.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImsClient {
    pub async fn events(&self) -> Result<Vec<Event>, ClientError> {
        let url = self.urls().absolute(urls::EVENTS);
        self.get_json(&url).await
    }

    pub async fn list_records<R: Record>(&self, event_id: &str) -> Result<Vec<R>, ClientError> {
        let url = self.urls().records(R::KIND, event_id);
        self.get_json(&url).await
    }

    pub async fn get_record<R: Record>(
        &self,
        event_id: &str,
        number: u64,
    ) -> Result<R, ClientError> {
        let url = self.urls().record(R::KIND, event_id, number);
        self.get_json(&url).await
    }

    /// Apply a partial-update document to an existing record.
    pub async fn edit_record(
        &self,
        kind: EntityKind,
        event_id: &str,
        number: u64,
        edits: &Value,
    ) -> Result<(), ClientError> {
        let url = self.urls().record(kind, event_id, number);
        self.post_json(&url, edits).await?;
        debug!(%kind, event_id, number, "edit accepted");
        Ok(())
    }

    /// Create a record and return the number the server assigned to it.
    pub async fn create_record(
        &self,
        kind: EntityKind,
        event_id: &str,
        document: &Value,
    ) -> Result<u64, ClientError> {
        let url = self.urls().records(kind, event_id);
        let resp = self.post_json(&url, document).await?;
        let header = kind.number_header();
        let number = resp
            .headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| ClientError::MissingHeader {
                url: url.clone(),
                header,
            })?;
        info!(%kind, event_id, number, "record created");
        Ok(number)
    }

    pub async fn set_report_entry_stricken(
        &self,
        kind: EntityKind,
        event_id: &str,
        number: u64,
        entry_id: u64,
        stricken: bool,
    ) -> Result<(), ClientError> {
        let url = self.urls().report_entry(kind, event_id, number, entry_id);
        self.post_json(&url, &json!({ "stricken": stricken })).await?;
        Ok(())
    }

    /// Attach a field report to an incident, or detach it when `incident` is
    /// `None`.
    pub async fn link_field_report(
        &self,
        event_id: &str,
        field_report: u64,
        incident: Option<u64>,
    ) -> Result<(), ClientError> {
        let mut url = self
            .urls()
            .record(EntityKind::FieldReport, event_id, field_report);
        match incident {
            Some(incident) => url.push_str(&format!("?action=attach&incident={incident}")),
            None => url.push_str("?action=detach"),
        }
        self.post_json(&url, &json!({})).await?;
        Ok(())
    }

    pub async fn upload_attachment(
        &self,
        kind: EntityKind,
        event_id: &str,
        number: u64,
        attachment: Attachment,
    ) -> Result<(), ClientError> {
        let url = self.urls().attachments(kind, event_id, number);
        let part = multipart::Part::bytes(attachment.bytes)
            .file_name(attachment.file_name)
            .mime_str(&attachment.mime_type)
            .map_err(|source| ClientError::Transport {
                url: url.clone(),
                source,
            })?;
        let form = multipart::Form::new().part("file", part);
        let req = self.request(Method::POST, &url).await?.multipart(form);
        send(&url, req).await?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::api::ClientOptions,
        ims_common::{KvStore, MemoryKvStore},
        ims_protocol::{FieldReport, Incident},
        mockito::Matcher,
        std::sync::Arc,
    };

    fn client(server: &mockito::Server) -> ImsClient {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        ImsClient::new(ClientOptions::new(server.url()), store).unwrap()
    }

    #[tokio::test]
    async fn get_and_list_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ims/api/events/2025/incidents/")
            .with_body(r#"[{"number":1,"event":"2025"},{"number":2,"event":"2025"}]"#)
            .create_async()
            .await;
        server
            .mock("GET", "/ims/api/events/2025/field_reports/42")
            .with_body(r#"{"number":42,"event":"2025","summary":"lost bike"}"#)
            .create_async()
            .await;

        let client = client(&server);
        let incidents: Vec<Incident> = client.list_records("2025").await.unwrap();
        assert_eq!(incidents.len(), 2);
        let report: FieldReport = client.get_record("2025", 42).await.unwrap();
        assert_eq!(report.summary.as_deref(), Some("lost bike"));
    }

    #[tokio::test]
    async fn create_reads_number_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ims/api/events/2025/field_reports/")
            .match_body(Matcher::Json(json!({"summary": "x"})))
            .with_status(201)
            .with_header("IMS-Field-Report-Number", "42")
            .create_async()
            .await;

        let number = client(&server)
            .create_record(EntityKind::FieldReport, "2025", &json!({"summary": "x"}))
            .await
            .unwrap();
        assert_eq!(number, 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_without_header_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ims/api/events/2025/stays/")
            .with_status(201)
            .create_async()
            .await;
        let err = client(&server)
            .create_record(EntityKind::Stay, "2025", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::MissingHeader {
                header: "IMS-Stay-Number",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn link_field_report_uses_action_query() {
        let mut server = mockito::Server::new_async().await;
        let attach = server
            .mock("POST", "/ims/api/events/2025/field_reports/7")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("action".into(), "attach".into()),
                Matcher::UrlEncoded("incident".into(), "3".into()),
            ]))
            .create_async()
            .await;
        let detach = server
            .mock("POST", "/ims/api/events/2025/field_reports/7")
            .match_query(Matcher::UrlEncoded("action".into(), "detach".into()))
            .create_async()
            .await;

        let client = client(&server);
        client.link_field_report("2025", 7, Some(3)).await.unwrap();
        client.link_field_report("2025", 7, None).await.unwrap();
        attach.assert_async().await;
        detach.assert_async().await;
    }

    #[tokio::test]
    async fn strike_posts_flag() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ims/api/events/2025/incidents/3/report_entries/9")
            .match_body(Matcher::Json(json!({"stricken": true})))
            .create_async()
            .await;
        client(&server)
            .set_report_entry_stricken(EntityKind::Incident, "2025", 3, 9, true)
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn upload_is_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/ims/api/events/2025/incidents/3/attachments")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".into()),
            )
            .match_body(Matcher::Regex("filename=\"photo.jpg\"".into()))
            .create_async()
            .await;
        client(&server)
            .upload_attachment(EntityKind::Incident, "2025", 3, Attachment {
                file_name: "photo.jpg".into(),
                mime_type: "image/jpeg".into(),
                bytes: b"jpegdata".to_vec(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_edit_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ims/api/events/2025/incidents/3")
            .with_status(400)
            .with_body("summary too long")
            .create_async()
            .await;
        let err = client(&server)
            .edit_record(EntityKind::Incident, "2025", 3, &json!({"summary": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("summary too long"));
    }
}
