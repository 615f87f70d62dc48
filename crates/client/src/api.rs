use std::{sync::Arc, time::Duration};

use {
    ims_common::KvStore,
    ims_protocol::{
        access::AuthInfo,
        auth::{LoginRequest, TokenResponse},
        headers,
    },
    reqwest::{Method, RequestBuilder, Response},
    secrecy::ExposeSecret,
    serde::{Serialize, de::DeserializeOwned},
    tracing::{debug, info, warn},
};

use crate::{
    auth::TokenManager,
    error::{ClientError, from_status},
    urls::{self, UrlTemplates},
};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub refresh_margin: Duration,
    pub timeout: Option<Duration>,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_margin: Duration::from_secs(60),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }
}

/// Cheap to clone; all clones share one connection pool and token.
#[derive(Clone)]
pub struct ImsClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    urls: UrlTemplates,
    tokens: TokenManager,
}

impl ImsClient {
    pub fn new(options: ClientOptions, store: Arc<dyn KvStore>) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            // Applies to connect and headers only; the push stream is long-lived.
            builder = builder.connect_timeout(timeout);
        }
        let http = builder.build().map_err(|source| ClientError::Transport {
            url: options.base_url.clone(),
            source,
        })?;
        Ok(Self {
            inner: Arc::new(Inner {
                http,
                urls: UrlTemplates::new(&options.base_url),
                tokens: TokenManager::new(store, options.refresh_margin),
            }),
        })
    }

    pub fn urls(&self) -> &UrlTemplates {
        &self.inner.urls
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.inner.tokens
    }

    pub async fn login(&self, identification: &str, password: &str) -> Result<(), ClientError> {
        let url = self.urls().absolute(urls::AUTH);
        let body = LoginRequest {
            identification: identification.to_string(),
            password: password.to_string(),
        };
        let req = self.inner.http.post(&url).json(&body);
        let token: TokenResponse = read_json(&url, send(&url, req).await?).await?;
        self.tokens().store_token(&token)?;
        info!(user = identification, "logged in");
        Ok(())
    }

    pub fn logout(&self) -> Result<(), ClientError> {
        self.tokens().clear()
    }

    /// Refresh the token now, regardless of its refresh time.
    pub async fn refresh_token(&self) -> Result<(), ClientError> {
        let _guard = self.tokens().refresh_guard().await;
        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<(), ClientError> {
        let Some(token) = self.tokens().token()? else {
            return Err(ClientError::Unauthenticated);
        };
        let url = self.urls().absolute(urls::AUTH_REFRESH);
        let req = self
            .inner
            .http
            .post(&url)
            .bearer_auth(token.expose_secret());
        let fresh: TokenResponse = read_json(&url, send(&url, req).await?).await?;
        self.tokens().store_token(&fresh)?;
        debug!("refreshed access token");
        Ok(())
    }

    async fn ensure_fresh_token(&self) -> Result<(), ClientError> {
        if !self.tokens().needs_refresh()? {
            return Ok(());
        }
        let _guard = self.tokens().refresh_guard().await;
        // Another task may have refreshed while we waited.
        if !self.tokens().needs_refresh()? {
            return Ok(());
        }
        match self.refresh_locked().await {
            Ok(()) => Ok(()),
            // An expired session must be reported; anything else falls back
            // to the current token and lets the real request decide.
            Err(ClientError::Unauthenticated) => Err(ClientError::Unauthenticated),
            Err(e) => {
                warn!(error = %e, "token refresh failed, using current token");
                Ok(())
            },
        }
    }

    /// A request carrying the current bearer token.
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, ClientError> {
        self.ensure_fresh_token().await?;
        let req = self.inner.http.request(method, url);
        Ok(match self.tokens().token()? {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        })
    }

    /// Request for the server push stream.
    pub async fn event_source_request(
        &self,
        last_event_id: Option<&str>,
    ) -> Result<RequestBuilder, ClientError> {
        let url = self.urls().absolute(urls::EVENT_SOURCE);
        let mut req = self
            .request(Method::GET, &url)
            .await?
            .header(reqwest::header::ACCEPT, headers::EVENT_STREAM_MIME)
            .header(reqwest::header::CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            req = req.header(headers::LAST_EVENT_ID, id);
        }
        Ok(req)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let req = self.request(Method::GET, url).await?;
        read_json(url, send(url, req).await?).await
    }

    /// POST a JSON body and return the raw response for header inspection.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Response, ClientError> {
        let req = self.request(Method::POST, url).await?.json(body);
        send(url, req).await
    }

    pub async fn auth_info(&self, event_id: Option<&str>) -> Result<AuthInfo, ClientError> {
        let mut url = self.urls().absolute(urls::AUTH);
        if let Some(event_id) = event_id {
            url.push_str("?event_id=");
            url.push_str(&urlencoding::encode(event_id));
        }
        self.get_json(&url).await
    }
}

/// Send and map non-success statuses onto [`ClientError`].
pub(crate) async fn send(url: &str, req: RequestBuilder) -> Result<Response, ClientError> {
    let resp = req.send().await.map_err(|source| ClientError::Transport {
        url: url.to_string(),
        source,
    })?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(url, status = status.as_u16(), "request rejected");
    Err(from_status(status.as_u16(), &body))
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    url: &str,
    resp: Response,
) -> Result<T, ClientError> {
    let bytes = resp.bytes().await.map_err(|source| ClientError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ClientError::Decode {
        url: url.to_string(),
        source,
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ims_common::{MemoryKvStore, keys},
        mockito::Matcher,
    };

    fn client(server: &mockito::Server) -> (ImsClient, Arc<dyn KvStore>) {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let client = ImsClient::new(ClientOptions::new(server.url()), Arc::clone(&store)).unwrap();
        (client, store)
    }

    fn far_future_ms() -> i64 {
        crate::auth::now_ms() + 3_600_000
    }

    #[tokio::test]
    async fn login_stores_token_and_requests_carry_it() {
        let mut server = mockito::Server::new_async().await;
        let login = server
            .mock("POST", "/ims/api/auth")
            .match_body(Matcher::Json(serde_json::json!({
                "identification": "Hubcap",
                "password": "pw",
            })))
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"token":"tok-1","expires_unix_ms":{}}}"#,
                far_future_ms()
            ))
            .create_async()
            .await;
        let info = server
            .mock("GET", "/ims/api/auth")
            .match_query(Matcher::UrlEncoded("event_id".into(), "2025".into()))
            .match_header("authorization", "Bearer tok-1")
            .with_body(r#"{"authenticated":true,"user":"Hubcap","event_access":{}}"#)
            .create_async()
            .await;

        let (client, store) = client(&server);
        client.login("Hubcap", "pw").await.unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("tok-1"));

        let auth = client.auth_info(Some("2025")).await.unwrap();
        assert!(auth.authenticated);
        assert_eq!(auth.user.as_deref(), Some("Hubcap"));
        login.assert_async().await;
        info.assert_async().await;
    }

    #[tokio::test]
    async fn due_token_is_refreshed_before_request() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/ims/api/auth/refresh")
            .match_header("authorization", "Bearer old")
            .with_body(format!(
                r#"{{"token":"new","expires_unix_ms":{}}}"#,
                far_future_ms()
            ))
            .expect(1)
            .create_async()
            .await;
        let events = server
            .mock("GET", "/ims/api/events/")
            .match_header("authorization", "Bearer new")
            .with_body(r#"[{"id":1,"name":"2025"}]"#)
            .create_async()
            .await;

        let (client, store) = client(&server);
        store.set(keys::ACCESS_TOKEN, "old").unwrap();
        store.set(keys::ACCESS_TOKEN_REFRESH_AFTER, "0").unwrap();

        let url = client.urls().absolute(urls::EVENTS);
        let list: Vec<ims_protocol::model::Event> = client.get_json(&url).await.unwrap();
        assert_eq!(list[0].name, "2025");
        refresh.assert_async().await;
        events.assert_async().await;
    }

    #[tokio::test]
    async fn rejected_refresh_reports_unauthenticated() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/ims/api/auth/refresh")
            .with_status(401)
            .create_async()
            .await;
        let (client, store) = client(&server);
        store.set(keys::ACCESS_TOKEN, "old").unwrap();
        store.set(keys::ACCESS_TOKEN_REFRESH_AFTER, "0").unwrap();

        let url = client.urls().absolute(urls::EVENTS);
        let err = client
            .get_json::<serde_json::Value>(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unauthenticated));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/ims/api/events/")
            .with_body("<html>")
            .create_async()
            .await;
        let (client, _) = client(&server);
        let url = client.urls().absolute(urls::EVENTS);
        let err = client
            .get_json::<Vec<ims_protocol::model::Event>>(&url)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        let client = ImsClient::new(ClientOptions::new("http://127.0.0.1:9"), store).unwrap();
        let url = client.urls().absolute(urls::EVENTS);
        let err = client
            .get_json::<serde_json::Value>(&url)
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn event_source_request_sends_last_event_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ims/api/eventsource")
            .match_header("accept", "text/event-stream")
            .match_header("last-event-id", "41")
            .with_header("content-type", "text/event-stream")
            .create_async()
            .await;
        let (client, _) = client(&server);
        let resp = client
            .event_source_request(Some("41"))
            .await
            .unwrap()
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        mock.assert_async().await;
    }
}
