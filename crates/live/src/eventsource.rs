//! A reconnecting server push transport.
//!
//! Behaves like a browser `EventSource`: a dropped stream or a network
//! failure is reported as a non-terminal [`SourceEvent::Error`] and the
//! connection is retried after the reconnect delay, resending the last event
//! id. A response that is not `200 text/event-stream`, or a rejected session,
//! ends the stream with [`SourceEvent::Closed`].

use std::time::Duration;

use {
    futures::{StreamExt, stream::BoxStream},
    ims_client::{ClientError, ImsClient},
    ims_protocol::headers,
    tracing::{debug, info, warn},
};

use crate::sse::{SseDecoder, SseMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Open,
    Message(SseMessage),
    /// Recoverable failure; the transport will reconnect.
    Error(String),
    /// Terminal; no more events follow.
    Closed(String),
}

/// Opens push sessions. One call, one session.
pub trait PushConnector: Send + Sync {
    fn connect(&self) -> BoxStream<'static, SourceEvent>;
}

pub struct EventSourceConnector {
    client: ImsClient,
    reconnect: Duration,
}

impl EventSourceConnector {
    pub fn new(client: ImsClient, reconnect: Duration) -> Self {
        Self { client, reconnect }
    }
}

impl PushConnector for EventSourceConnector {
    fn connect(&self) -> BoxStream<'static, SourceEvent> {
        event_source(self.client.clone(), self.reconnect).boxed()
    }
}

fn is_event_stream(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(headers::EVENT_STREAM_MIME))
}

/// The event source as a stream of transport events.
pub fn event_source(
    client: ImsClient,
    reconnect: Duration,
) -> impl futures::Stream<Item = SourceEvent> + Send + 'static {
    async_stream::stream! {
        let mut last_event_id: Option<String> = None;
        let mut delay = reconnect;
        loop {
            let req = match client.event_source_request(last_event_id.as_deref()).await {
                Ok(req) => req,
                Err(ClientError::Unauthenticated) => {
                    yield SourceEvent::Closed("not authenticated".into());
                    return;
                },
                Err(e) => {
                    yield SourceEvent::Error(e.to_string());
                    tokio::time::sleep(delay).await;
                    continue;
                },
            };

            let resp = match req.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(error = %e, "push connection failed");
                    yield SourceEvent::Error(e.to_string());
                    tokio::time::sleep(delay).await;
                    continue;
                },
            };

            let status = resp.status();
            if status != reqwest::StatusCode::OK {
                yield SourceEvent::Closed(format!("unexpected status {status}"));
                return;
            }
            if !is_event_stream(&resp) {
                yield SourceEvent::Closed("response is not an event stream".into());
                return;
            }

            info!(resume_from = ?last_event_id, "push connection open");
            yield SourceEvent::Open;

            let mut decoder = SseDecoder::resume(last_event_id.take());
            let mut body = resp.bytes_stream();
            let reason = loop {
                match body.next().await {
                    Some(Ok(chunk)) => {
                        for message in decoder.feed(&chunk) {
                            yield SourceEvent::Message(message);
                        }
                        if let Some(retry) = decoder.take_retry() {
                            debug!(retry_ms = millis(retry), "server changed reconnect delay");
                            delay = retry;
                        }
                    },
                    Some(Err(e)) => break e.to_string(),
                    None => break "stream ended".to_string(),
                }
            };
            last_event_id = decoder.last_event_id().map(str::to_string);

            warn!(%reason, retry_ms = millis(delay), "push connection lost, reconnecting");
            yield SourceEvent::Error(reason);
            tokio::time::sleep(delay).await;
        }
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
