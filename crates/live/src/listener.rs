//! Turns push frames into fan-out messages.

use std::sync::Arc;

use {
    futures::{Stream, StreamExt},
    ims_common::{KvStore, keys},
    ims_protocol::{EntityKind, FanoutMessage, PushEvent},
    tracing::{debug, info, warn},
};

use crate::{bus::FanoutBus, eventsource::SourceEvent, sse::SseMessage};

/// Topics refreshed when the stream baseline changes.
const UPDATE_ALL_TOPICS: [EntityKind; 2] = [EntityKind::Incident, EntityKind::FieldReport];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Summary of one finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEnd {
    pub frames: usize,
    pub published: usize,
    pub reason: String,
}

pub struct PushListener {
    bus: FanoutBus,
    store: Arc<dyn KvStore>,
}

impl PushListener {
    pub fn new(bus: FanoutBus, store: Arc<dyn KvStore>) -> Self {
        Self { bus, store }
    }

    /// Drive one session until the transport closes.
    pub async fn run<S>(&self, stream: S) -> SessionEnd
    where
        S: Stream<Item = SourceEvent> + Send,
    {
        futures::pin_mut!(stream);
        let mut state = ConnectionState::Connecting;
        let mut frames = 0;
        let mut published = 0;

        let reason = loop {
            let Some(event) = stream.next().await else {
                break "transport finished".to_string();
            };
            match event {
                SourceEvent::Open => {
                    state = ConnectionState::Open;
                    debug!("push session open");
                },
                SourceEvent::Message(message) => {
                    if state != ConnectionState::Open {
                        debug!(?state, "frame before open");
                    }
                    frames += 1;
                    published += self.handle_message(&message);
                },
                SourceEvent::Error(error) => {
                    state = ConnectionState::Connecting;
                    debug!(%error, "push transport error");
                },
                SourceEvent::Closed(reason) => {
                    state = ConnectionState::Closed;
                    break reason;
                },
            }
        };

        info!(?state, frames, published, %reason, "push session ended");
        SessionEnd {
            frames,
            published,
            reason,
        }
    }

    /// Handle one frame. Returns how many fan-out messages were published.
    pub fn handle_message(&self, message: &SseMessage) -> usize {
        let id = message.last_event_id.as_deref();
        if let Some(id) = id
            && EntityKind::from_push_event_name(&message.event).is_some()
        {
            self.remember(id);
        }
        let decoded = match PushEvent::decode(&message.event, id, &message.data) {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!(event = %message.event, "ignoring unknown push event");
                return 0;
            },
            Err(e) => {
                warn!(error = %e, data = %message.data, "dropping malformed push payload");
                return 0;
            },
        };

        match decoded {
            PushEvent::InitialSync { sequence_id } => self.initial_sync(sequence_id),
            PushEvent::Entity(update) => {
                let kind = update.kind;
                self.bus.publish(kind, FanoutMessage::Entity(update));
                1
            },
        }
    }

    fn initial_sync(&self, sequence_id: Option<String>) -> usize {
        let previous = match self.store.get(keys::LAST_PUSH_EVENT_ID) {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "cannot read last push event id");
                None
            },
        };
        if previous.is_some() && previous == sequence_id {
            debug!(id = ?sequence_id, "push baseline unchanged");
            return 0;
        }

        info!(previous = ?previous, current = ?sequence_id, "push baseline changed, refreshing all");
        for kind in UPDATE_ALL_TOPICS {
            self.bus.publish(kind, FanoutMessage::UpdateAll);
        }
        if let Some(id) = &sequence_id {
            self.remember(id);
        }
        UPDATE_ALL_TOPICS.len()
    }

    fn remember(&self, id: &str) {
        if let Err(e) = self.store.set(keys::LAST_PUSH_EVENT_ID, id) {
            warn!(error = %e, "cannot persist last push event id");
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ims_common::MemoryKvStore,
        ims_protocol::UpdateEvent,
        tokio::sync::broadcast::error::TryRecvError,
    };

    fn frame(event: &str, id: Option<&str>, data: &str) -> SourceEvent {
        SourceEvent::Message(SseMessage {
            event: event.into(),
            data: data.into(),
            last_event_id: id.map(str::to_string),
        })
    }

    fn listener() -> (PushListener, FanoutBus, Arc<dyn KvStore>) {
        let bus = FanoutBus::new();
        let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        (PushListener::new(bus.clone(), Arc::clone(&store)), bus, store)
    }

    #[tokio::test]
    async fn changed_baseline_refreshes_incidents_and_reports_once() {
        let (listener, bus, store) = listener();
        store.set(keys::LAST_PUSH_EVENT_ID, "3").unwrap();
        let mut incidents = bus.subscribe(EntityKind::Incident);
        let mut reports = bus.subscribe(EntityKind::FieldReport);
        let mut stays = bus.subscribe(EntityKind::Stay);

        let end = listener
            .run(futures::stream::iter(vec![
                SourceEvent::Open,
                frame("InitialEvent", Some("8"), "{}"),
                SourceEvent::Closed("done".into()),
            ]))
            .await;

        assert_eq!(end.published, 2);
        assert_eq!(incidents.try_recv().unwrap(), FanoutMessage::UpdateAll);
        assert_eq!(incidents.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(reports.try_recv().unwrap(), FanoutMessage::UpdateAll);
        assert_eq!(reports.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(stays.try_recv().unwrap_err(), TryRecvError::Empty);
        assert_eq!(store.get(keys::LAST_PUSH_EVENT_ID).unwrap().as_deref(), Some("8"));
    }

    #[tokio::test]
    async fn same_baseline_publishes_nothing() {
        let (listener, bus, store) = listener();
        store.set(keys::LAST_PUSH_EVENT_ID, "8").unwrap();
        let mut incidents = bus.subscribe(EntityKind::Incident);
        assert_eq!(listener.handle_message(&SseMessage {
            event: "InitialEvent".into(),
            data: "{}".into(),
            last_event_id: Some("8".into()),
        }), 0);
        assert!(incidents.try_recv().is_err());
    }

    #[tokio::test]
    async fn entity_frames_are_republished_and_remembered() {
        let (listener, bus, store) = listener();
        let mut reports = bus.subscribe(EntityKind::FieldReport);

        let end = listener
            .run(futures::stream::iter(vec![
                SourceEvent::Open,
                frame("FieldReport", Some("11"), r#"{"event_id":"2025","field_report_number":42}"#),
                frame("Incident", Some("12"), "not json"),
                frame("Weather", Some("13"), "{}"),
                SourceEvent::Error("reset".into()),
                SourceEvent::Closed("gone".into()),
            ]))
            .await;

        assert_eq!(end, SessionEnd {
            frames: 3,
            published: 1,
            reason: "gone".into(),
        });
        assert_eq!(
            reports.try_recv().unwrap(),
            FanoutMessage::Entity(UpdateEvent {
                kind: EntityKind::FieldReport,
                event_id: "2025".into(),
                entity_number: 42,
                sequence_id: Some("11".into()),
            })
        );
        // Malformed entity frames still advance the id; unknown frames do not.
        assert_eq!(store.get(keys::LAST_PUSH_EVENT_ID).unwrap().as_deref(), Some("12"));
    }

    #[tokio::test]
    async fn exhausted_transport_ends_the_session() {
        let (listener, ..) = listener();
        let end = listener.run(futures::stream::iter(vec![SourceEvent::Open])).await;
        assert_eq!(end.frames, 0);
        assert_eq!(end.reason, "transport finished");
    }
}
