//! Per-kind fan-out topics.
//!
//! Each topic is a `tokio::sync::broadcast` channel carrying
//! [`FanoutMessage`] values. Delivery is at most once per publish and there is
//! no replay: a subscriber that joins late misses earlier messages, which is
//! what [`FanoutMessage::UpdateAll`] recovers from.
//!
//! A relayed bus routes publishes through the profile's [`crate::relay`] log
//! so that other processes hear them too.

use std::{path::PathBuf, sync::Arc};

use {
    ims_protocol::{EntityKind, FanoutMessage},
    tokio::sync::broadcast,
    tracing::{trace, warn},
};

use crate::relay::{FanoutLog, RelayError};

const TOPIC_CAPACITY: usize = 64;

/// Cloning the bus is cheap and every clone publishes to the same topics.
#[derive(Clone, Debug)]
pub struct FanoutBus {
    incident: broadcast::Sender<FanoutMessage>,
    field_report: broadcast::Sender<FanoutMessage>,
    stay: broadcast::Sender<FanoutMessage>,
    relay: Option<Arc<FanoutLog>>,
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new()
    }
}

impl FanoutBus {
    pub fn new() -> Self {
        Self::with_capacity(TOPIC_CAPACITY)
    }

    /// A bus whose topics buffer `capacity` messages per subscriber. A
    /// subscriber further behind than that lags.
    pub fn with_capacity(capacity: usize) -> Self {
        let (incident, _) = broadcast::channel(capacity);
        let (field_report, _) = broadcast::channel(capacity);
        let (stay, _) = broadcast::channel(capacity);
        Self {
            incident,
            field_report,
            stay,
            relay: None,
        }
    }

    /// A bus for one process of a profile spread over several processes.
    ///
    /// Publishing appends to the shared log at `path`; subscribers hear what
    /// any process sharing the log publishes, this one included.
    pub fn relayed(path: impl Into<PathBuf>) -> Result<Self, RelayError> {
        let mut bus = Self::new();
        let log = FanoutLog::open(path, bus.clone())?;
        bus.relay = Some(Arc::new(log));
        Ok(bus)
    }

    pub fn is_relayed(&self) -> bool {
        self.relay.is_some()
    }

    fn topic(&self, kind: EntityKind) -> &broadcast::Sender<FanoutMessage> {
        match kind {
            EntityKind::Incident => &self.incident,
            EntityKind::FieldReport => &self.field_report,
            EntityKind::Stay => &self.stay,
        }
    }

    /// Publish on one topic. Returns the number of local subscribers reached;
    /// with none the message is dropped.
    pub fn publish(&self, kind: EntityKind, message: FanoutMessage) -> usize {
        trace!(%kind, ?message, "fan-out publish");
        if let Some(relay) = &self.relay {
            match relay.append(kind, &message) {
                // Delivered locally once the tailer reads it back.
                Ok(()) => return self.topic(kind).receiver_count(),
                Err(e) => warn!(%kind, error = %e, "fan-out relay failed, delivering locally only"),
            }
        }
        // `send` only fails when nobody is subscribed.
        self.topic(kind).send(message).unwrap_or(0)
    }

    pub fn subscribe(&self, kind: EntityKind) -> broadcast::Receiver<FanoutMessage> {
        self.topic(kind).subscribe()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, ims_protocol::UpdateEvent};

    fn update(kind: EntityKind, number: u64) -> FanoutMessage {
        FanoutMessage::Entity(UpdateEvent {
            kind,
            event_id: "2025".into(),
            entity_number: number,
            sequence_id: None,
        })
    }

    #[tokio::test]
    async fn topics_are_independent_and_ordered() {
        let bus = FanoutBus::new();
        let mut incidents = bus.subscribe(EntityKind::Incident);
        let mut reports = bus.subscribe(EntityKind::FieldReport);

        bus.publish(EntityKind::Incident, update(EntityKind::Incident, 1));
        bus.publish(EntityKind::FieldReport, update(EntityKind::FieldReport, 9));
        bus.publish(EntityKind::Incident, FanoutMessage::UpdateAll);
        bus.publish(EntityKind::Incident, update(EntityKind::Incident, 2));

        assert_eq!(incidents.recv().await.unwrap(), update(EntityKind::Incident, 1));
        assert_eq!(incidents.recv().await.unwrap(), FanoutMessage::UpdateAll);
        assert_eq!(incidents.recv().await.unwrap(), update(EntityKind::Incident, 2));
        assert_eq!(reports.recv().await.unwrap(), update(EntityKind::FieldReport, 9));
        assert!(reports.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_subscriber_sees_every_message() {
        let bus = FanoutBus::new();
        let mut a = bus.subscribe(EntityKind::Stay);
        let mut b = bus.clone().subscribe(EntityKind::Stay);
        assert_eq!(bus.publish(EntityKind::Stay, update(EntityKind::Stay, 3)), 2);
        assert_eq!(a.recv().await.unwrap(), update(EntityKind::Stay, 3));
        assert_eq!(b.recv().await.unwrap(), update(EntityKind::Stay, 3));
    }

    #[tokio::test]
    async fn small_capacity_lags_slow_subscribers() {
        let bus = FanoutBus::with_capacity(2);
        let mut slow = bus.subscribe(EntityKind::Incident);
        for n in 1..=3 {
            bus.publish(EntityKind::Incident, update(EntityKind::Incident, n));
        }
        assert!(matches!(
            slow.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
        assert_eq!(slow.recv().await.unwrap(), update(EntityKind::Incident, 2));
    }

    #[test]
    fn publish_without_subscribers_is_dropped() {
        let bus = FanoutBus::new();
        assert_eq!(bus.publish(EntityKind::Incident, FanoutMessage::UpdateAll), 0);
        // A late subscriber does not see it.
        let mut late = bus.subscribe(EntityKind::Incident);
        assert!(late.try_recv().is_err());
    }
}
