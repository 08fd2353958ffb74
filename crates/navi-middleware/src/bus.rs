//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Detections`] | Raw spatial and vision detections from sources |
//! | [`Topic::FusedView`] | "view updated" notifications after each cycle |
//! | [`Topic::ProximityAlerts`] | Close-range alerts raised and cleared |
//! | [`Topic::SourceHealth`] | A detection source went silent |

use navi_types::{Event, EventPayload, NaviError};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// High-frequency detection traffic from the sources.
    Detections,
    /// One notification per completed fusion cycle.
    FusedView,
    /// Proximity alert edges.
    ProximityAlerts,
    /// Source liveness changes.
    SourceHealth,
}

impl Topic {
    /// The lane a payload travels on.
    pub fn for_payload(payload: &EventPayload) -> Self {
        match payload {
            EventPayload::SpatialDetection(_) | EventPayload::VisionDetection(_) => Topic::Detections,
            EventPayload::ViewUpdated(_) => Topic::FusedView,
            EventPayload::Proximity(_) => Topic::ProximityAlerts,
            EventPayload::SourceSilent { .. } => Topic::SourceHealth,
        }
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    detections: broadcast::Sender<Event>,
    fused_view: broadcast::Sender<Event>,
    proximity_alerts: broadcast::Sender<Event>,
    source_health: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (detections, _) = broadcast::channel(capacity);
        let (fused_view, _) = broadcast::channel(capacity);
        let (proximity_alerts, _) = broadcast::channel(capacity);
        let (source_health, _) = broadcast::channel(capacity);
        Self {
            detections,
            fused_view,
            proximity_alerts,
            source_health,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::Channel`] when nobody is subscribed to `topic`.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, NaviError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| NaviError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Publish `event` on the lane its payload belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`NaviError::Channel`] when nobody is subscribed to that lane.
    pub fn publish(&self, event: Event) -> Result<usize, NaviError> {
        let topic = Topic::for_payload(&event.payload);
        self.publish_to(topic, event)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Detections => &self.detections,
            Topic::FusedView => &self.fused_view,
            Topic::ProximityAlerts => &self.proximity_alerts,
            Topic::SourceHealth => &self.source_health,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Like [`recv`](Self::recv) but skips over lag, logging how much was
    /// lost.  Returns `None` once the bus is closed.
    pub async fn next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navi_types::{CycleReport, ProximityAlert, SourceKind, SpatialDetection, TrackKey};

    fn view_event(cycle: u64) -> Event {
        Event::new(
            "navi-fusion::engine",
            EventPayload::ViewUpdated(CycleReport { cycle, ..Default::default() }),
        )
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut first = bus.subscribe_to(Topic::FusedView);
        let mut second = bus.subscribe_to(Topic::FusedView);

        let event = view_event(1);
        assert_eq!(bus.publish_to(Topic::FusedView, event.clone())?, 2);

        assert_eq!(first.recv().await?.id, event.id);
        assert_eq!(second.recv().await?.id, event.id);
        Ok(())
    }

    #[tokio::test]
    async fn publish_routes_by_payload() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::ProximityAlerts);
        let mut detections = bus.subscribe_to(Topic::Detections);

        let alert = Event::new(
            "navi-fusion::proximity",
            EventPayload::Proximity(ProximityAlert {
                track_key: TrackKey(3),
                distance_m: 4.0,
                threshold_m: 10.0,
                class_label: None,
                sensor_ref: 1,
                raised: true,
            }),
        );
        bus.publish(alert.clone())?;
        let detection = Event::new(
            "navi-cli::sim",
            EventPayload::SpatialDetection(SpatialDetection {
                spatial_id: 1,
                sensor_ref: Some(1),
                angle_deg: 10.0,
                distance_m: 20.0,
                observed_at: 0.0,
                intensity: None,
            }),
        );
        bus.publish(detection.clone())?;

        assert_eq!(alerts.recv().await?.id, alert.id);
        assert_eq!(detections.recv().await?.id, detection.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_channel_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::SourceHealth, view_event(1));
        assert!(matches!(result, Err(NaviError::Channel(_))));
    }

    #[test]
    fn payload_lanes() {
        let silent = EventPayload::SourceSilent { source_kind: SourceKind::Vision, silent_for_s: 12.0 };
        assert_eq!(Topic::for_payload(&silent), Topic::SourceHealth);
        assert_eq!(
            Topic::for_payload(&EventPayload::ViewUpdated(CycleReport::default())),
            Topic::FusedView
        );
    }

    #[tokio::test]
    async fn subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::ProximityAlerts);
        let _view = bus.subscribe_to(Topic::FusedView);
        assert_eq!(bus.subscriber_count(Topic::ProximityAlerts), 1);

        bus.publish_to(Topic::FusedView, view_event(1))?;

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "ProximityAlerts subscriber must not see FusedView events");
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_lags_and_next_skips_ahead() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::FusedView);
        for cycle in 0..100 {
            let _ = bus.publish_to(Topic::FusedView, view_event(cycle));
        }

        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );

        let mut lagging = bus.subscribe_to(Topic::FusedView);
        for cycle in 100..200 {
            let _ = bus.publish_to(Topic::FusedView, view_event(cycle));
        }
        let event = lagging.next().await.expect("bus is still open");
        assert!(matches!(event.payload, EventPayload::ViewUpdated(ref r) if r.cycle >= 184));
        assert_eq!(lagging.topic(), Topic::FusedView);
    }

    #[tokio::test]
    async fn next_returns_none_when_bus_dropped() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to(Topic::Detections);
        drop(bus);
        assert!(rx.next().await.is_none());
    }
}
