//! Notification bus between the pipeline and its downstream consumers.
//!
//! Built on [`tokio::sync::broadcast`] so a slow consumer never blocks the
//! ingestion path: it lags and loses the oldest notifications instead.
//!
//! # Lanes
//!
//! Every notification goes to the global channel and to the [`Lane`]
//! matching its payload:
//!
//! | Lane | Payload |
//! |---|---|
//! | [`Lane::Records`] | `RecordProcessed` |
//! | [`Lane::Anomalies`] | `AnomalyOpened` |
//! | [`Lane::Heartbeats`] | transport `Heartbeat` |

use tokio::sync::broadcast;
use tracing::warn;
use vigil_types::{Notification, NotificationPayload};

/// Buffered notifications per channel before slow receivers start lagging.
const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Records,
    Anomalies,
    Heartbeats,
}

impl Lane {
    pub fn of(payload: &NotificationPayload) -> Self {
        match payload {
            NotificationPayload::RecordProcessed(_) => Lane::Records,
            NotificationPayload::AnomalyOpened(_) => Lane::Anomalies,
            NotificationPayload::Heartbeat(_) => Lane::Heartbeats,
        }
    }
}

/// Shared notification bus.  Clones share the same channels.
#[derive(Clone, Debug)]
pub struct NotificationBus {
    all: broadcast::Sender<Notification>,
    records: broadcast::Sender<Notification>,
    anomalies: broadcast::Sender<Notification>,
    heartbeats: broadcast::Sender<Notification>,
}

impl NotificationBus {
    /// `capacity` applies to every channel independently.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        let (records, _) = broadcast::channel(capacity);
        let (anomalies, _) = broadcast::channel(capacity);
        let (heartbeats, _) = broadcast::channel(capacity);
        Self {
            all,
            records,
            anomalies,
            heartbeats,
        }
    }

    /// Publish to the global channel and the payload's lane.
    ///
    /// Returns how many receivers were handed the notification.  Having no
    /// listeners is normal and yields `0`.
    pub fn publish(&self, notification: Notification) -> usize {
        let lane = self.sender(Lane::of(&notification.payload));
        let on_lane = lane.send(notification.clone()).unwrap_or(0);
        on_lane + self.all.send(notification).unwrap_or(0)
    }

    /// Receiver for every notification.
    pub fn subscribe(&self) -> NotificationStream {
        NotificationStream {
            receiver: self.all.subscribe(),
        }
    }

    /// Receiver for a single lane.
    pub fn subscribe_to(&self, lane: Lane) -> LaneReceiver {
        LaneReceiver {
            lane,
            receiver: self.sender(lane).subscribe(),
        }
    }

    fn sender(&self, lane: Lane) -> &broadcast::Sender<Notification> {
        match lane {
            Lane::Records => &self.records,
            Lane::Anomalies => &self.anomalies,
            Lane::Heartbeats => &self.heartbeats,
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Receivers
// ────────────────────────────────────────────────────────────────────────────

/// Receiver bound to one [`Lane`].  Lag is surfaced to the caller.
pub struct LaneReceiver {
    lane: Lane,
    receiver: broadcast::Receiver<Notification>,
}

impl LaneReceiver {
    /// `Err(Lagged(n))` means `n` notifications were dropped for this
    /// receiver; `Err(Closed)` means the bus is gone.
    pub async fn recv(&mut self) -> Result<Notification, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }
}

/// Receiver for the global channel that skips over lag.
pub struct NotificationStream {
    receiver: broadcast::Receiver<Notification>,
}

impl NotificationStream {
    /// Next notification, or `None` once the bus is closed.
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) => return Some(notification),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vigil_types::{
        AnomalyKind, AnomalyOpened, ConnectionState, DataType, HealthReport, Payload, RecordProcessed, Severity,
        SignalType, TransportHeartbeat,
    };

    fn record() -> Notification {
        Notification::new(
            "test",
            NotificationPayload::RecordProcessed(RecordProcessed {
                signal_type: SignalType::Cardiac,
                data_type: DataType::Rate,
                value: Payload::Scalar(72.0),
                timestamp: 1.0,
                open_anomalies: Vec::new(),
            }),
        )
    }

    fn anomaly() -> Notification {
        Notification::new(
            "test",
            NotificationPayload::AnomalyOpened(AnomalyOpened {
                signal_type: SignalType::Cardiac,
                anomaly_type: AnomalyKind::Tachycardia,
                severity: Severity::Warning,
                message: "Tachycardia".into(),
                timestamp: 1.0,
                value: 120.0,
                threshold: 100.0,
            }),
        )
    }

    fn heartbeat() -> Notification {
        Notification::new(
            "test",
            NotificationPayload::Heartbeat(TransportHeartbeat {
                state: ConnectionState::Connected,
                uptime_secs: 1.0,
                per_topic_stats: BTreeMap::new(),
                health: HealthReport::healthy(),
                malformed_frames: 0,
                dropped_frames: 0,
            }),
        )
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = NotificationBus::default();
        assert_eq!(bus.publish(record()), 0);
    }

    #[tokio::test]
    async fn global_stream_sees_every_lane() -> Result<(), Box<dyn std::error::Error>> {
        let bus = NotificationBus::default();
        let mut all = bus.subscribe();
        bus.publish(record());
        bus.publish(heartbeat());

        let first = all.recv().await.ok_or("bus closed")?;
        assert!(matches!(first.payload, NotificationPayload::RecordProcessed(_)));
        let second = all.recv().await.ok_or("bus closed")?;
        assert!(matches!(second.payload, NotificationPayload::Heartbeat(_)));
        Ok(())
    }

    #[tokio::test]
    async fn lanes_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = NotificationBus::default();
        let mut anomalies = bus.subscribe_to(Lane::Anomalies);
        assert_eq!(anomalies.lane(), Lane::Anomalies);

        bus.publish(record());
        bus.publish(anomaly());

        let got = anomalies.recv().await?;
        assert!(matches!(got.payload, NotificationPayload::AnomalyOpened(_)));
        Ok(())
    }

    #[tokio::test]
    async fn stream_skips_lag() -> Result<(), Box<dyn std::error::Error>> {
        let bus = NotificationBus::new(2);
        let mut all = bus.subscribe();
        for _ in 0..5 {
            bus.publish(record());
        }
        bus.publish(anomaly());
        // The oldest records were overwritten; the stream resumes afterwards.
        let mut last = None;
        for _ in 0..2 {
            last = all.recv().await;
        }
        let last = last.ok_or("bus closed")?;
        assert!(matches!(last.payload, NotificationPayload::AnomalyOpened(_)));
        Ok(())
    }
}
