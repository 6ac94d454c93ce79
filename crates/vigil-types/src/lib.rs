//! `vigil-types` – shared vocabulary of the Vigil ingestion stack.
//!
//! - [`signal`] – signal families, data types, payloads and the normalized
//!   record handed from the decoder to the orchestrator.
//! - [`anomaly`] – `(kind, severity)` tagged findings and open anomaly records.
//! - [`control`] – the [`SignalControl`] contract and the
//!   [`SignalSwitchboard`] most components embed.
//! - [`health`] – structured health reports and transport counters.
//! - [`error`] – [`VigilError`] and [`DecodeError`].

pub mod anomaly;
pub mod control;
pub mod error;
pub mod health;
pub mod signal;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use anomaly::{AnomalyKind, AnomalyRecord, Finding, Severity};
pub use control::{ComponentState, ComponentStatus, SignalControl, SignalState, SignalSwitchboard};
pub use error::{DecodeError, VigilError};
pub use health::{ConnectionState, HealthReport, HealthStatus, TopicStats, TransportHeartbeat};
pub use signal::{
    AxisSamples, ChannelSamples, DataType, FaceFrame, NormalizedRecord, Payload, SignalPoint,
    SignalType, Waveform,
};

/// Unified envelope for everything published to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "vigil-runtime::orchestrator"
    pub source: String,
    pub payload: NotificationPayload,
}

impl Notification {
    pub fn new(source: impl Into<String>, payload: NotificationPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that are broadcast to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    RecordProcessed(RecordProcessed),
    AnomalyOpened(AnomalyOpened),
    Heartbeat(TransportHeartbeat),
}

/// A record was accepted into its signal buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordProcessed {
    pub signal_type: SignalType,
    pub data_type: DataType,
    pub value: Payload,
    pub timestamp: f64,
    pub open_anomalies: Vec<AnomalyRecord>,
}

/// A detection pass produced a message that was not open before.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyOpened {
    pub signal_type: SignalType,
    pub anomaly_type: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: f64,
    pub value: f64,
    pub threshold: f64,
}
