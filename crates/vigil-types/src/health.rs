//! Structured health reporting shared by the transport and the orchestrator.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Health verdict with itemised reasons.  Health queries always return one
/// of these instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Conditions that make the status critical.
    pub issues: Vec<String>,
    /// Conditions that degrade the status to warning.
    pub warnings: Vec<String>,
}

impl HealthReport {
    /// Derive the status from the collected items: any issue is critical,
    /// otherwise any warning is a warning.
    pub fn evaluate(issues: Vec<String>, warnings: Vec<String>) -> Self {
        let status = if !issues.is_empty() {
            HealthStatus::Critical
        } else if !warnings.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };
        Self {
            status,
            issues,
            warnings,
        }
    }

    pub fn healthy() -> Self {
        Self::evaluate(Vec::new(), Vec::new())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transport-side state
// ────────────────────────────────────────────────────────────────────────────

/// Lifecycle of the transport subscriber's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Stopped,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted.  Terminal until the next `start()`.
    Error,
}

/// Per-topic counters kept by the transport subscriber.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicStats {
    pub received: u64,
    pub processed: u64,
    pub rejected: u64,
    pub filtered: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub healthy: bool,
}

impl TopicStats {
    /// Share of decoded-or-rejected messages that were rejected.  Filtered
    /// messages are not part of the denominator.
    pub fn rejection_rate(&self) -> f64 {
        let considered = self.processed + self.rejected;
        if considered == 0 {
            0.0
        } else {
            self.rejected as f64 / considered as f64
        }
    }
}

/// Periodic heartbeat published by the transport subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportHeartbeat {
    pub state: ConnectionState,
    /// Seconds since `start()`.
    #[serde(rename = "uptime")]
    pub uptime_secs: f64,
    pub per_topic_stats: BTreeMap<String, TopicStats>,
    pub health: HealthReport,
    pub malformed_frames: u64,
    pub dropped_frames: u64,
}
