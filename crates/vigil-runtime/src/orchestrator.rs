//! [`Orchestrator`] – routes normalized records to their signal family.
//!
//! One [`Signal`] per family lives behind a single mutex, so insert and
//! detection for a record happen atomically with respect to other routes
//! and health queries.  Notifications are published after the lock is
//! released.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vigil_middleware::NotificationBus;
use vigil_perception::Topic;
use vigil_signals::{Signal, SignalsConfig};
use vigil_types::{
    AnomalyOpened, AnomalyRecord, ComponentState, ComponentStatus, HealthReport, NormalizedRecord, Notification,
    NotificationPayload, RecordProcessed, SignalControl, SignalState, SignalSwitchboard, SignalType, VigilError,
};

pub const COMPONENT_NAME: &str = "orchestrator";
const NOTIFICATION_SOURCE: &str = "vigil-runtime::orchestrator";

const IDLE_LIMIT: Duration = Duration::from_secs(30);
const ERROR_RATE_LIMIT: f64 = 0.1;
const OPEN_ANOMALY_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyStats {
    pub processed: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub processed: u64,
    pub errors: u64,
    /// System topics are neither processed nor errors.
    pub system_messages: u64,
    pub per_family: BTreeMap<SignalType, FamilyStats>,
}

impl ProcessingStats {
    pub fn error_rate(&self) -> f64 {
        let total = self.processed + self.errors;
        if total == 0 {
            0.0
        } else {
            self.errors as f64 / total as f64
        }
    }
}

/// What [`Orchestrator::route`] did with a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Stored in its signal; carries the anomalies this record opened.
    Accepted(Vec<AnomalyRecord>),
    /// System traffic, counted and dropped.
    System,
}

struct Inner {
    signals: BTreeMap<SignalType, Signal>,
    stats: ProcessingStats,
}

pub struct Orchestrator {
    inner: Mutex<Inner>,
    /// Broadcast switches: a disabled signal is still stored, just not
    /// announced.
    switches: SignalSwitchboard,
    bus: Arc<NotificationBus>,
}

impl Orchestrator {
    pub fn new(config: &SignalsConfig, bus: Arc<NotificationBus>) -> Self {
        let signals = SignalType::FAMILIES
            .into_iter()
            .filter_map(|family| Signal::for_family(family, config).map(|s| (family, s)))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                signals,
                stats: ProcessingStats::default(),
            }),
            switches: SignalSwitchboard::new(Topic::names()),
            bus,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand `record` to its family's signal and announce the result.
    ///
    /// Validation failures and records of a family without a signal are
    /// counted as errors and returned.
    pub fn route(&self, record: &NormalizedRecord) -> Result<Routed, VigilError> {
        let (opened, open) = {
            let mut guard = self.inner();
            let inner = &mut *guard;
            if record.signal_type == SignalType::System {
                inner.stats.system_messages += 1;
                return Ok(Routed::System);
            }
            let family = inner.stats.per_family.entry(record.signal_type).or_default();
            let Some(signal) = inner.signals.get_mut(&record.signal_type) else {
                inner.stats.errors += 1;
                family.errors += 1;
                return Err(VigilError::ValidationFailure {
                    signal: record.signal_type.to_string(),
                    reason: "no signal registered for this family".into(),
                });
            };
            match signal.accept(record) {
                Ok(opened) => {
                    inner.stats.processed += 1;
                    family.processed += 1;
                    (opened, signal.open_anomalies())
                }
                Err(err) => {
                    inner.stats.errors += 1;
                    family.errors += 1;
                    return Err(err);
                }
            }
        };

        for anomaly in &opened {
            info!(
                signal = %record.signal_type,
                kind = ?anomaly.kind,
                severity = ?anomaly.severity,
                value = anomaly.value,
                "{}",
                anomaly.message
            );
        }

        if self.switches.is_active(&record.source) {
            self.announce(record, &opened, open);
        } else {
            debug!(source = %record.source, "broadcast disabled, record kept silently");
        }
        Ok(Routed::Accepted(opened))
    }

    fn announce(&self, record: &NormalizedRecord, opened: &[AnomalyRecord], open: Vec<AnomalyRecord>) {
        self.bus.publish(Notification::new(
            NOTIFICATION_SOURCE,
            NotificationPayload::RecordProcessed(RecordProcessed {
                signal_type: record.signal_type,
                data_type: record.data_type,
                value: record.payload.clone(),
                timestamp: record.timestamp,
                open_anomalies: open,
            }),
        ));
        for anomaly in opened {
            self.bus.publish(Notification::new(
                NOTIFICATION_SOURCE,
                NotificationPayload::AnomalyOpened(AnomalyOpened {
                    signal_type: record.signal_type,
                    anomaly_type: anomaly.kind,
                    severity: anomaly.severity,
                    message: anomaly.message.clone(),
                    timestamp: anomaly.opened_at,
                    value: anomaly.value,
                    threshold: anomaly.threshold,
                }),
            ));
        }
    }

    pub fn stats(&self) -> ProcessingStats {
        self.inner().stats.clone()
    }

    pub fn open_anomalies(&self) -> BTreeMap<SignalType, Vec<AnomalyRecord>> {
        self.inner()
            .signals
            .iter()
            .map(|(family, signal)| (*family, signal.open_anomalies()))
            .collect()
    }

    /// Run `f` against one family's signal under the lock.
    pub fn with_signal<R>(&self, family: SignalType, f: impl FnOnce(&Signal) -> R) -> Option<R> {
        self.inner().signals.get(&family).map(f)
    }

    /// System-wide health.
    ///
    /// Critical with no active signal at all; warning on a high error
    /// rate, an idle signal, many open anomalies or missing families.
    pub fn system_health(&self) -> HealthReport {
        let inner = self.inner();
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        let active: Vec<&Signal> = inner.signals.values().filter(|s| s.is_active()).collect();
        if active.is_empty() {
            issues.push("no active signals".to_string());
        }

        let error_rate = inner.stats.error_rate();
        if error_rate > ERROR_RATE_LIMIT {
            warnings.push(format!("error rate {:.0}%", error_rate * 100.0));
        }

        for signal in &active {
            if let Some(idle) = signal.idle_for()
                && idle > IDLE_LIMIT
            {
                warnings.push(format!("{} idle for {}s", signal.family(), idle.as_secs()));
            }
        }

        let open: usize = inner.signals.values().map(Signal::open_anomaly_count).sum();
        if open > OPEN_ANOMALY_LIMIT {
            warnings.push(format!("{open} open anomalies"));
        }

        if active.len() < SignalType::FAMILIES.len() {
            warnings.push(format!(
                "{} of {} signal families active",
                active.len(),
                SignalType::FAMILIES.len()
            ));
        }

        let report = HealthReport::evaluate(issues, warnings);
        if !report.issues.is_empty() {
            warn!(issues = ?report.issues, "system health critical");
        }
        report
    }
}

impl SignalControl for Orchestrator {
    fn component_name(&self) -> &str {
        COMPONENT_NAME
    }

    fn available_signals(&self) -> Vec<String> {
        self.switches.available()
    }

    fn active_signals(&self) -> Vec<String> {
        self.switches.active()
    }

    fn enable_signal(&self, signal: &str) -> Result<(), VigilError> {
        self.switches.enable(COMPONENT_NAME, signal).map(|_| ())
    }

    fn disable_signal(&self, signal: &str) -> Result<(), VigilError> {
        self.switches.disable(COMPONENT_NAME, signal).map(|_| ())
    }

    fn signal_state(&self, signal: &str) -> SignalState {
        self.switches.state(signal)
    }

    fn component_state(&self) -> ComponentState {
        let any_active = self.inner().signals.values().any(Signal::is_active);
        ComponentState {
            component: COMPONENT_NAME.to_string(),
            status: if any_active {
                ComponentStatus::Running
            } else {
                ComponentStatus::Idle
            },
            available: self.switches.available(),
            active: self.switches.active(),
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_middleware::Lane;
    use vigil_types::{AnomalyKind, DataType, HealthStatus, Payload};

    fn rate(ts: f64, bpm: f64) -> NormalizedRecord {
        NormalizedRecord {
            signal_type: SignalType::Cardiac,
            data_type: DataType::Rate,
            timestamp: ts,
            source: "cardiac/ppi".into(),
            payload: Payload::Scalar(bpm),
            quality: 1.0,
        }
    }

    fn level(ts: f64, value: f64) -> NormalizedRecord {
        NormalizedRecord {
            signal_type: SignalType::Vehicle,
            data_type: DataType::Level,
            timestamp: ts,
            source: "vehicle/level".into(),
            payload: Payload::Scalar(value),
            quality: 1.0,
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<NotificationBus>) {
        let bus = Arc::new(NotificationBus::default());
        (Orchestrator::new(&SignalsConfig::default(), bus.clone()), bus)
    }

    #[test]
    fn system_records_are_not_errors() -> Result<(), Box<dyn std::error::Error>> {
        let (orch, _) = orchestrator();
        let record = NormalizedRecord {
            signal_type: SignalType::System,
            data_type: DataType::Control,
            timestamp: 1.0,
            source: "system/control".into(),
            payload: Payload::Document(serde_json::json!({})),
            quality: 1.0,
        };
        assert_eq!(orch.route(&record)?, Routed::System);
        let stats = orch.stats();
        assert_eq!((stats.system_messages, stats.errors, stats.processed), (1, 0, 0));
        Ok(())
    }

    #[test]
    fn invalid_records_count_as_family_errors() {
        let (orch, _) = orchestrator();
        assert!(orch.route(&rate(1.0, 500.0)).is_err());
        let stats = orch.stats();
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.per_family[&SignalType::Cardiac].errors, 1);
    }

    #[tokio::test]
    async fn accepted_record_announces_itself_and_new_anomalies() -> Result<(), Box<dyn std::error::Error>> {
        let (orch, bus) = orchestrator();
        let mut records = bus.subscribe_to(Lane::Records);
        let mut anomalies = bus.subscribe_to(Lane::Anomalies);

        let Routed::Accepted(opened) = orch.route(&rate(1.0, 150.0))? else {
            return Err("expected accepted".into());
        };
        assert_eq!(opened.len(), 1);

        let NotificationPayload::RecordProcessed(processed) = records.recv().await?.payload else {
            return Err("expected record".into());
        };
        assert_eq!(processed.open_anomalies.len(), 1);
        let NotificationPayload::AnomalyOpened(anomaly) = anomalies.recv().await?.payload else {
            return Err("expected anomaly".into());
        };
        assert_eq!(anomaly.anomaly_type, AnomalyKind::SevereTachycardia);
        assert_eq!(orch.stats().per_family[&SignalType::Cardiac].processed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_broadcast_keeps_history() -> Result<(), Box<dyn std::error::Error>> {
        let (orch, bus) = orchestrator();
        let mut all = bus.subscribe_to(Lane::Records);
        orch.disable_signal("cardiac/ppi")?;

        orch.route(&rate(1.0, 72.0))?;
        assert_eq!(orch.with_signal(SignalType::Cardiac, |s| s.history().len()), Some(1));
        assert!(
            tokio::time::timeout(Duration::from_millis(50), all.recv()).await.is_err(),
            "nothing should be published"
        );

        orch.enable_signal("cardiac/ppi")?;
        orch.route(&rate(2.0, 73.0))?;
        assert!(all.recv().await.is_ok());
        Ok(())
    }

    #[test]
    fn health_tiers() -> Result<(), Box<dyn std::error::Error>> {
        let (orch, _) = orchestrator();
        assert_eq!(orch.system_health().status, HealthStatus::Critical);

        orch.route(&rate(1.0, 72.0))?;
        let report = orch.system_health();
        assert_eq!(report.status, HealthStatus::Warning);
        assert!(report.warnings.iter().any(|w| w.contains("1 of 5")));
        Ok(())
    }

    #[test]
    fn many_open_anomalies_warn() -> Result<(), Box<dyn std::error::Error>> {
        let (orch, _) = orchestrator();
        // Severe tachycardia, then a dangerous level: two open so far.
        orch.route(&rate(1.0, 160.0))?;
        orch.route(&level(1.0, 0.9))?;
        let open: usize = orch.open_anomalies().values().map(Vec::len).sum();
        assert_eq!(open, 2);
        assert!(!orch.system_health().warnings.iter().any(|w| w.contains("open anomalies")));
        Ok(())
    }

    #[test]
    fn control_surface() {
        let (orch, _) = orchestrator();
        assert_eq!(orch.component_state().status, ComponentStatus::Idle);
        assert!(orch.disable_signal("lidar").is_err());
        assert_eq!(orch.signal_state("eeg/raw"), SignalState::Active);
    }
}
