//! [`Signal`] – one family's history, detector and open anomalies.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;
use vigil_types::{AnomalyRecord, DataType, NormalizedRecord, SignalPoint, SignalType, VigilError};

use crate::buffer::CircularBuffer;
use crate::error::ValidationError;
use crate::families::{
    CameraDetector, CameraThresholds, CardiacDetector, CardiacThresholds, Detector, EegDetector,
    EegThresholds, MotionDetector, MotionThresholds, VehicleDetector, VehicleThresholds, Window,
};
use crate::tracker::{AnomalyTracker, DEFAULT_MAX_OPEN};

/// `[signals]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub buffer_capacity: usize,
    /// Points of the same data type a detection pass looks at.
    pub window: usize,
    pub max_open_anomalies: usize,
    pub cardiac: CardiacThresholds,
    pub eeg: EegThresholds,
    pub motion: MotionThresholds,
    pub camera: CameraThresholds,
    pub vehicle: VehicleThresholds,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            window: 20,
            max_open_anomalies: DEFAULT_MAX_OPEN,
            cardiac: CardiacThresholds::default(),
            eeg: EegThresholds::default(),
            motion: MotionThresholds::default(),
            camera: CameraThresholds::default(),
            vehicle: VehicleThresholds::default(),
        }
    }
}

impl SignalsConfig {
    /// Detector for `family`, `None` for system traffic.
    pub fn detector(&self, family: SignalType) -> Option<Box<dyn Detector>> {
        let detector: Box<dyn Detector> = match family {
            SignalType::Cardiac => Box::new(CardiacDetector::new(self.cardiac.clone())),
            SignalType::Eeg => Box::new(EegDetector::new(self.eeg.clone())),
            SignalType::Motion => Box::new(MotionDetector::new(self.motion.clone())),
            SignalType::Camera => Box::new(CameraDetector::new(self.camera.clone())),
            SignalType::Vehicle => Box::new(VehicleDetector::new(self.vehicle.clone())),
            SignalType::System => return None,
        };
        Some(detector)
    }
}

/// History and anomaly state of one signal family.
///
/// ```
/// use vigil_signals::{Signal, SignalsConfig};
/// use vigil_types::{AnomalyKind, DataType, NormalizedRecord, Payload, SignalType};
///
/// let mut cardiac = Signal::for_family(SignalType::Cardiac, &SignalsConfig::default()).unwrap();
/// let record = NormalizedRecord {
///     signal_type: SignalType::Cardiac,
///     data_type: DataType::Rate,
///     timestamp: 1.0,
///     source: "cardiac/ppi".into(),
///     payload: Payload::Scalar(150.0),
///     quality: 1.0,
/// };
/// let opened = cardiac.accept(&record).unwrap();
/// assert_eq!(opened[0].kind, AnomalyKind::SevereTachycardia);
/// ```
pub struct Signal {
    family: SignalType,
    detector: Box<dyn Detector>,
    buffer: CircularBuffer<SignalPoint>,
    anomalies: AnomalyTracker,
    window: usize,
    last_update: Option<Instant>,
    last_timestamp: Option<f64>,
    accepted: u64,
    rejected: u64,
}

impl Signal {
    pub fn new(detector: Box<dyn Detector>, config: &SignalsConfig) -> Self {
        Self {
            family: detector.family(),
            detector,
            buffer: CircularBuffer::new(config.buffer_capacity),
            anomalies: AnomalyTracker::new(config.max_open_anomalies),
            window: config.window.max(1),
            last_update: None,
            last_timestamp: None,
            accepted: 0,
            rejected: 0,
        }
    }

    pub fn for_family(family: SignalType, config: &SignalsConfig) -> Option<Self> {
        config.detector(family).map(|d| Self::new(d, config))
    }

    pub fn family(&self) -> SignalType {
        self.family
    }

    /// Validate, store and evaluate `record`.
    ///
    /// Returns the anomalies this pass opened.  A rejected record leaves the
    /// history and the open anomalies untouched.
    pub fn accept(&mut self, record: &NormalizedRecord) -> Result<Vec<AnomalyRecord>, VigilError> {
        if let Err(e) = self.check(record) {
            self.rejected += 1;
            return Err(e.into_vigil(self.family));
        }

        self.buffer.push(SignalPoint::from_record(record, record.quality));
        self.last_update = Some(Instant::now());
        self.last_timestamp = Some(record.timestamp);
        self.accepted += 1;

        let window = Window::collect(&self.buffer, record.data_type, self.window);
        let findings = self.detector.detect(&window);
        let opened = self
            .anomalies
            .reconcile(record.data_type, &findings, record.timestamp);
        if !opened.is_empty() {
            debug!(family = %self.family, opened = opened.len(), "anomalies opened");
        }
        Ok(opened)
    }

    fn check(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        if record.signal_type != self.family {
            return Err(ValidationError::WrongFamily {
                family: self.family,
                found: record.signal_type,
            });
        }
        self.detector.validate(record)
    }

    pub fn history(&self) -> &CircularBuffer<SignalPoint> {
        &self.buffer
    }

    /// Latest point of `data_type`.
    pub fn latest(&self, data_type: DataType) -> Option<&SignalPoint> {
        self.buffer.iter().rev().find(|p| p.data_type == data_type)
    }

    pub fn open_anomalies(&self) -> Vec<AnomalyRecord> {
        self.anomalies.open()
    }

    pub fn open_anomaly_count(&self) -> usize {
        self.anomalies.len()
    }

    /// Whether at least one record has been accepted.
    pub fn is_active(&self) -> bool {
        self.last_update.is_some()
    }

    /// Time since the last accepted record.
    pub fn idle_for(&self) -> Option<Duration> {
        self.last_update.map(|t| t.elapsed())
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}
