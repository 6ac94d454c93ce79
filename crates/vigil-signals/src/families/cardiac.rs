//! Cardiac rules: heart rate from PPI and the ECG waveform.

use serde::{Deserialize, Serialize};
use vigil_types::{AnomalyKind, DataType, Finding, NormalizedRecord, Payload, Severity, SignalType};

use super::{Detector, Window, mismatch};
use crate::error::{ValidationError, check_all, check_range};
use crate::stats::{mean, spread};

const RATE_LEGAL: (f64, f64) = (20.0, 250.0);
/// mV
const ECG_LEGAL: (f64, f64) = (-50.0, 50.0);

/// Heart-rate thresholds in bpm, ECG thresholds in mV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardiacThresholds {
    pub bradycardia: f64,
    pub severe_bradycardia: f64,
    pub tachycardia: f64,
    pub severe_tachycardia: f64,
    /// Spread of the last `variability_points` rates.
    pub variability: f64,
    pub variability_points: usize,
    pub sudden_change: f64,
    pub ecg_amplitude: f64,
    pub ecg_drift: f64,
    /// How many points back the drift comparison looks.
    pub drift_lag: usize,
}

impl Default for CardiacThresholds {
    fn default() -> Self {
        Self {
            bradycardia: 60.0,
            severe_bradycardia: 40.0,
            tachycardia: 100.0,
            severe_tachycardia: 150.0,
            variability: 30.0,
            variability_points: 5,
            sudden_change: 25.0,
            ecg_amplitude: 5.0,
            ecg_drift: 0.5,
            drift_lag: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CardiacDetector {
    pub thresholds: CardiacThresholds,
}

impl CardiacDetector {
    pub fn new(thresholds: CardiacThresholds) -> Self {
        Self { thresholds }
    }

    fn rate_findings(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let rates: Vec<f64> = window.points.iter().filter_map(|p| p.value.as_scalar()).collect();
        let Some(&rate) = rates.last() else {
            return Vec::new();
        };
        let mut findings = Vec::new();

        if rate < t.severe_bradycardia {
            findings.push(Finding::new(
                AnomalyKind::SevereBradycardia,
                Severity::Critical,
                "Severe bradycardia",
                rate,
                t.severe_bradycardia,
            ));
        } else if rate < t.bradycardia {
            findings.push(Finding::new(AnomalyKind::Bradycardia, Severity::Warning, "Bradycardia", rate, t.bradycardia));
        }

        if rate >= t.severe_tachycardia {
            findings.push(Finding::new(
                AnomalyKind::SevereTachycardia,
                Severity::Critical,
                "Severe tachycardia",
                rate,
                t.severe_tachycardia,
            ));
        } else if rate > t.tachycardia {
            findings.push(Finding::new(AnomalyKind::Tachycardia, Severity::Warning, "Tachycardia", rate, t.tachycardia));
        }

        if rates.len() >= t.variability_points {
            let recent = &rates[rates.len() - t.variability_points..];
            let swing = spread(recent);
            if swing > t.variability {
                findings.push(Finding::new(
                    AnomalyKind::HeartRateVariability,
                    Severity::Warning,
                    "High heart rate variability",
                    swing,
                    t.variability,
                ));
            }
        }

        if let [.., previous, current] = rates.as_slice() {
            let jump = (current - previous).abs();
            if jump > t.sudden_change {
                findings.push(Finding::new(
                    AnomalyKind::SuddenHeartRateChange,
                    Severity::Warning,
                    "Sudden heart rate change",
                    jump,
                    t.sudden_change,
                ));
            }
        }
        findings
    }

    fn ecg_findings(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();
        let Some(Payload::Waveform(latest)) = window.latest().map(|p| &p.value) else {
            return findings;
        };

        let amplitude = spread(&latest.samples);
        if amplitude > t.ecg_amplitude {
            findings.push(Finding::new(
                AnomalyKind::ExcessiveEcgAmplitude,
                Severity::Warning,
                "Excessive ECG amplitude",
                amplitude,
                t.ecg_amplitude,
            ));
        }

        if let Some(Payload::Waveform(earlier)) = window.back(t.drift_lag).map(|p| &p.value) {
            let drift = (mean(&latest.samples) - mean(&earlier.samples)).abs();
            if drift > t.ecg_drift {
                findings.push(Finding::new(
                    AnomalyKind::EcgBaselineDrift,
                    Severity::Warning,
                    "ECG baseline drift",
                    drift,
                    t.ecg_drift,
                ));
            }
        }
        findings
    }
}

impl Detector for CardiacDetector {
    fn family(&self) -> SignalType {
        SignalType::Cardiac
    }

    fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        match (record.data_type, &record.payload) {
            (DataType::Rate, Payload::Scalar(rate)) => check_range("rate", *rate, RATE_LEGAL.0, RATE_LEGAL.1),
            (DataType::Waveform, Payload::Waveform(w)) => {
                if w.samples.is_empty() {
                    return Err(ValidationError::Empty("ecg waveform"));
                }
                check_all("ecg", &w.samples, ECG_LEGAL.0, ECG_LEGAL.1)
            }
            _ => Err(mismatch(record)),
        }
    }

    fn detect(&self, window: &Window<'_>) -> Vec<Finding> {
        match window.data_type {
            DataType::Rate => self.rate_findings(window),
            DataType::Waveform => self.ecg_findings(window),
            _ => Vec::new(),
        }
    }
}
