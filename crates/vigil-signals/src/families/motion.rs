//! Inertial rules: accelerometer, gyroscope and their combination.
//!
//! Combined rules run on the acceleration pass and read the latest rotation
//! point, so their anomalies are owned by [`DataType::Acceleration`].

use serde::{Deserialize, Serialize};
use vigil_types::{AnomalyKind, AxisSamples, DataType, Finding, NormalizedRecord, Payload, Severity, SignalType};

use super::{Detector, Window, mismatch};
use crate::error::{ValidationError, check_all};
use crate::stats::std_dev;

/// m/s² per axis
const ACC_LEGAL: f64 = 200.0;
/// °/s per axis
const GYRO_LEGAL: f64 = 2500.0;

/// Accelerations in m/s², rotations in °/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionThresholds {
    pub gravity: f64,
    pub sudden_movement: f64,
    pub impact: f64,
    pub vibration_std: f64,
    pub rapid_rotation: f64,
    pub violent_rotation: f64,
    pub rotation_std: f64,
    pub hard_braking: f64,
    /// Rotation must stay below this for a deceleration to count as braking.
    pub braking_max_rotation: f64,
    /// Gravity component on the forward (x) axis for the mounting pose.
    pub forward_gravity: f64,
}

impl Default for MotionThresholds {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            sudden_movement: 5.0,
            impact: 30.0,
            vibration_std: 3.0,
            rapid_rotation: 180.0,
            violent_rotation: 500.0,
            rotation_std: 50.0,
            hard_braking: -7.0,
            braking_max_rotation: 30.0,
            forward_gravity: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MotionDetector {
    pub thresholds: MotionThresholds,
}

fn axes(payload: &Payload) -> Option<&AxisSamples> {
    match payload {
        Payload::Axes(a) => Some(a),
        _ => None,
    }
}

fn peak(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

impl MotionDetector {
    pub fn new(thresholds: MotionThresholds) -> Self {
        Self { thresholds }
    }

    fn acceleration_findings(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();
        let Some(latest) = window.latest().and_then(|p| axes(&p.value)) else {
            return findings;
        };

        let deviation = latest
            .magnitude
            .iter()
            .map(|m| (m - t.gravity).abs())
            .fold(0.0, f64::max);
        if deviation > t.sudden_movement {
            findings.push(Finding::new(
                AnomalyKind::SuddenMovement,
                Severity::Warning,
                "Sudden movement",
                deviation,
                t.sudden_movement,
            ));
        }

        let max_magnitude = peak(&latest.magnitude);
        if max_magnitude > t.impact {
            findings.push(Finding::new(AnomalyKind::Impact, Severity::Critical, "Impact detected", max_magnitude, t.impact));
        }

        let magnitudes: Vec<f64> = window
            .points
            .iter()
            .filter_map(|p| axes(&p.value))
            .flat_map(|a| a.magnitude.iter().copied())
            .collect();
        let vibration = std_dev(&magnitudes);
        if vibration > t.vibration_std {
            findings.push(Finding::new(AnomalyKind::Vibration, Severity::Info, "Vibration", vibration, t.vibration_std));
        }

        let rotation = window
            .latest_of(DataType::Rotation)
            .and_then(|p| axes(&p.value))
            .map(|r| peak(&r.magnitude));

        if let Some(rotation) = rotation
            && deviation > t.sudden_movement
            && rotation > t.rapid_rotation
        {
            findings.push(Finding::new(
                AnomalyKind::LossOfControl,
                Severity::Critical,
                "Possible loss of control",
                rotation,
                t.rapid_rotation,
            ));
        }

        let forward = latest
            .x
            .iter()
            .map(|x| x - t.forward_gravity)
            .fold(f64::INFINITY, f64::min);
        if forward < t.hard_braking && rotation.unwrap_or(0.0) < t.braking_max_rotation {
            findings.push(Finding::new(AnomalyKind::HardBraking, Severity::Warning, "Hard braking", forward, t.hard_braking));
        }
        findings
    }

    fn rotation_findings(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();
        let Some(latest) = window.latest().and_then(|p| axes(&p.value)) else {
            return findings;
        };

        let rate = peak(&latest.magnitude);
        if rate > t.violent_rotation {
            findings.push(Finding::new(
                AnomalyKind::ViolentRotation,
                Severity::Critical,
                "Violent rotation",
                rate,
                t.violent_rotation,
            ));
        } else if rate > t.rapid_rotation {
            findings.push(Finding::new(AnomalyKind::RapidRotation, Severity::Warning, "Rapid rotation", rate, t.rapid_rotation));
        }

        let magnitudes: Vec<f64> = window
            .points
            .iter()
            .filter_map(|p| axes(&p.value))
            .flat_map(|a| a.magnitude.iter().copied())
            .collect();
        let spread = std_dev(&magnitudes);
        if spread > t.rotation_std {
            findings.push(Finding::new(
                AnomalyKind::RotationalVibration,
                Severity::Info,
                "Rotational vibration",
                spread,
                t.rotation_std,
            ));
        }
        findings
    }
}

impl Detector for MotionDetector {
    fn family(&self) -> SignalType {
        SignalType::Motion
    }

    fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        let limit = match record.data_type {
            DataType::Acceleration => ACC_LEGAL,
            DataType::Rotation => GYRO_LEGAL,
            _ => return Err(mismatch(record)),
        };
        let Payload::Axes(a) = &record.payload else {
            return Err(mismatch(record));
        };
        if a.magnitude.is_empty() {
            return Err(ValidationError::Empty("motion samples"));
        }
        check_all("x", &a.x, -limit, limit)?;
        check_all("y", &a.y, -limit, limit)?;
        check_all("z", &a.z, -limit, limit)
    }

    fn detect(&self, window: &Window<'_>) -> Vec<Finding> {
        match window.data_type {
            DataType::Acceleration => self.acceleration_findings(window),
            DataType::Rotation => self.rotation_findings(window),
            _ => Vec::new(),
        }
    }
}
