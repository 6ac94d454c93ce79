//! Anomaly vocabulary: every detection rule returns an explicit
//! `(kind, severity)` pair instead of free text that has to be parsed later.

use serde::{Deserialize, Serialize};

use crate::signal::DataType;

/// How urgently an anomaly needs attention. Ordered `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Identifier of the rule that produced an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    // Cardiac
    Bradycardia,
    SevereBradycardia,
    Tachycardia,
    SevereTachycardia,
    HeartRateVariability,
    SuddenHeartRateChange,
    ExcessiveEcgAmplitude,
    EcgBaselineDrift,
    // EEG
    ChannelSaturation,
    FlatChannel,
    ExcessiveEegAmplitude,
    EegBaselineDrift,
    ChannelVariabilityOutlier,
    BandOutOfRange,
    ExcessDelta,
    ExcessTheta,
    AlphaDeficit,
    SuddenBandChange,
    // Motion
    SuddenMovement,
    Impact,
    Vibration,
    RapidRotation,
    ViolentRotation,
    RotationalVibration,
    LossOfControl,
    HardBraking,
    // Camera
    EyesClosed,
    ProlongedEyeClosure,
    ElevatedBlinkRate,
    GazeOffRoad,
    LowTrackingConfidence,
    // Vehicle
    LevelAboveLegalLimit,
    DangerousLevel,
    Speeding,
    ExcessiveSpeeding,
    DangerousSpeeding,
    LaneDepartureDanger,
    PoorLaneKeeping,
    ImpairedDriving,
}

/// One rule match produced by a detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// Stable, human-readable text. Used as the de-duplication key.
    pub message: String,
    /// Observed value that tripped the rule.
    pub value: f64,
    /// Threshold the value was compared against.
    pub threshold: f64,
}

impl Finding {
    pub fn new(
        kind: AnomalyKind,
        severity: Severity,
        message: impl Into<String>,
        value: f64,
        threshold: f64,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            value,
            threshold,
        }
    }
}

/// An anomaly that is currently open on a signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub message: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// Data type whose detection pass owns this anomaly.
    pub data_type: DataType,
    pub value: f64,
    pub threshold: f64,
    /// Timestamp of the record that opened it.
    pub opened_at: f64,
}

impl AnomalyRecord {
    pub fn open(finding: &Finding, data_type: DataType, opened_at: f64) -> Self {
        Self {
            message: finding.message.clone(),
            kind: finding.kind,
            severity: finding.severity,
            data_type,
            value: finding.value,
            threshold: finding.threshold,
            opened_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&AnomalyKind::SevereTachycardia).unwrap();
        assert_eq!(json, r#""severe_tachycardia""#);
    }

    #[test]
    fn record_copies_finding() {
        let finding = Finding::new(
            AnomalyKind::ExcessDelta,
            Severity::Warning,
            "Excess delta activity",
            0.8,
            0.7,
        );
        let record = AnomalyRecord::open(&finding, DataType::Bands, 12.5);
        assert_eq!(record.message, "Excess delta activity");
        assert_eq!(record.data_type, DataType::Bands);
        assert_eq!(record.opened_at, 12.5);
    }
}
