//! Signal families, data types and the normalized record shape shared by
//! every pipeline stage.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of telemetry a record belongs to.
///
/// Every non-system family owns exactly one signal buffer in the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Cardiac,
    Eeg,
    Motion,
    Camera,
    Vehicle,
    /// Low-structure control traffic (control, timestamp, config topics).
    System,
}

impl SignalType {
    /// The five families that carry a signal buffer.
    pub const FAMILIES: [SignalType; 5] = [
        SignalType::Cardiac,
        SignalType::Eeg,
        SignalType::Motion,
        SignalType::Camera,
        SignalType::Vehicle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::Cardiac => "cardiac",
            SignalType::Eeg => "eeg",
            SignalType::Motion => "motion",
            SignalType::Camera => "camera",
            SignalType::Vehicle => "vehicle",
            SignalType::System => "system",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of the data carried by a record within its family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    Rate,
    Waveform,
    Acceleration,
    Rotation,
    Raw,
    Bands,
    FaceLandmarks,
    Level,
    CarInfo,
    Control,
    Timestamp,
    Config,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Rate => "rate",
            DataType::Waveform => "waveform",
            DataType::Acceleration => "acceleration",
            DataType::Rotation => "rotation",
            DataType::Raw => "raw",
            DataType::Bands => "bands",
            DataType::FaceLandmarks => "faceLandmarks",
            DataType::Level => "level",
            DataType::CarInfo => "carInfo",
            DataType::Control => "control",
            DataType::Timestamp => "timestamp",
            DataType::Config => "config",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Payload shapes
// ────────────────────────────────────────────────────────────────────────────

/// A single-channel sampled waveform with one timestamp per sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Waveform {
    pub samples: Vec<f64>,
    /// Seconds, `chunk_ts + i / sampling_rate`.
    pub timestamps: Vec<f64>,
}

/// Three-axis inertial samples in physical units plus the per-sample norm.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisSamples {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
    pub magnitude: Vec<f64>,
    pub timestamps: Vec<f64>,
}

/// Multi-channel waveform keyed by channel label.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelSamples {
    pub channels: BTreeMap<String, Vec<f64>>,
    pub timestamps: Vec<f64>,
}

/// One camera frame worth of face tracking output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FaceFrame {
    pub landmarks: Vec<[f64; 3]>,
    pub gaze: [f64; 3],
    pub eye_aspect_ratio: f64,
    /// Blinks per minute.
    pub blink_rate: f64,
    pub confidence: f64,
}

/// Decoded value of a record. The variant follows from the record's
/// [`DataType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Scalar(f64),
    Waveform(Waveform),
    Axes(AxisSamples),
    Channels(ChannelSamples),
    /// Band name → fractional power.
    Bands(BTreeMap<String, f64>),
    Face(FaceFrame),
    /// Named scalar fields (e.g. vehicle car info).
    Fields(BTreeMap<String, f64>),
    /// Free-form content of permissive system topics.
    Document(serde_json::Value),
}

impl Payload {
    /// The value of a [`Payload::Scalar`], `None` for every other shape.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Payload::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// Look up a named value in a [`Payload::Fields`] or [`Payload::Bands`]
    /// map.
    pub fn field(&self, name: &str) -> Option<f64> {
        match self {
            Payload::Fields(map) | Payload::Bands(map) => map.get(name).copied(),
            _ => None,
        }
    }

    /// Number of samples carried (1 for non-sampled payloads).
    pub fn sample_count(&self) -> usize {
        match self {
            Payload::Waveform(w) => w.samples.len(),
            Payload::Axes(a) => a.magnitude.len(),
            Payload::Channels(c) => c.timestamps.len(),
            _ => 1,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Records
// ────────────────────────────────────────────────────────────────────────────

/// Output of the topic decoder; input of the orchestrator. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub signal_type: SignalType,
    pub data_type: DataType,
    /// Seconds since the Unix epoch as published.
    pub timestamp: f64,
    /// Topic the record arrived on.
    pub source: String,
    pub payload: Payload,
    /// Publisher-side quality hint in `[0, 1]`.
    pub quality: f64,
}

/// A record accepted into a signal buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPoint {
    pub timestamp: f64,
    pub data_type: DataType,
    pub value: Payload,
    pub quality: f64,
    pub metadata: BTreeMap<String, String>,
}

impl SignalPoint {
    /// Build a point from an accepted record, clamping quality into `[0, 1]`.
    pub fn from_record(record: &NormalizedRecord, quality: f64) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), record.source.clone());
        Self {
            timestamp: record.timestamp,
            data_type: record.data_type,
            value: record.payload.clone(),
            quality: if quality.is_finite() { quality.clamp(0.0, 1.0) } else { 0.0 },
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let json = serde_json::to_string(&Payload::Scalar(75.0)).unwrap();
        assert_eq!(json, r#"{"kind":"scalar","data":75.0}"#);
    }

    #[test]
    fn field_lookup_covers_fields_and_bands() {
        let mut map = BTreeMap::new();
        map.insert("speed".to_string(), 88.0);
        assert_eq!(Payload::Fields(map.clone()).field("speed"), Some(88.0));
        assert_eq!(Payload::Bands(map).field("speed"), Some(88.0));
        assert_eq!(Payload::Scalar(1.0).field("speed"), None);
    }

    #[test]
    fn signal_point_clamps_quality() {
        let record = NormalizedRecord {
            signal_type: SignalType::Cardiac,
            data_type: DataType::Rate,
            timestamp: 10.0,
            source: "cardiac/ppi".into(),
            payload: Payload::Scalar(70.0),
            quality: 1.0,
        };
        assert_eq!(SignalPoint::from_record(&record, 1.7).quality, 1.0);
        assert_eq!(SignalPoint::from_record(&record, f64::NAN).quality, 0.0);
        assert_eq!(
            SignalPoint::from_record(&record, 0.5).metadata.get("source").map(String::as_str),
            Some("cardiac/ppi")
        );
    }

    #[test]
    fn data_type_names_are_camel_case() {
        let json = serde_json::to_string(&DataType::FaceLandmarks).unwrap();
        assert_eq!(json, r#""faceLandmarks""#);
        assert_eq!(DataType::CarInfo.as_str(), "carInfo");
    }
}
