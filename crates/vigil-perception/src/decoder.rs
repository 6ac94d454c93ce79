//! [`TopicDecoder`] – turns `(topic, bytes)` into a [`NormalizedRecord`].
//!
//! Decoding is a pure function of the bytes, the static per-topic
//! [`TopicSpec`] table and the decoder's own signal switchboard:
//!
//! | Topic | Labels | Payload |
//! |---|---|---|
//! | `cardiac/ppi` | `ppi` (+ `error_estimate`, `skin_contact`) | `Scalar` bpm of the last row |
//! | `cardiac/ecg` | `ecg` | `Waveform` in mV |
//! | `eeg/raw` | configured channels | `Channels` in µV |
//! | `eeg/bands` | `delta theta alpha beta gamma` | `Bands` |
//! | `motion/acc`, `motion/gyro` | `x y z` | `Axes` |
//! | `camera/face` | `landmarks gaze_* ear blink_rate confidence` | `Face` |
//! | `vehicle/level` | `level` | `Scalar` ‰ |
//! | `vehicle/car` | `speed lane_centrality steering_angle` (+ `speed_limit`) | `Fields` |
//! | `system/*` | anything | `Document` |

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use vigil_types::{
    AxisSamples, ChannelSamples, ComponentState, ComponentStatus, DecodeError, FaceFrame,
    NormalizedRecord, Payload, SignalControl, SignalState, SignalSwitchboard, VigilError, Waveform,
};

use crate::convert::{AdcConversion, magnitude, ppi_to_rate, sample_timestamps};
use crate::topic::Topic;
use crate::wire::{RawRecord, decode_record};

pub const COMPONENT_NAME: &str = "decoder";

/// Point quality assigned to PPI rows reported without skin contact.
const NO_CONTACT_QUALITY: f64 = 0.3;

pub const BAND_LABELS: [&str; 5] = ["delta", "theta", "alpha", "beta", "gamma"];

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Conversion constants for a single-axis or multi-channel ADC stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformConversion {
    pub sampling_rate: f64,
    pub baseline: f64,
    pub factor: f64,
    pub code_min: f64,
    pub code_max: f64,
}

impl WaveformConversion {
    pub fn adc(&self) -> AdcConversion {
        AdcConversion {
            baseline: self.baseline,
            factor: self.factor,
        }
    }
}

/// Conversion constants for a three-axis inertial stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisConversion {
    pub sampling_rate: f64,
    /// Per-axis zero code, `[x, y, z]`.
    pub baseline: [f64; 3],
    pub factor: f64,
    pub code_min: f64,
    pub code_max: f64,
}

impl AxisConversion {
    fn axis(&self, i: usize) -> AdcConversion {
        AdcConversion {
            baseline: self.baseline[i],
            factor: self.factor,
        }
    }
}

/// `[decoder]` section of the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub ppi_min_ms: f64,
    pub ppi_max_ms: f64,
    /// ECG codes are µV; converted to mV.
    pub ecg: WaveformConversion,
    pub eeg_channels: Vec<String>,
    pub eeg: WaveformConversion,
    /// Accelerometer codes converted to m/s².
    pub acc: AxisConversion,
    /// Gyroscope codes converted to °/s.
    pub gyro: AxisConversion,
    pub band_sum_tolerance: f64,
    pub face_points: usize,
    pub level_max: f64,
    pub speed_max: f64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ppi_min_ms: 300.0,
            ppi_max_ms: 2000.0,
            ecg: WaveformConversion {
                sampling_rate: 130.0,
                baseline: 0.0,
                factor: 0.001,
                code_min: -32768.0,
                code_max: 32767.0,
            },
            eeg_channels: ["TP9", "AF7", "AF8", "TP10"].map(String::from).to_vec(),
            eeg: WaveformConversion {
                sampling_rate: 256.0,
                baseline: 2048.0,
                factor: 1000.0 / 2048.0,
                code_min: 0.0,
                code_max: 4095.0,
            },
            acc: AxisConversion {
                sampling_rate: 52.0,
                baseline: [0.0; 3],
                factor: 9.80665 / 4096.0,
                code_min: -32768.0,
                code_max: 32767.0,
            },
            gyro: AxisConversion {
                sampling_rate: 52.0,
                baseline: [0.0; 3],
                factor: 2000.0 / 32768.0,
                code_min: -32768.0,
                code_max: 32767.0,
            },
            band_sum_tolerance: 0.1,
            face_points: 68,
            level_max: 5.0,
            speed_max: 300.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TopicSpec
// ────────────────────────────────────────────────────────────────────────────

/// Static schema of one topic.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSpec {
    pub topic: Topic,
    pub required: Vec<String>,
    pub optional: Vec<String>,
    /// Legal range per label, checked on every row.
    pub ranges: BTreeMap<String, (f64, f64)>,
    /// Any labels, rows may be empty.
    pub permissive: bool,
}

impl TopicSpec {
    fn new(topic: Topic, required: &[&str]) -> Self {
        Self {
            topic,
            required: required.iter().map(|s| s.to_string()).collect(),
            optional: Vec::new(),
            ranges: BTreeMap::new(),
            permissive: false,
        }
    }

    fn optional(mut self, labels: &[&str]) -> Self {
        self.optional = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    fn range(mut self, label: &str, min: f64, max: f64) -> Self {
        self.ranges.insert(label.to_string(), (min, max));
        self
    }

    fn permissive(topic: Topic) -> Self {
        Self {
            permissive: true,
            ..Self::new(topic, &[])
        }
    }

    /// Build the spec table for every catalog topic.
    pub fn catalog(config: &DecoderConfig) -> BTreeMap<Topic, TopicSpec> {
        let channels: Vec<&str> = config.eeg_channels.iter().map(String::as_str).collect();
        let mut eeg_raw = TopicSpec::new(Topic::EegRaw, &channels);
        for ch in &channels {
            eeg_raw = eeg_raw.range(ch, config.eeg.code_min, config.eeg.code_max);
        }
        let mut bands = TopicSpec::new(Topic::EegBands, &BAND_LABELS);
        for band in BAND_LABELS {
            bands = bands.range(band, 0.0, 1.0);
        }
        let axes = |topic, conv: &AxisConversion| {
            TopicSpec::new(topic, &["x", "y", "z"])
                .range("x", conv.code_min, conv.code_max)
                .range("y", conv.code_min, conv.code_max)
                .range("z", conv.code_min, conv.code_max)
        };

        [
            TopicSpec::new(Topic::CardiacPpi, &["ppi"])
                .optional(&["error_estimate", "skin_contact"])
                .range("ppi", config.ppi_min_ms, config.ppi_max_ms)
                .range("error_estimate", 0.0, f64::MAX)
                .range("skin_contact", 0.0, 1.0),
            TopicSpec::new(Topic::CardiacEcg, &["ecg"]).range(
                "ecg",
                config.ecg.code_min,
                config.ecg.code_max,
            ),
            eeg_raw,
            bands,
            axes(Topic::MotionAcc, &config.acc),
            axes(Topic::MotionGyro, &config.gyro),
            TopicSpec::new(
                Topic::CameraFace,
                &["landmarks", "gaze_x", "gaze_y", "gaze_z", "ear", "blink_rate", "confidence"],
            )
            .range("gaze_x", -1.0, 1.0)
            .range("gaze_y", -1.0, 1.0)
            .range("gaze_z", -1.0, 1.0)
            .range("ear", 0.0, 1.0)
            .range("blink_rate", 0.0, 200.0)
            .range("confidence", 0.0, 1.0),
            TopicSpec::new(Topic::VehicleLevel, &["level"]).range("level", 0.0, config.level_max),
            TopicSpec::new(Topic::VehicleCar, &["speed", "lane_centrality", "steering_angle"])
                .optional(&["speed_limit"])
                .range("speed", 0.0, config.speed_max)
                .range("lane_centrality", 0.0, 1.0)
                .range("steering_angle", -720.0, 720.0)
                .range("speed_limit", 0.0, config.speed_max),
            TopicSpec::permissive(Topic::SystemControl),
            TopicSpec::permissive(Topic::SystemTimestamp),
            TopicSpec::permissive(Topic::SystemConfig),
        ]
        .into_iter()
        .map(|spec| (spec.topic, spec))
        .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validated table view
// ────────────────────────────────────────────────────────────────────────────

/// A raw record whose labels and row shapes have been checked.
struct Table<'a> {
    topic: &'a str,
    raw: &'a RawRecord,
    spec: &'a TopicSpec,
}

impl<'a> Table<'a> {
    fn check(topic: &'a str, raw: &'a RawRecord, spec: &'a TopicSpec) -> Result<Self, DecodeError> {
        let labels: BTreeSet<&str> = raw.labels.iter().map(String::as_str).collect();
        if labels.len() != raw.labels.len() {
            return Err(DecodeError::schema(topic, "duplicate labels"));
        }
        let missing: Vec<&str> = spec
            .required
            .iter()
            .map(String::as_str)
            .filter(|l| !labels.contains(l))
            .collect();
        if !missing.is_empty() {
            return Err(DecodeError::schema(topic, format!("missing labels {missing:?}")));
        }
        let unexpected: Vec<&str> = labels
            .iter()
            .copied()
            .filter(|l| !spec.required.iter().chain(&spec.optional).any(|k| k.as_str() == *l))
            .collect();
        if !unexpected.is_empty() {
            return Err(DecodeError::schema(topic, format!("unexpected labels {unexpected:?}")));
        }
        if raw.data.is_empty() {
            return Err(DecodeError::schema(topic, "empty data"));
        }
        if let Some((i, row)) = raw
            .data
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != raw.labels.len())
        {
            return Err(DecodeError::schema(
                topic,
                format!("row {i} has {} columns, expected {}", row.len(), raw.labels.len()),
            ));
        }
        Ok(Self { topic, raw, spec })
    }

    fn rows(&self) -> usize {
        self.raw.data.len()
    }

    /// Numeric column, range-checked when the spec declares a range.
    fn column(&self, label: &str) -> Result<Vec<f64>, DecodeError> {
        let idx = self
            .raw
            .column_index(label)
            .ok_or_else(|| DecodeError::schema(self.topic, format!("missing label '{label}'")))?;
        let range = self.spec.ranges.get(label);
        self.raw
            .data
            .iter()
            .enumerate()
            .map(|(row, cells)| {
                let value = cells[idx].as_f64().ok_or_else(|| {
                    DecodeError::schema(self.topic, format!("non-numeric '{label}' in row {row}"))
                })?;
                if let Some(&(min, max)) = range
                    && !(min..=max).contains(&value)
                {
                    return Err(DecodeError::ValueOutOfRange {
                        topic: self.topic.to_string(),
                        field: label.to_string(),
                        value,
                        min,
                        max,
                    });
                }
                Ok(value)
            })
            .collect()
    }

    fn optional_column(&self, label: &str) -> Result<Option<Vec<f64>>, DecodeError> {
        match self.raw.column_index(label) {
            Some(_) => self.column(label).map(Some),
            None => Ok(None),
        }
    }

    /// Last value of a numeric column.
    fn last(&self, label: &str) -> Result<f64, DecodeError> {
        self.column(label)?
            .pop()
            .ok_or_else(|| DecodeError::schema(self.topic, "empty data"))
    }

    fn last_cell(&self, label: &str) -> Option<&'a Value> {
        let idx = self.raw.column_index(label)?;
        self.raw.data.last().and_then(|row| row.get(idx))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TopicDecoder
// ────────────────────────────────────────────────────────────────────────────

/// Stateless-per-call decoder for every catalog topic.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use vigil_perception::decoder::TopicDecoder;
/// use vigil_perception::wire::{RawRecord, encode_record};
/// use vigil_types::Payload;
///
/// let decoder = TopicDecoder::default();
/// let bytes = encode_record(&RawRecord::new(10.0, &["ppi"], vec![vec![json!(800)]])).unwrap();
/// let record = decoder.decode("cardiac/ppi", &bytes).unwrap();
/// assert_eq!(record.payload, Payload::Scalar(75.0));
/// ```
pub struct TopicDecoder {
    config: DecoderConfig,
    specs: BTreeMap<Topic, TopicSpec>,
    switches: SignalSwitchboard,
}

impl Default for TopicDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

impl TopicDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        let specs = TopicSpec::catalog(&config);
        Self {
            config,
            specs,
            switches: SignalSwitchboard::new(Topic::names()),
        }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn spec(&self, topic: Topic) -> Option<&TopicSpec> {
        self.specs.get(&topic)
    }

    /// Decode and validate one payload.
    pub fn decode(&self, topic: &str, bytes: &[u8]) -> Result<NormalizedRecord, DecodeError> {
        let parsed = Topic::from_name(topic).ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;
        if !self.switches.is_active(topic) {
            return Err(DecodeError::SignalDisabled(topic.to_string()));
        }
        let raw = decode_record(bytes)
            .map_err(|e| DecodeError::schema(topic, format!("undecodable payload: {e}")))?;
        let timestamp = raw
            .ts
            .seconds()
            .ok_or_else(|| DecodeError::schema(topic, format!("bad timestamp {:?}", raw.ts)))?;
        let spec = self
            .specs
            .get(&parsed)
            .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

        let (payload, quality) = if spec.permissive {
            (document(&raw), 1.0)
        } else {
            let table = Table::check(topic, &raw, spec)?;
            self.convert(parsed, &table, timestamp)?
        };

        let (signal_type, data_type) = parsed.route();
        debug!(topic, timestamp, samples = payload.sample_count(), "record decoded");
        Ok(NormalizedRecord {
            signal_type,
            data_type,
            timestamp,
            source: topic.to_string(),
            payload,
            quality,
        })
    }

    fn convert(&self, topic: Topic, table: &Table<'_>, ts: f64) -> Result<(Payload, f64), DecodeError> {
        let cfg = &self.config;
        let payload = match topic {
            Topic::CardiacPpi => {
                let intervals = table.column("ppi")?;
                table.optional_column("error_estimate")?;
                let contact = table.optional_column("skin_contact")?;
                let quality = match contact.as_ref().and_then(|c| c.last()) {
                    Some(&c) if c == 0.0 => NO_CONTACT_QUALITY,
                    _ => 1.0,
                };
                let rate = intervals.last().copied().map(ppi_to_rate).unwrap_or_default();
                return Ok((Payload::Scalar(rate), quality));
            }
            Topic::CardiacEcg => {
                let adc = cfg.ecg.adc();
                let samples: Vec<f64> = table.column("ecg")?.into_iter().map(|c| adc.to_physical(c)).collect();
                Payload::Waveform(Waveform {
                    timestamps: sample_timestamps(ts, samples.len(), cfg.ecg.sampling_rate),
                    samples,
                })
            }
            Topic::EegRaw => {
                let adc = cfg.eeg.adc();
                let mut channels = BTreeMap::new();
                for ch in &cfg.eeg_channels {
                    let samples = table.column(ch)?.into_iter().map(|c| adc.to_physical(c)).collect();
                    channels.insert(ch.clone(), samples);
                }
                Payload::Channels(ChannelSamples {
                    channels,
                    timestamps: sample_timestamps(ts, table.rows(), cfg.eeg.sampling_rate),
                })
            }
            Topic::EegBands => {
                let mut bands = BTreeMap::new();
                for band in BAND_LABELS {
                    bands.insert(band.to_string(), table.last(band)?);
                }
                let sum: f64 = bands.values().sum();
                let tol = cfg.band_sum_tolerance;
                if (sum - 1.0).abs() > tol {
                    return Err(DecodeError::ValueOutOfRange {
                        topic: table.topic.to_string(),
                        field: "sum".into(),
                        value: sum,
                        min: 1.0 - tol,
                        max: 1.0 + tol,
                    });
                }
                Payload::Bands(bands)
            }
            Topic::MotionAcc | Topic::MotionGyro => {
                let conv = if topic == Topic::MotionAcc { &cfg.acc } else { &cfg.gyro };
                let axis = |i: usize, label: &str| -> Result<Vec<f64>, DecodeError> {
                    let adc = conv.axis(i);
                    Ok(table.column(label)?.into_iter().map(|c| adc.to_physical(c)).collect())
                };
                let (x, y, z) = (axis(0, "x")?, axis(1, "y")?, axis(2, "z")?);
                let magnitude = x
                    .iter()
                    .zip(&y)
                    .zip(&z)
                    .map(|((x, y), z)| magnitude(*x, *y, *z))
                    .collect();
                Payload::Axes(AxisSamples {
                    timestamps: sample_timestamps(ts, x.len(), conv.sampling_rate),
                    x,
                    y,
                    z,
                    magnitude,
                })
            }
            Topic::CameraFace => Payload::Face(self.face(table)?),
            Topic::VehicleLevel => Payload::Scalar(table.last("level")?),
            Topic::VehicleCar => {
                let mut fields = BTreeMap::new();
                for label in ["speed", "lane_centrality", "steering_angle"] {
                    fields.insert(label.to_string(), table.last(label)?);
                }
                if let Some(limits) = table.optional_column("speed_limit")?
                    && let Some(&limit) = limits.last()
                {
                    fields.insert("speed_limit".to_string(), limit);
                }
                Payload::Fields(fields)
            }
            Topic::SystemControl | Topic::SystemTimestamp | Topic::SystemConfig => document(table.raw),
        };
        Ok((payload, 1.0))
    }

    fn face(&self, table: &Table<'_>) -> Result<FaceFrame, DecodeError> {
        let expected = self.config.face_points * 3;
        let cells = table
            .last_cell("landmarks")
            .and_then(Value::as_array)
            .ok_or_else(|| DecodeError::schema(table.topic, "landmarks must be an array"))?;
        let flat = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                cell.as_f64()
                    .ok_or_else(|| DecodeError::schema(table.topic, format!("landmark cell {i} is not a number: {cell}")))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        if flat.len() != expected {
            return Err(DecodeError::schema(
                table.topic,
                format!("landmarks must hold {expected} numbers, got {}", flat.len()),
            ));
        }
        let landmarks = flat.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        Ok(FaceFrame {
            landmarks,
            gaze: [table.last("gaze_x")?, table.last("gaze_y")?, table.last("gaze_z")?],
            eye_aspect_ratio: table.last("ear")?,
            blink_rate: table.last("blink_rate")?,
            confidence: table.last("confidence")?,
        })
    }
}

/// Label → value object of the last row (empty when there are no rows).
fn document(raw: &RawRecord) -> Payload {
    let object = raw
        .data
        .last()
        .map(|row| {
            raw.labels
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect::<serde_json::Map<String, Value>>()
        })
        .unwrap_or_default();
    Payload::Document(Value::Object(object))
}

impl SignalControl for TopicDecoder {
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
        ComponentState {
            component: COMPONENT_NAME.to_string(),
            status: ComponentStatus::Running,
            available: self.switches.available(),
            active: self.switches.active(),
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::encode_record;
    use serde_json::json;
    use vigil_types::{DataType, SignalType};

    fn bytes(labels: &[&str], data: Vec<Vec<Value>>) -> Vec<u8> {
        encode_record(&RawRecord::new(100.0, labels, data)).unwrap()
    }

    #[test]
    fn ppi_uses_last_row_rate() {
        let decoder = TopicDecoder::default();
        let payload = bytes(&["ppi"], vec![vec![json!(800)], vec![json!(400)]]);
        let record = decoder.decode("cardiac/ppi", &payload).unwrap();
        assert_eq!(record.signal_type, SignalType::Cardiac);
        assert_eq!(record.data_type, DataType::Rate);
        assert_eq!(record.payload, Payload::Scalar(150.0));
        assert_eq!(record.timestamp, 100.0);
        assert_eq!(record.source, "cardiac/ppi");
    }

    #[test]
    fn ppi_out_of_range_in_any_row_is_rejected() {
        let decoder = TopicDecoder::default();
        let payload = bytes(&["ppi"], vec![vec![json!(250)], vec![json!(800)]]);
        assert!(matches!(
            decoder.decode("cardiac/ppi", &payload),
            Err(DecodeError::ValueOutOfRange { ref field, .. }) if field == "ppi"
        ));
    }

    #[test]
    fn missing_skin_contact_lowers_quality() {
        let decoder = TopicDecoder::default();
        let payload = bytes(&["ppi", "skin_contact"], vec![vec![json!(800), json!(0)]]);
        let record = decoder.decode("cardiac/ppi", &payload).unwrap();
        assert_eq!(record.quality, NO_CONTACT_QUALITY);
    }

    #[test]
    fn unknown_topic() {
        let decoder = TopicDecoder::default();
        assert_eq!(
            decoder.decode("lidar/points", &[]),
            Err(DecodeError::UnknownTopic("lidar/points".into()))
        );
    }

    #[test]
    fn schema_failures() {
        let decoder = TopicDecoder::default();
        let cases = [
            bytes(&["rate"], vec![vec![json!(1)]]),
            bytes(&["ppi", "extra"], vec![vec![json!(800), json!(1)]]),
            bytes(&["ppi"], vec![]),
            bytes(&["ppi"], vec![vec![json!(800), json!(1)]]),
            bytes(&["ppi"], vec![vec![json!("fast")]]),
            vec![0xc1],
        ];
        for payload in cases {
            assert!(matches!(
                decoder.decode("cardiac/ppi", &payload),
                Err(DecodeError::SchemaInvalid { .. })
            ));
        }
    }

    #[test]
    fn bad_timestamp_is_schema_invalid() {
        let decoder = TopicDecoder::default();
        let payload = encode_record(&RawRecord {
            ts: crate::wire::WireTimestamp::Text("later".into()),
            labels: vec!["level".into()],
            data: vec![vec![json!(0.1)]],
        })
        .unwrap();
        assert!(matches!(
            decoder.decode("vehicle/level", &payload),
            Err(DecodeError::SchemaInvalid { .. })
        ));
    }

    #[test]
    fn ecg_converts_to_millivolts_with_sample_times() {
        let decoder = TopicDecoder::default();
        let payload = bytes(&["ecg"], vec![vec![json!(1000)], vec![json!(-500)]]);
        let record = decoder.decode("cardiac/ecg", &payload).unwrap();
        let Payload::Waveform(w) = record.payload else {
            panic!("expected waveform");
        };
        assert!((w.samples[0] - 1.0).abs() < 1e-12);
        assert!((w.samples[1] + 0.5).abs() < 1e-12);
        assert_eq!(w.timestamps[0], 100.0);
        assert!((w.timestamps[1] - (100.0 + 1.0 / 130.0)).abs() < 1e-9);
    }

    #[test]
    fn eeg_raw_converts_every_channel() {
        let decoder = TopicDecoder::default();
        let row = vec![json!(2048), json!(4095), json!(0), json!(2048)];
        let payload = bytes(&["TP9", "AF7", "AF8", "TP10"], vec![row.clone(), row]);
        let record = decoder.decode("eeg/raw", &payload).unwrap();
        let Payload::Channels(c) = record.payload else {
            panic!("expected channels");
        };
        assert_eq!(c.channels["TP9"], vec![0.0, 0.0]);
        assert_eq!(c.channels["AF8"][0], -1000.0);
        assert_eq!(c.timestamps.len(), 2);
    }

    #[test]
    fn eeg_code_outside_adc_range() {
        let decoder = TopicDecoder::default();
        let payload = bytes(
            &["TP9", "AF7", "AF8", "TP10"],
            vec![vec![json!(5000), json!(0), json!(0), json!(0)]],
        );
        assert!(matches!(
            decoder.decode("eeg/raw", &payload),
            Err(DecodeError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn bands_sum_validation() {
        let decoder = TopicDecoder::default();
        let ok = bytes(
            &BAND_LABELS,
            vec![vec![json!(0.8), json!(0.1), json!(0.05), json!(0.03), json!(0.02)]],
        );
        let record = decoder.decode("eeg/bands", &ok).unwrap();
        assert_eq!(record.payload.field("delta"), Some(0.8));

        let bad = bytes(
            &BAND_LABELS,
            vec![vec![json!(0.8), json!(0.3), json!(0.2), json!(0.1), json!(0.1)]],
        );
        assert!(matches!(
            decoder.decode("eeg/bands", &bad),
            Err(DecodeError::ValueOutOfRange { ref field, .. }) if field == "sum"
        ));
    }

    #[test]
    fn acc_magnitude_is_euclidean() {
        let decoder = TopicDecoder::default();
        let payload = bytes(&["x", "y", "z"], vec![vec![json!(0), json!(0), json!(4096)]]);
        let record = decoder.decode("motion/acc", &payload).unwrap();
        let Payload::Axes(a) = record.payload else {
            panic!("expected axes");
        };
        assert!((a.magnitude[0] - 9.80665).abs() < 1e-9);
    }

    #[test]
    fn face_landmarks_are_reshaped() {
        let decoder = TopicDecoder::default();
        let flat: Vec<Value> = (0..68 * 3).map(|i| json!(i as f64)).collect();
        let labels = ["landmarks", "gaze_x", "gaze_y", "gaze_z", "ear", "blink_rate", "confidence"];
        let row = vec![json!(flat), json!(0.1), json!(0.0), json!(0.9), json!(0.3), json!(15), json!(0.95)];
        let record = decoder.decode("camera/face", &bytes(&labels, vec![row])).unwrap();
        let Payload::Face(face) = record.payload else {
            panic!("expected face");
        };
        assert_eq!(face.landmarks.len(), 68);
        assert_eq!(face.landmarks[1], [3.0, 4.0, 5.0]);
        assert_eq!(face.eye_aspect_ratio, 0.3);

        let short = vec![json!([1.0, 2.0]), json!(0.1), json!(0.0), json!(0.9), json!(0.3), json!(15), json!(0.95)];
        assert!(decoder.decode("camera/face", &bytes(&labels, vec![short])).is_err());
    }

    #[test]
    fn face_landmarks_reject_non_numeric_cells() {
        let decoder = TopicDecoder::default();
        let labels = ["landmarks", "gaze_x", "gaze_y", "gaze_z", "ear", "blink_rate", "confidence"];
        let face_row = |flat: Vec<Value>| vec![json!(flat), json!(0.1), json!(0.0), json!(0.9), json!(0.3), json!(15), json!(0.95)];

        // 204 numbers plus a string.
        let mut padded: Vec<Value> = (0..68 * 3).map(|i| json!(i as f64)).collect();
        padded.insert(10, json!("garbage"));
        assert!(matches!(
            decoder.decode("camera/face", &bytes(&labels, vec![face_row(padded)])),
            Err(DecodeError::SchemaInvalid { .. })
        ));

        // Right length, one null.
        let mut holed: Vec<Value> = (0..68 * 3).map(|i| json!(i as f64)).collect();
        holed[42] = Value::Null;
        assert!(matches!(
            decoder.decode("camera/face", &bytes(&labels, vec![face_row(holed)])),
            Err(DecodeError::SchemaInvalid { .. })
        ));
    }

    #[test]
    fn vehicle_car_fields_include_optional_limit() {
        let decoder = TopicDecoder::default();
        let payload = bytes(
            &["speed", "lane_centrality", "steering_angle", "speed_limit"],
            vec![vec![json!(120), json!(0.9), json!(-3.5), json!(100)]],
        );
        let record = decoder.decode("vehicle/car", &payload).unwrap();
        assert_eq!(record.payload.field("speed_limit"), Some(100.0));
        assert_eq!(record.payload.field("steering_angle"), Some(-3.5));
    }

    #[test]
    fn system_topics_are_permissive() {
        let decoder = TopicDecoder::default();
        let record = decoder
            .decode("system/config", &bytes(&["mode", "anything"], vec![vec![json!("demo"), json!(3)]]))
            .unwrap();
        assert_eq!(record.signal_type, SignalType::System);
        assert_eq!(record.payload, Payload::Document(json!({"mode": "demo", "anything": 3})));

        let empty = decoder.decode("system/timestamp", &bytes(&[], vec![])).unwrap();
        assert_eq!(empty.payload, Payload::Document(json!({})));
    }

    #[test]
    fn disabled_topic_is_reported_as_disabled() {
        let decoder = TopicDecoder::default();
        decoder.disable_signal("vehicle/level").unwrap();
        let payload = bytes(&["level"], vec![vec![json!(0.2)]]);
        assert_eq!(
            decoder.decode("vehicle/level", &payload),
            Err(DecodeError::SignalDisabled("vehicle/level".into()))
        );
        decoder.enable_signal("vehicle/level").unwrap();
        assert!(decoder.decode("vehicle/level", &payload).is_ok());
    }
}
