//! Physical unit conversions applied by the decoder.

use serde::{Deserialize, Serialize};

/// Round to `decimals` decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Heart rate in bpm from a peak-to-peak interval in milliseconds, rounded
/// to one decimal.
///
/// ```
/// use vigil_perception::convert::ppi_to_rate;
/// assert_eq!(ppi_to_rate(800.0), 75.0);
/// assert_eq!(ppi_to_rate(400.0), 150.0);
/// ```
pub fn ppi_to_rate(interval_ms: f64) -> f64 {
    round_to(60_000.0 / interval_ms, 1)
}

/// Linear ADC mapping `physical = (code - baseline) * factor`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdcConversion {
    pub baseline: f64,
    pub factor: f64,
}

impl AdcConversion {
    pub fn to_physical(&self, code: f64) -> f64 {
        (code - self.baseline) * self.factor
    }

    /// Inverse mapping, rounded to the nearest code.
    pub fn to_code(&self, physical: f64) -> f64 {
        (physical / self.factor + self.baseline).round()
    }
}

/// Per-sample timestamps `chunk_ts + i / sampling_rate`.
pub fn sample_timestamps(chunk_ts: f64, count: usize, sampling_rate: f64) -> Vec<f64> {
    (0..count)
        .map(|i| chunk_ts + i as f64 / sampling_rate)
        .collect()
}

pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    (x * x + y * y + z * z).sqrt()
}
