//! Per-family validation and anomaly rules.
//!
//! Each family implements [`Detector`]: a legal-range check run before a
//! record enters the buffer, and a detection pass over the recent
//! [`Window`] of the record's data type.  Rules return explicit
//! `(kind, severity)` [`Finding`]s and never fail.

pub mod camera;
pub mod cardiac;
pub mod eeg;
pub mod motion;
pub mod vehicle;

use vigil_types::{DataType, Finding, NormalizedRecord, SignalPoint, SignalType};

use crate::buffer::CircularBuffer;
use crate::error::ValidationError;

pub use camera::{CameraDetector, CameraThresholds};
pub use cardiac::{CardiacDetector, CardiacThresholds};
pub use eeg::{EegDetector, EegThresholds};
pub use motion::{MotionDetector, MotionThresholds};
pub use vehicle::{VehicleDetector, VehicleThresholds};

/// Family-specific behaviour plugged into a [`Signal`][crate::signal::Signal].
pub trait Detector: Send + Sync {
    fn family(&self) -> SignalType;

    /// Reject records whose values fall outside the family's legal ranges.
    fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError>;

    /// Evaluate the most recent window.  Findings replace the open
    /// anomalies previously reported for `window.data_type`.
    fn detect(&self, window: &Window<'_>) -> Vec<Finding>;
}

/// Recent points of one data type plus read access to the whole history,
/// so combined rules can look at the latest point of another data type.
pub struct Window<'a> {
    pub data_type: DataType,
    /// Oldest first; never empty during a detection pass.
    pub points: Vec<&'a SignalPoint>,
    history: &'a CircularBuffer<SignalPoint>,
}

impl<'a> Window<'a> {
    /// The last `size` points of `data_type` in `history`.
    pub fn collect(history: &'a CircularBuffer<SignalPoint>, data_type: DataType, size: usize) -> Self {
        let mut points: Vec<&SignalPoint> = history
            .iter()
            .rev()
            .filter(|p| p.data_type == data_type)
            .take(size)
            .collect();
        points.reverse();
        Self {
            data_type,
            points,
            history,
        }
    }

    pub fn latest(&self) -> Option<&'a SignalPoint> {
        self.points.last().copied()
    }

    /// The point `n` positions before the latest one.
    pub fn back(&self, n: usize) -> Option<&'a SignalPoint> {
        self.points.len().checked_sub(n + 1).map(|i| self.points[i])
    }

    /// Latest point of another data type in the same signal's history.
    pub fn latest_of(&self, data_type: DataType) -> Option<&'a SignalPoint> {
        self.history.iter().rev().find(|p| p.data_type == data_type)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn mismatch(record: &NormalizedRecord) -> ValidationError {
    ValidationError::PayloadMismatch {
        data_type: record.data_type,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{history, point};
    use super::*;
    use vigil_types::Payload;

    #[test]
    fn window_filters_by_data_type_and_keeps_order() {
        let buf = history(vec![
            point(DataType::Rate, 1.0, Payload::Scalar(60.0)),
            point(DataType::Waveform, 2.0, Payload::Scalar(0.0)),
            point(DataType::Rate, 3.0, Payload::Scalar(61.0)),
            point(DataType::Rate, 4.0, Payload::Scalar(62.0)),
        ]);
        let window = Window::collect(&buf, DataType::Rate, 2);
        let ts: Vec<f64> = window.points.iter().map(|p| p.timestamp).collect();
        assert_eq!(ts, vec![3.0, 4.0]);
        assert_eq!(window.back(1).map(|p| p.timestamp), Some(3.0));
        assert!(window.back(2).is_none());
        assert_eq!(window.latest_of(DataType::Waveform).map(|p| p.timestamp), Some(2.0));
        assert!(window.latest_of(DataType::Bands).is_none());
    }
}
