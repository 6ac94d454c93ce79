//! Driver-facing camera rules: eye closure, blinking, gaze and tracking.

use serde::{Deserialize, Serialize};
use vigil_types::{AnomalyKind, DataType, FaceFrame, Finding, NormalizedRecord, Payload, Severity, SignalType};

use super::{Detector, Window, mismatch};
use crate::error::{ValidationError, check_range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraThresholds {
    /// Eye aspect ratio under which the eyes count as closed.
    pub ear_closed: f64,
    /// Consecutive closed frames that open an eyes-closed anomaly.
    pub closed_frames: usize,
    /// Closed frames within the window that make a closure prolonged.
    pub prolonged_frames: usize,
    /// Blinks per minute.
    pub blink_rate: f64,
    pub gaze_off_road: f64,
    pub min_confidence: f64,
}

impl Default for CameraThresholds {
    fn default() -> Self {
        Self {
            ear_closed: 0.2,
            closed_frames: 3,
            prolonged_frames: 10,
            blink_rate: 30.0,
            gaze_off_road: 0.5,
            min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CameraDetector {
    pub thresholds: CameraThresholds,
}

impl CameraDetector {
    pub fn new(thresholds: CameraThresholds) -> Self {
        Self { thresholds }
    }
}

fn face(payload: &Payload) -> Option<&FaceFrame> {
    match payload {
        Payload::Face(f) => Some(f),
        _ => None,
    }
}

impl Detector for CameraDetector {
    fn family(&self) -> SignalType {
        SignalType::Camera
    }

    fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        let (DataType::FaceLandmarks, Payload::Face(f)) = (record.data_type, &record.payload) else {
            return Err(mismatch(record));
        };
        if f.landmarks.is_empty() {
            return Err(ValidationError::Empty("landmarks"));
        }
        check_range("ear", f.eye_aspect_ratio, 0.0, 1.0)?;
        check_range("confidence", f.confidence, 0.0, 1.0)?;
        check_range("blink_rate", f.blink_rate, 0.0, 200.0)?;
        for (axis, g) in ["gaze_x", "gaze_y", "gaze_z"].into_iter().zip(f.gaze) {
            check_range(axis, g, -1.0, 1.0)?;
        }
        Ok(())
    }

    fn detect(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let frames: Vec<&FaceFrame> = window.points.iter().filter_map(|p| face(&p.value)).collect();
        let Some(latest) = frames.last() else {
            return Vec::new();
        };
        let mut findings = Vec::new();
        let closed_frames = t.closed_frames.max(1);
        let prolonged_frames = t.prolonged_frames.max(1);

        let recent = &frames[frames.len().saturating_sub(closed_frames)..];
        if recent.len() >= closed_frames && recent.iter().all(|f| f.eye_aspect_ratio < t.ear_closed) {
            findings.push(Finding::new(
                AnomalyKind::EyesClosed,
                Severity::Warning,
                "Eyes closed",
                latest.eye_aspect_ratio,
                t.ear_closed,
            ));
        }

        let closed = frames.iter().filter(|f| f.eye_aspect_ratio < t.ear_closed).count();
        if closed >= prolonged_frames {
            findings.push(Finding::new(
                AnomalyKind::ProlongedEyeClosure,
                Severity::Critical,
                "Prolonged eye closure",
                closed as f64,
                prolonged_frames as f64,
            ));
        }

        if latest.blink_rate > t.blink_rate {
            findings.push(Finding::new(
                AnomalyKind::ElevatedBlinkRate,
                Severity::Info,
                "Elevated blink rate",
                latest.blink_rate,
                t.blink_rate,
            ));
        }

        let gaze = latest.gaze[0].abs().max(latest.gaze[1].abs());
        if gaze > t.gaze_off_road {
            findings.push(Finding::new(AnomalyKind::GazeOffRoad, Severity::Warning, "Gaze off road", gaze, t.gaze_off_road));
        }

        if latest.confidence < t.min_confidence {
            findings.push(Finding::new(
                AnomalyKind::LowTrackingConfidence,
                Severity::Info,
                "Low face tracking confidence",
                latest.confidence,
                t.min_confidence,
            ));
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::families::testing::{history, kinds, point};

    fn frame(ear: f64) -> FaceFrame {
        FaceFrame {
            landmarks: vec![[0.0; 3]; 68],
            gaze: [0.0, 0.0, 1.0],
            eye_aspect_ratio: ear,
            blink_rate: 15.0,
            confidence: 0.95,
        }
    }

    fn run(frames: Vec<FaceFrame>) -> Vec<AnomalyKind> {
        let buf = history(
            frames
                .into_iter()
                .enumerate()
                .map(|(i, f)| point(DataType::FaceLandmarks, i as f64, Payload::Face(f)))
                .collect(),
        );
        kinds(&CameraDetector::default().detect(&Window::collect(&buf, DataType::FaceLandmarks, 20)))
    }

    #[test]
    fn open_eyes_are_quiet() {
        assert!(run(vec![frame(0.3); 5]).is_empty());
    }

    #[test]
    fn three_closed_frames_close_the_eyes() {
        assert!(run(vec![frame(0.3), frame(0.1), frame(0.1)]).is_empty());
        assert_eq!(
            run(vec![frame(0.3), frame(0.1), frame(0.1), frame(0.1)]),
            vec![AnomalyKind::EyesClosed]
        );
    }

    #[test]
    fn ten_closed_frames_are_prolonged() {
        let k = run(vec![frame(0.1); 10]);
        assert!(k.contains(&AnomalyKind::ProlongedEyeClosure));
        assert!(k.contains(&AnomalyKind::EyesClosed));
    }

    #[test]
    fn gaze_blink_and_confidence() {
        let mut f = frame(0.3);
        f.gaze = [0.7, 0.0, 0.7];
        f.blink_rate = 40.0;
        f.confidence = 0.2;
        let k = run(vec![f]);
        assert_eq!(
            k,
            vec![
                AnomalyKind::ElevatedBlinkRate,
                AnomalyKind::GazeOffRoad,
                AnomalyKind::LowTrackingConfidence
            ]
        );
    }

    #[test]
    fn zero_frame_counts_act_as_one() {
        let detector = CameraDetector::new(CameraThresholds {
            closed_frames: 0,
            prolonged_frames: 0,
            ..CameraThresholds::default()
        });
        let detect = |frames: Vec<FaceFrame>| {
            let buf = history(
                frames
                    .into_iter()
                    .enumerate()
                    .map(|(i, f)| point(DataType::FaceLandmarks, i as f64, Payload::Face(f)))
                    .collect(),
            );
            kinds(&detector.detect(&Window::collect(&buf, DataType::FaceLandmarks, 20)))
        };
        assert!(detect(vec![frame(0.3); 3]).is_empty());
        assert_eq!(
            detect(vec![frame(0.3), frame(0.1)]),
            vec![AnomalyKind::EyesClosed, AnomalyKind::ProlongedEyeClosure]
        );
    }
}
