//! Vehicle and environment rules: cabin level, speed and lane keeping.
//!
//! The impaired-driving rule runs on the car-info pass and reads the latest
//! level point, so it is cleared when lane keeping recovers.

use serde::{Deserialize, Serialize};
use vigil_types::{AnomalyKind, DataType, Finding, NormalizedRecord, Payload, Severity, SignalType};

use super::{Detector, Window, mismatch};
use crate::error::{ValidationError, check_range};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleThresholds {
    /// ‰
    pub level_legal: f64,
    pub level_danger: f64,
    /// km/h, used when a record carries no `speed_limit`.
    pub default_speed_limit: f64,
    pub excessive_margin: f64,
    pub dangerous_margin: f64,
    pub lane_danger: f64,
    pub lane_warning: f64,
}

impl Default for VehicleThresholds {
    fn default() -> Self {
        Self {
            level_legal: 0.5,
            level_danger: 0.8,
            default_speed_limit: 130.0,
            excessive_margin: 20.0,
            dangerous_margin: 50.0,
            lane_danger: 0.3,
            lane_warning: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VehicleDetector {
    pub thresholds: VehicleThresholds,
}

impl VehicleDetector {
    pub fn new(thresholds: VehicleThresholds) -> Self {
        Self { thresholds }
    }

    fn level_findings(&self, level: f64) -> Vec<Finding> {
        let t = &self.thresholds;
        if level >= t.level_danger {
            vec![Finding::new(AnomalyKind::DangerousLevel, Severity::Critical, "Dangerous level", level, t.level_danger)]
        } else if level >= t.level_legal {
            vec![Finding::new(
                AnomalyKind::LevelAboveLegalLimit,
                Severity::Warning,
                "Level above legal limit",
                level,
                t.level_legal,
            )]
        } else {
            Vec::new()
        }
    }

    fn car_findings(&self, window: &Window<'_>, car: &Payload) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();

        if let Some(speed) = car.field("speed") {
            let limit = car.field("speed_limit").unwrap_or(t.default_speed_limit);
            let over = speed - limit;
            if over > t.dangerous_margin {
                findings.push(Finding::new(
                    AnomalyKind::DangerousSpeeding,
                    Severity::Critical,
                    "Dangerous speeding",
                    speed,
                    limit + t.dangerous_margin,
                ));
            } else if over > t.excessive_margin {
                findings.push(Finding::new(
                    AnomalyKind::ExcessiveSpeeding,
                    Severity::Warning,
                    "Excessive speeding",
                    speed,
                    limit + t.excessive_margin,
                ));
            } else if over > 0.0 {
                findings.push(Finding::new(AnomalyKind::Speeding, Severity::Info, "Speeding", speed, limit));
            }
        }

        let lane = car.field("lane_centrality");
        match lane {
            Some(l) if l < t.lane_danger => findings.push(Finding::new(
                AnomalyKind::LaneDepartureDanger,
                Severity::Critical,
                "Lane departure",
                l,
                t.lane_danger,
            )),
            Some(l) if l < t.lane_warning => findings.push(Finding::new(
                AnomalyKind::PoorLaneKeeping,
                Severity::Warning,
                "Poor lane keeping",
                l,
                t.lane_warning,
            )),
            _ => {}
        }

        let level = window
            .latest_of(DataType::Level)
            .and_then(|p| p.value.as_scalar());
        if let (Some(level), Some(lane)) = (level, lane)
            && level >= t.level_legal
            && lane < t.lane_warning
        {
            findings.push(Finding::new(
                AnomalyKind::ImpairedDriving,
                Severity::Critical,
                "Impaired driving",
                level,
                t.level_legal,
            ));
        }
        findings
    }
}

impl Detector for VehicleDetector {
    fn family(&self) -> SignalType {
        SignalType::Vehicle
    }

    fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        match (record.data_type, &record.payload) {
            (DataType::Level, Payload::Scalar(level)) => check_range("level", *level, 0.0, 5.0),
            (DataType::CarInfo, Payload::Fields(fields)) => {
                let speed = fields.get("speed").copied().ok_or(ValidationError::Empty("speed"))?;
                check_range("speed", speed, 0.0, 400.0)?;
                if let Some(&lane) = fields.get("lane_centrality") {
                    check_range("lane_centrality", lane, 0.0, 1.0)?;
                }
                if let Some(&limit) = fields.get("speed_limit") {
                    check_range("speed_limit", limit, 0.0, 400.0)?;
                }
                Ok(())
            }
            _ => Err(mismatch(record)),
        }
    }

    fn detect(&self, window: &Window<'_>) -> Vec<Finding> {
        let Some(latest) = window.latest() else {
            return Vec::new();
        };
        match window.data_type {
            DataType::Level => latest.value.as_scalar().map(|l| self.level_findings(l)).unwrap_or_default(),
            DataType::CarInfo => self.car_findings(window, &latest.value),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::families::testing::{history, kinds, point};

    fn car(speed: f64, lane: f64, limit: Option<f64>) -> Payload {
        let mut fields = BTreeMap::from([
            ("speed".to_string(), speed),
            ("lane_centrality".to_string(), lane),
            ("steering_angle".to_string(), 0.0),
        ]);
        if let Some(limit) = limit {
            fields.insert("speed_limit".to_string(), limit);
        }
        Payload::Fields(fields)
    }

    fn run(points: Vec<(DataType, Payload)>, data_type: DataType) -> Vec<AnomalyKind> {
        let buf = history(
            points
                .into_iter()
                .enumerate()
                .map(|(i, (dt, p))| point(dt, i as f64, p))
                .collect(),
        );
        kinds(&VehicleDetector::default().detect(&Window::collect(&buf, data_type, 20)))
    }

    #[test]
    fn level_tiers() {
        assert!(run(vec![(DataType::Level, Payload::Scalar(0.2))], DataType::Level).is_empty());
        assert_eq!(
            run(vec![(DataType::Level, Payload::Scalar(0.5))], DataType::Level),
            vec![AnomalyKind::LevelAboveLegalLimit]
        );
        assert_eq!(
            run(vec![(DataType::Level, Payload::Scalar(0.9))], DataType::Level),
            vec![AnomalyKind::DangerousLevel]
        );
    }

    #[test]
    fn speeding_tiers_use_record_limit_or_default() {
        let tier = |speed, limit| run(vec![(DataType::CarInfo, car(speed, 0.9, limit))], DataType::CarInfo);
        assert!(tier(120.0, None).is_empty());
        assert_eq!(tier(135.0, None), vec![AnomalyKind::Speeding]);
        assert_eq!(tier(75.0, Some(50.0)), vec![AnomalyKind::ExcessiveSpeeding]);
        assert_eq!(tier(185.0, None), vec![AnomalyKind::DangerousSpeeding]);
    }

    #[test]
    fn lane_tiers() {
        let lane = |l| run(vec![(DataType::CarInfo, car(100.0, l, None))], DataType::CarInfo);
        assert_eq!(lane(0.5), vec![AnomalyKind::PoorLaneKeeping]);
        assert_eq!(lane(0.2), vec![AnomalyKind::LaneDepartureDanger]);
    }

    #[test]
    fn impaired_driving_combines_level_and_lane() {
        let k = run(
            vec![
                (DataType::Level, Payload::Scalar(0.6)),
                (DataType::CarInfo, car(100.0, 0.5, None)),
            ],
            DataType::CarInfo,
        );
        assert!(k.contains(&AnomalyKind::ImpairedDriving));

        let k = run(
            vec![
                (DataType::Level, Payload::Scalar(0.6)),
                (DataType::CarInfo, car(100.0, 0.9, None)),
            ],
            DataType::CarInfo,
        );
        assert!(k.is_empty());
    }
}
