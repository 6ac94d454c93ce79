//! EEG rules: per-channel raw signal quality and relative band power.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use vigil_types::{AnomalyKind, DataType, Finding, NormalizedRecord, Payload, Severity, SignalType};

use super::{Detector, Window, mismatch};
use crate::error::{ValidationError, check_all, check_range};
use crate::stats::{max_abs, mean, std_dev};

/// µV
const RAW_LEGAL: f64 = 2000.0;

/// Raw thresholds in µV, band thresholds as fractions of total power.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EegThresholds {
    pub saturation: f64,
    pub flat_std: f64,
    pub amplitude: f64,
    pub dc_drift: f64,
    pub drift_lag: usize,
    /// A channel is an outlier when its std exceeds this multiple of the
    /// mean std of the other channels.
    pub outlier_ratio: f64,
    pub band_ranges: BTreeMap<String, (f64, f64)>,
    pub excess_delta: f64,
    pub excess_theta: f64,
    pub alpha_deficit: f64,
    pub band_change: f64,
}

impl Default for EegThresholds {
    fn default() -> Self {
        let band_ranges = [
            ("delta", (0.05, 0.6)),
            ("theta", (0.05, 0.4)),
            ("alpha", (0.05, 0.5)),
            ("beta", (0.02, 0.4)),
            ("gamma", (0.0, 0.2)),
        ]
        .into_iter()
        .map(|(band, range)| (band.to_string(), range))
        .collect();
        Self {
            saturation: 900.0,
            flat_std: 0.5,
            amplitude: 200.0,
            dc_drift: 50.0,
            drift_lag: 3,
            outlier_ratio: 3.0,
            band_ranges,
            excess_delta: 0.7,
            excess_theta: 0.5,
            alpha_deficit: 0.05,
            band_change: 0.3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EegDetector {
    pub thresholds: EegThresholds,
}

impl EegDetector {
    pub fn new(thresholds: EegThresholds) -> Self {
        Self { thresholds }
    }

    fn raw_findings(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();
        let Some(Payload::Channels(latest)) = window.latest().map(|p| &p.value) else {
            return findings;
        };
        let earlier = match window.back(t.drift_lag).map(|p| &p.value) {
            Some(Payload::Channels(c)) => Some(c),
            _ => None,
        };

        for (channel, samples) in &latest.channels {
            if samples.is_empty() {
                continue;
            }
            if samples.iter().all(|s| s.abs() >= t.saturation) {
                findings.push(Finding::new(
                    AnomalyKind::ChannelSaturation,
                    Severity::Warning,
                    format!("Channel {channel} saturated"),
                    max_abs(samples),
                    t.saturation,
                ));
            }
            let std = std_dev(samples);
            if samples.len() > 1 && std < t.flat_std {
                findings.push(Finding::new(
                    AnomalyKind::FlatChannel,
                    Severity::Warning,
                    format!("Channel {channel} flat"),
                    std,
                    t.flat_std,
                ));
            }
            let peak = max_abs(samples);
            if peak > t.amplitude {
                findings.push(Finding::new(
                    AnomalyKind::ExcessiveEegAmplitude,
                    Severity::Info,
                    format!("Channel {channel} excessive amplitude"),
                    peak,
                    t.amplitude,
                ));
            }
            if let Some(before) = earlier.and_then(|c| c.channels.get(channel))
                && !before.is_empty()
            {
                let drift = (mean(samples) - mean(before)).abs();
                if drift > t.dc_drift {
                    findings.push(Finding::new(
                        AnomalyKind::EegBaselineDrift,
                        Severity::Info,
                        format!("Channel {channel} DC drift"),
                        drift,
                        t.dc_drift,
                    ));
                }
            }
        }

        let stds: Vec<(&String, f64)> = latest
            .channels
            .iter()
            .map(|(name, samples)| (name, std_dev(samples)))
            .collect();
        if stds.len() > 1 {
            for (i, (channel, std)) in stds.iter().enumerate() {
                let others: Vec<f64> = stds
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, (_, s))| *s)
                    .collect();
                let baseline = mean(&others);
                if baseline > 0.0 && *std > t.outlier_ratio * baseline {
                    findings.push(Finding::new(
                        AnomalyKind::ChannelVariabilityOutlier,
                        Severity::Warning,
                        format!("Channel {channel} variability outlier"),
                        *std,
                        t.outlier_ratio * baseline,
                    ));
                }
            }
        }
        findings
    }

    fn band_findings(&self, window: &Window<'_>) -> Vec<Finding> {
        let t = &self.thresholds;
        let mut findings = Vec::new();
        let Some(Payload::Bands(bands)) = window.latest().map(|p| &p.value) else {
            return findings;
        };

        for (band, &(min, max)) in &t.band_ranges {
            if let Some(&value) = bands.get(band)
                && !(min..=max).contains(&value)
            {
                let threshold = if value < min { min } else { max };
                findings.push(Finding::new(
                    AnomalyKind::BandOutOfRange,
                    Severity::Info,
                    format!("{band} band outside expected range"),
                    value,
                    threshold,
                ));
            }
        }

        let band = |name: &str| bands.get(name).copied();
        if let Some(delta) = band("delta")
            && delta > t.excess_delta
        {
            findings.push(Finding::new(AnomalyKind::ExcessDelta, Severity::Warning, "Excess delta activity", delta, t.excess_delta));
        }
        if let Some(theta) = band("theta")
            && theta > t.excess_theta
        {
            findings.push(Finding::new(AnomalyKind::ExcessTheta, Severity::Warning, "Excess theta activity", theta, t.excess_theta));
        }
        if let Some(alpha) = band("alpha")
            && alpha < t.alpha_deficit
        {
            findings.push(Finding::new(AnomalyKind::AlphaDeficit, Severity::Info, "Alpha deficit", alpha, t.alpha_deficit));
        }

        if let Some(Payload::Bands(previous)) = window.back(1).map(|p| &p.value) {
            for (name, value) in bands {
                if let Some(before) = previous.get(name) {
                    let change = (value - before).abs();
                    if change > t.band_change {
                        findings.push(Finding::new(
                            AnomalyKind::SuddenBandChange,
                            Severity::Warning,
                            format!("Sudden change in {name} band"),
                            change,
                            t.band_change,
                        ));
                    }
                }
            }
        }
        findings
    }
}

impl Detector for EegDetector {
    fn family(&self) -> SignalType {
        SignalType::Eeg
    }

    fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        match (record.data_type, &record.payload) {
            (DataType::Raw, Payload::Channels(c)) => {
                if c.channels.is_empty() {
                    return Err(ValidationError::Empty("eeg channels"));
                }
                c.channels
                    .iter()
                    .try_for_each(|(name, samples)| check_all(name, samples, -RAW_LEGAL, RAW_LEGAL))
            }
            (DataType::Bands, Payload::Bands(bands)) => {
                if bands.is_empty() {
                    return Err(ValidationError::Empty("eeg bands"));
                }
                bands.iter().try_for_each(|(name, v)| check_range(name, *v, 0.0, 1.0))
            }
            _ => Err(mismatch(record)),
        }
    }

    fn detect(&self, window: &Window<'_>) -> Vec<Finding> {
        match window.data_type {
            DataType::Raw => self.raw_findings(window),
            DataType::Bands => self.band_findings(window),
            _ => Vec::new(),
        }
    }
}
