//! Closed catalog of the topics the ingestion stack understands.

use std::fmt;

use vigil_types::{DataType, SignalType};

/// Every topic a publisher may send on.
///
/// Signal names used for capability control are the topic names, so the
/// same string identifies a signal on the transport, the decoder and the
/// orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    CardiacPpi,
    CardiacEcg,
    MotionAcc,
    MotionGyro,
    EegRaw,
    EegBands,
    CameraFace,
    VehicleLevel,
    VehicleCar,
    SystemControl,
    SystemTimestamp,
    SystemConfig,
}

impl Topic {
    pub const ALL: [Topic; 12] = [
        Topic::CardiacPpi,
        Topic::CardiacEcg,
        Topic::MotionAcc,
        Topic::MotionGyro,
        Topic::EegRaw,
        Topic::EegBands,
        Topic::CameraFace,
        Topic::VehicleLevel,
        Topic::VehicleCar,
        Topic::SystemControl,
        Topic::SystemTimestamp,
        Topic::SystemConfig,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Topic::CardiacPpi => "cardiac/ppi",
            Topic::CardiacEcg => "cardiac/ecg",
            Topic::MotionAcc => "motion/acc",
            Topic::MotionGyro => "motion/gyro",
            Topic::EegRaw => "eeg/raw",
            Topic::EegBands => "eeg/bands",
            Topic::CameraFace => "camera/face",
            Topic::VehicleLevel => "vehicle/level",
            Topic::VehicleCar => "vehicle/car",
            Topic::SystemControl => "system/control",
            Topic::SystemTimestamp => "system/timestamp",
            Topic::SystemConfig => "system/config",
        }
    }

    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Family and data type of records decoded from this topic.
    pub fn route(self) -> (SignalType, DataType) {
        match self {
            Topic::CardiacPpi => (SignalType::Cardiac, DataType::Rate),
            Topic::CardiacEcg => (SignalType::Cardiac, DataType::Waveform),
            Topic::MotionAcc => (SignalType::Motion, DataType::Acceleration),
            Topic::MotionGyro => (SignalType::Motion, DataType::Rotation),
            Topic::EegRaw => (SignalType::Eeg, DataType::Raw),
            Topic::EegBands => (SignalType::Eeg, DataType::Bands),
            Topic::CameraFace => (SignalType::Camera, DataType::FaceLandmarks),
            Topic::VehicleLevel => (SignalType::Vehicle, DataType::Level),
            Topic::VehicleCar => (SignalType::Vehicle, DataType::CarInfo),
            Topic::SystemControl => (SignalType::System, DataType::Control),
            Topic::SystemTimestamp => (SignalType::System, DataType::Timestamp),
            Topic::SystemConfig => (SignalType::System, DataType::Config),
        }
    }

    pub fn signal_type(self) -> SignalType {
        self.route().0
    }

    pub fn is_system(self) -> bool {
        self.signal_type() == SignalType::System
    }

    /// Topic names of the given family.
    pub fn names_of(family: SignalType) -> Vec<&'static str> {
        Topic::ALL
            .into_iter()
            .filter(|t| t.signal_type() == family)
            .map(Topic::name)
            .collect()
    }

    pub fn names() -> Vec<&'static str> {
        Topic::ALL.into_iter().map(Topic::name).collect()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
