use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a topic payload could not be turned into a normalized record.
///
/// All variants are non-fatal: the ingestion boundary converts them into
/// rejection (or, for [`DecodeError::SignalDisabled`], filter) counters.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("Unknown topic '{0}'")]
    UnknownTopic(String),

    #[error("Schema invalid on '{topic}': {reason}")]
    SchemaInvalid { topic: String, reason: String },

    #[error("Value out of range on '{topic}': {field}={value} not in [{min}, {max}]")]
    ValueOutOfRange {
        topic: String,
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Signal '{0}' is disabled on the decoder")]
    SignalDisabled(String),
}

impl DecodeError {
    pub fn schema(topic: &str, reason: impl Into<String>) -> Self {
        DecodeError::SchemaInvalid {
            topic: topic.to_string(),
            reason: reason.into(),
        }
    }
}

/// Global error type spanning transport failures, decoding, buffer
/// validation, capability control and persistence.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VigilError {
    #[error("Connection Failure: {0}")]
    ConnectionFailure(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Validation Failure on {signal}: {reason}")]
    ValidationFailure { signal: String, reason: String },

    #[error("Capability Not Found: component '{component}', signal {signal:?}")]
    CapabilityNotFound {
        component: String,
        signal: Option<String>,
    },

    #[error("Persistence Failure: {0}")]
    PersistenceFailure(String),

    #[error("Channel Error: {0}")]
    Channel(String),
}
