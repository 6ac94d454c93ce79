use thiserror::Error;
use vigil_types::VigilError;

/// Failures of the transport layer.
///
/// Everything except [`TransportError::Malformed`] is fatal to the current
/// connection and triggers a reconnect.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("cannot connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("socket error: {0}")]
    Socket(String),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("frame source closed")]
    Closed,
}

impl From<TransportError> for VigilError {
    fn from(err: TransportError) -> Self {
        VigilError::ConnectionFailure(err.to_string())
    }
}
