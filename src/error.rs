use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between the register transport and the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out after {0:?} during {1}")]
    Timeout(std::time::Duration, String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("discovery did not find an end marker within {limit} registers of base {base}")]
    DiscoveryOverrun { base: u16, limit: u32 },

    #[error("model {0} is not in the registry")]
    UnknownModel(u16),

    #[error("model {0} is not present on the device")]
    ModelNotPresent(u16),

    #[error("model {model_id}: expected {expected} registers, got {actual}")]
    TruncatedModelData {
        model_id: u16,
        expected: usize,
        actual: usize,
    },

    #[error("model {model_id}: cannot decode {point}: {reason}")]
    Decode {
        model_id: u16,
        point: String,
        reason: String,
    },

    #[error("model {model_id} has no point named {point}")]
    PointNotFound { model_id: u16, point: String },

    #[error("model {model_id} point {point} is read-only")]
    PointNotWritable { model_id: u16, point: String },

    #[error("model {model_id} point {point} expects {expected}")]
    InvalidValueType {
        model_id: u16,
        point: String,
        expected: String,
    },

    #[error("model {model_id} point {point}: {reason}")]
    ValueOutOfRange {
        model_id: u16,
        point: String,
        reason: String,
    },

    #[error("device rejected write: {0}")]
    WriteRejected(String),

    #[error("device is not connected")]
    NotConnected,
}

impl Error {
    /// Transport-level failures that the poll loop may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Timeout(..))
    }

    /// Failures that mean the link itself is gone and a reconnect is required.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::TimedOut => Error::Timeout(std::time::Duration::ZERO, err.to_string()),
            // a reply that fails the header check means the stream is out of step
            ErrorKind::InvalidData => Error::Connection(format!("invalid response: {}", err)),
            _ => Error::Connection(err.to_string()),
        }
    }
}
