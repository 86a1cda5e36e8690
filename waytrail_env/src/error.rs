//! Error types for the Waytrail environment abstraction.

use thiserror::Error;

/// Errors that can occur when talking to an external collaborator.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Operator is offline or unknown to the position provider
    #[error("Operator offline: {0}")]
    OperatorOffline(String),

    /// A persisted positional record could not be parsed
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Route storage read/write failed
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Serialization/deserialization of stored routes failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl EnvError {
    /// Creates an offline error for an operator.
    pub fn offline(operator: impl std::fmt::Display) -> Self {
        Self::OperatorOffline(operator.to_string())
    }

    /// Creates a malformed-record error.
    pub fn malformed(record: impl Into<String>) -> Self {
        Self::MalformedRecord(record.into())
    }

    /// Creates a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageError(msg.into())
    }
}

impl From<std::io::Error> for EnvError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}
