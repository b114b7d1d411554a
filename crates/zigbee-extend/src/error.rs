//! Error types for capability composition

use thiserror::Error;
use zigbee_core::SessionError;

/// Errors raised while building or running capabilities
#[derive(Error, Debug)]
pub enum ExtendError {
    /// Symbolic reporting interval not in the fixed table
    #[error("Unknown reporting interval: {0}")]
    UnknownInterval(String),

    /// Reporting record violates min <= max or change >= 0
    #[error("Invalid reporting configuration for {attribute}: {reason}")]
    InvalidReporting { attribute: String, reason: String },

    /// Descriptor arguments violate a builder invariant
    #[error("Invalid capability descriptor: {0}")]
    Construction(String),

    /// Requested value has the wrong type or is not a known name
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// Named endpoint not in the device's endpoint table
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// Device has no endpoints to address
    #[error("Device {0} has no endpoints")]
    NoEndpoint(String),

    /// No encoder handles the state key
    #[error("No converter for key: {0}")]
    UnknownKey(String),

    /// Device session failure
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// JSON deserialization error (descriptors)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExtendError {
    pub(crate) fn invalid_value(key: &str, reason: impl Into<String>) -> Self {
        ExtendError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this wraps an unsupported-attribute session failure
    #[must_use]
    pub fn is_unsupported_attribute(&self) -> bool {
        matches!(self, ExtendError::Session(e) if e.is_unsupported_attribute())
    }
}
