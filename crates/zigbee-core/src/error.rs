//! Session error types

use thiserror::Error;

/// Errors surfaced by a device session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Request timeout")]
    Timeout,

    #[error("Unsupported attribute: {cluster}/{attribute}")]
    UnsupportedAttribute { cluster: String, attribute: String },

    #[error("Device returned error status: {0:?}")]
    Status(ZclStatus),

    #[error("Endpoint not found: {0}")]
    EndpointNotFound(u8),

    #[error("Unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether the device rejected the request because it does not implement
    /// the attribute. Optional reads swallow exactly this class of failure.
    #[must_use]
    pub fn is_unsupported_attribute(&self) -> bool {
        matches!(
            self,
            SessionError::UnsupportedAttribute { .. }
                | SessionError::Status(ZclStatus::UnsupportedAttribute)
        )
    }
}

/// ZCL status codes carried in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZclStatus {
    Success = 0x00,
    Failure = 0x01,
    NotAuthorized = 0x7E,
    MalformedCommand = 0x80,
    UnsupClusterCommand = 0x81,
    UnsupGeneralCommand = 0x82,
    UnsupManufClusterCommand = 0x83,
    UnsupManufGeneralCommand = 0x84,
    InvalidField = 0x85,
    UnsupportedAttribute = 0x86,
    InvalidValue = 0x87,
    ReadOnly = 0x88,
    InsufficientSpace = 0x89,
    NotFound = 0x8B,
    UnreportableAttribute = 0x8C,
    InvalidDataType = 0x8D,
    Timeout = 0x94,
    HardwareFailure = 0xC0,
}

impl TryFrom<u8> for ZclStatus {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x00 => Ok(ZclStatus::Success),
            0x01 => Ok(ZclStatus::Failure),
            0x7E => Ok(ZclStatus::NotAuthorized),
            0x80 => Ok(ZclStatus::MalformedCommand),
            0x81 => Ok(ZclStatus::UnsupClusterCommand),
            0x82 => Ok(ZclStatus::UnsupGeneralCommand),
            0x83 => Ok(ZclStatus::UnsupManufClusterCommand),
            0x84 => Ok(ZclStatus::UnsupManufGeneralCommand),
            0x85 => Ok(ZclStatus::InvalidField),
            0x86 => Ok(ZclStatus::UnsupportedAttribute),
            0x87 => Ok(ZclStatus::InvalidValue),
            0x88 => Ok(ZclStatus::ReadOnly),
            0x89 => Ok(ZclStatus::InsufficientSpace),
            0x8B => Ok(ZclStatus::NotFound),
            0x8C => Ok(ZclStatus::UnreportableAttribute),
            0x8D => Ok(ZclStatus::InvalidDataType),
            0x94 => Ok(ZclStatus::Timeout),
            0xC0 => Ok(ZclStatus::HardwareFailure),
            _ => Err(value),
        }
    }
}
