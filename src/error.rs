//! Error types and result definitions for the tuya-switch crate.
//! Includes Tuya-style error codes and conversion from standard IO/JSON errors.

use thiserror::Error;

/// Represents all possible errors raised while resolving or talking to a switch.
#[derive(Error, Debug, Clone)]
pub enum SwitchError {
    /// Standard IO error (socket bind, receive, send, ...)
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(String),

    /// A single request timed out
    #[error("Timeout waiting for device")]
    Timeout,

    /// The device stayed unreachable after every local retry
    #[error("Failed to update status of device '{0}'")]
    ConnectionFailed(String),

    /// Broadcast scan exhausted without an announcement for the device
    #[error("Device ID '{0}' not found on the local network")]
    NotFound(String),

    /// The payload received from the device was malformed or unexpected
    #[error("Invalid payload")]
    InvalidPayload,

    /// Platform configuration was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Device is currently unreachable or disconnected
    #[error("Device offline")]
    Offline,
}

/// A specialized Result type for switch operations.
pub type Result<T> = std::result::Result<T, SwitchError>;

impl From<std::io::Error> for SwitchError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => SwitchError::Timeout,
            _ => SwitchError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SwitchError {
    fn from(err: serde_json::Error) -> Self {
        SwitchError::Json(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for SwitchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        SwitchError::Timeout
    }
}

impl SwitchError {
    /// Whether a single failed attempt with this error is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SwitchError::Io(_)
                | SwitchError::Timeout
                | SwitchError::ConnectionFailed(_)
                | SwitchError::NotFound(_)
                | SwitchError::Offline
        )
    }

    pub fn code(&self) -> u32 {
        match self {
            SwitchError::Io(_) => ERR_CONNECT,
            SwitchError::Json(_) => ERR_JSON,
            SwitchError::Timeout => ERR_TIMEOUT,
            SwitchError::ConnectionFailed(_) => ERR_CONNECT,
            SwitchError::NotFound(_) => ERR_NOT_FOUND,
            SwitchError::InvalidPayload => ERR_PAYLOAD,
            SwitchError::InvalidConfig(_) => ERR_PARAMS,
            SwitchError::Offline => ERR_OFFLINE,
        }
    }

    pub fn message(&self) -> &'static str {
        get_error_message(self.code()).unwrap_or("Unknown error")
    }
}

// TinyTuya Error Response Codes
define_error_codes! {
    ERR_SUCCESS = 0 => "Connection Successful",
    ERR_JSON = 900 => "Invalid JSON Response from Device",
    ERR_CONNECT = 901 => "Network Error: Unable to Connect",
    ERR_TIMEOUT = 902 => "Timeout Waiting for Device",
    ERR_PAYLOAD = 904 => "Unexpected Payload from Device",
    ERR_OFFLINE = 905 => "Network Error: Device Unreachable",
    ERR_PARAMS = 912 => "Missing Function Parameters",
    ERR_NOT_FOUND = 916 => "Device Not Found on Local Network",
}
