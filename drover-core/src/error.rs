//! Domain-specific error types for the drover device-control core.
//!
//! All fallible operations return `Result<T, DroverError>`.
//! No panics on invalid input — every error is typed and recoverable.
//! At the driver boundary errors are flattened into [`ActionErrorCode`]s
//! so the dispatch layer never leaks a raw error to its consumers.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── ActionErrorCode ──────────────────────────────────────────────

/// Structured error taxonomy reported through `ActionResult::Failure`.
///
/// This is the only error vocabulary the dispatch consumers ever see;
/// everything richer stays inside the crate as [`DroverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionErrorCode {
    /// The action is not implemented by this backend.
    NotSupported,
    /// The backend refused the operation.
    PermissionDenied,
    /// A UI element the action referred to does not exist.
    ElementNotFound,
    /// An I/O deadline expired.
    Timeout,
    /// The device or stream is missing.
    NotFound,
    /// Catch-all for unexpected backend failures.
    Unknown,
}

impl std::fmt::Display for ActionErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotSupported => "NOT_SUPPORTED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ElementNotFound => "ELEMENT_NOT_FOUND",
            Self::Timeout => "TIMEOUT",
            Self::NotFound => "NOT_FOUND",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

// ── DroverError ──────────────────────────────────────────────────

/// The canonical error type for the drover core.
#[derive(Debug, Error)]
pub enum DroverError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A state machine was driven through an illegal transition.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u32 },

    /// The peer answered with something other than the required message.
    #[error("unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply { expected: &'static str, got: String },

    /// The peer refused (or never acknowledged) a stream open.
    #[error("stream {local_id} rejected by peer")]
    StreamRejected { local_id: u32 },

    /// The payload exceeds the negotiated maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    // ── Transport Errors ─────────────────────────────────────────
    /// No interface on the device exposes a usable bulk endpoint pair.
    #[error("no usable debug interface on device")]
    NoUsableInterface,

    /// The USB layer rejected an open/claim/configuration request.
    #[error("transport error: {0}")]
    Transport(String),

    /// A bulk transfer failed mid-flight.
    #[error("usb transfer failed: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    // ── Driver / Action Errors ───────────────────────────────────
    /// The backend does not implement the requested action.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// The backend refused the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A referenced UI element was not found.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// No device is registered under the given id.
    #[error("no device registered with id {0:?}")]
    DeviceNotFound(String),

    /// A neutral key name has no translation for this backend.
    #[error("key {key:?} has no {backend} mapping")]
    UnknownKey { key: String, backend: &'static str },

    /// An action payload failed validation (e.g. an empty drag path).
    #[error("invalid action payload: {0}")]
    InvalidPayload(&'static str),

    // ── Misc ─────────────────────────────────────────────────────
    /// The OS I/O layer reported an error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl DroverError {
    /// Flatten this error into the dispatch-facing taxonomy.
    pub fn code(&self) -> ActionErrorCode {
        match self {
            Self::NotSupported(_) | Self::UnknownKey { .. } => ActionErrorCode::NotSupported,
            Self::PermissionDenied(_) => ActionErrorCode::PermissionDenied,
            Self::ElementNotFound(_) => ActionErrorCode::ElementNotFound,
            Self::Timeout(_) => ActionErrorCode::Timeout,
            Self::DeviceNotFound(_) | Self::StreamRejected { .. } => ActionErrorCode::NotFound,
            _ => ActionErrorCode::Unknown,
        }
    }
}

impl From<String> for DroverError {
    fn from(s: String) -> Self {
        DroverError::Other(s)
    }
}

impl From<&str> for DroverError {
    fn from(s: &str) -> Self {
        DroverError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = DroverError::StreamRejected { local_id: 3 };
        assert!(e.to_string().contains("3"));

        let e = DroverError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn code_mapping() {
        assert_eq!(
            DroverError::NotSupported("x".into()).code(),
            ActionErrorCode::NotSupported
        );
        assert_eq!(
            DroverError::Timeout(Duration::from_secs(1)).code(),
            ActionErrorCode::Timeout
        );
        assert_eq!(
            DroverError::DeviceNotFound("d1".into()).code(),
            ActionErrorCode::NotFound
        );
        assert_eq!(
            DroverError::Other("boom".into()).code(),
            ActionErrorCode::Unknown
        );
    }

    #[test]
    fn code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ActionErrorCode::NotSupported).unwrap();
        assert_eq!(json, "\"NOT_SUPPORTED\"");
        let json = serde_json::to_string(&ActionErrorCode::ElementNotFound).unwrap();
        assert_eq!(json, "\"ELEMENT_NOT_FOUND\"");
    }

    #[test]
    fn from_string() {
        let e: DroverError = "something broke".into();
        assert!(matches!(e, DroverError::Other(_)));
    }
}
