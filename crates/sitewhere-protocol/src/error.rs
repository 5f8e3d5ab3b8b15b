//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Bytes could not be decoded as the expected protobuf message.
    #[error("malformed message: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Message could not be written to the output buffer.
    #[error("failed to encode message: {0}")]
    Encode(#[from] prost::EncodeError),

    /// Input ended before the declared length was available.
    #[error("truncated message: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    /// Declared or encoded length exceeds the protocol limit.
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: u64, max: u64 },

    /// Header carries a command tag outside the known set.
    #[error("unknown command tag: {0}")]
    UnknownCommand(i32),

    /// A field failed validation before encoding.
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Bytes left over after a complete message.
    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

impl ProtocolError {
    /// Creates a field validation error.
    pub fn invalid_field(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true for malformed or truncated input.
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Self::Decode(_) | Self::Truncated { .. } | Self::MessageTooLarge { .. }
        )
    }
}

/// Registration rejected by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "registration failed: {}: {}",
    .error_type.as_deref().unwrap_or("UNSPECIFIED"),
    .message.as_deref().unwrap_or("no message")
)]
pub struct RegistrationError {
    /// Platform error code.
    pub error_type: Option<String>,
    /// Platform error message.
    pub message: Option<String>,
}
