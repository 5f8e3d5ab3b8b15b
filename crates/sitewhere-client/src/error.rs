//! Client error types.

use std::io;

use sitewhere_core::IdentityError;
use sitewhere_protocol::{ArgKind, ProtocolError, RegistrationError};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An outbound message could not be handed to the transport.
    #[error("failed to send {label}: {source}")]
    SendFailed {
        label: &'static str,
        #[source]
        source: TransportError,
    },

    /// Message failed validation or encoding.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Inbound command could not be dispatched.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Platform rejected the device registration.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Device identity could not be determined.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Wraps a transport failure for the named message.
    pub fn send_failed(label: &'static str, source: TransportError) -> Self {
        Self::SendFailed { label, source }
    }

    /// Returns true when the send failed because the connection is down.
    pub fn is_not_connected(&self) -> bool {
        matches!(
            self,
            Self::SendFailed {
                source: TransportError::NotConnected,
                ..
            }
        )
    }
}

/// Errors raised while dispatching an inbound command.
///
/// These never propagate to the host; the dispatcher logs them and reports
/// them through the error callback before dropping the command.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Command bytes could not be decoded.
    #[error("failed to decode command: {0}")]
    Protocol(#[from] ProtocolError),

    /// No handler is registered under the operation name.
    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },

    /// Handlers exist for the name but none accepts these arguments.
    #[error(
        "no signature of {name} accepts ({}){}",
        format_kinds(.found),
        originator_suffix(.originator)
    )]
    NoMatchingSignature {
        name: String,
        found: Vec<ArgKind>,
        originator: bool,
    },

    /// An argument has a different type than the handler expects.
    #[error("{name}: argument {index} expected {expected}, found {found}")]
    ArgumentType {
        name: String,
        index: usize,
        expected: ArgKind,
        found: ArgKind,
    },

    /// The handler itself reported a failure.
    #[error("{name} failed: {message}")]
    Handler { name: String, message: String },
}

impl DispatchError {
    /// Creates a handler failure for `name`.
    pub fn handler(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Handler {
            name: name.into(),
            message: message.to_string(),
        }
    }
}

fn format_kinds(kinds: &[ArgKind]) -> String {
    kinds
        .iter()
        .map(ArgKind::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn originator_suffix(originator: &bool) -> &'static str {
    if *originator { " with originator" } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_failed_display() {
        let err = ClientError::send_failed("measurement", TransportError::NotConnected);
        assert_eq!(err.to_string(), "failed to send measurement: not connected");
        assert!(err.is_not_connected());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError::NoMatchingSignature {
            name: "changeBackground".into(),
            found: vec![ArgKind::Integer, ArgKind::Flag],
            originator: true,
        };
        assert_eq!(
            err.to_string(),
            "no signature of changeBackground accepts (integer, flag) with originator"
        );

        let err = DispatchError::ArgumentType {
            name: "f".into(),
            index: 0,
            expected: ArgKind::Text,
            found: ArgKind::Number,
        };
        assert_eq!(err.to_string(), "f: argument 0 expected text, found number");
    }

    #[test]
    fn registration_error_is_transparent() {
        let err = ClientError::from(RegistrationError {
            error_type: Some("DUPLICATE".into()),
            message: Some("device exists".into()),
        });
        assert_eq!(err.to_string(), "registration failed: DUPLICATE: device exists");
    }
}
