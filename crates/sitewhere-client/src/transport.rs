//! Byte-level transport seam between the client and a backend.

use std::io;

use thiserror::Error;

/// Errors raised by a transport or backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Send attempted while the connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The backend's outbound queue or socket is gone.
    #[error("transport closed")]
    Closed,

    /// An envelope too large for the backend's framing.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The backend refused the operation.
    #[error("rejected by backend: {reason}")]
    Rejected { reason: String },
}

impl TransportError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

/// Moves encoded envelopes to the platform.
///
/// A transport accepts whole envelopes; framing for the underlying channel
/// is its own concern.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records every send; fails all sends once `fail_with` is set.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        pub sent: Vec<Vec<u8>>,
        pub fail_with: Option<fn() -> TransportError>,
    }

    impl Transport for RecordingTransport {
        fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            if let Some(make_error) = self.fail_with {
                return Err(make_error());
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }
    }
}
