//! Length-delimited envelope encoding.
//!
//! An envelope is two protobuf messages written back to back, each prefixed
//! with its length as a varint:
//!
//! ```text
//! +-------------+------------------+--------------+-------------------+
//! | len (varint)| Header bytes     | len (varint) | payload bytes     |
//! +-------------+------------------+--------------+-------------------+
//! ```
//!
//! Because every part carries its own length, envelopes can be concatenated
//! in one buffer and read back in order without an outer frame.

use std::fmt::Write as _;

use prost::Message;

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::types::*;

/// Appends `message` to `buf` with a varint length prefix.
pub fn encode_delimited<M: Message>(message: &M, buf: &mut Vec<u8>) -> ProtocolResult<()> {
    let len = message.encoded_len();
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: len as u64,
            max: MAX_MESSAGE_SIZE as u64,
        });
    }
    message.encode_length_delimited(buf)?;
    Ok(())
}

impl Payload {
    /// Appends the payload message with a varint length prefix.
    pub fn encode_delimited(&self, buf: &mut Vec<u8>) -> ProtocolResult<()> {
        match self {
            Self::RegisterDevice(m) => encode_delimited(m, buf),
            Self::Acknowledge(m) => encode_delimited(m, buf),
            Self::DeviceMeasurements(m) => encode_delimited(m, buf),
            Self::DeviceLocation(m) => encode_delimited(m, buf),
            Self::DeviceAlert(m) => encode_delimited(m, buf),
            Self::DeviceStream(m) => encode_delimited(m, buf),
            Self::DeviceStreamData(m) => encode_delimited(m, buf),
            Self::DeviceStreamDataRequest(m) => encode_delimited(m, buf),
            Self::RegistrationAck(m) => encode_delimited(m, buf),
            Self::DeviceStreamAck(m) => encode_delimited(m, buf),
        }
    }
}

/// Encodes a header followed by its payload.
///
/// # Example
///
/// ```rust
/// use sitewhere_protocol::{encode_envelope, EnvelopeReader, Header, OutboundCommand};
/// use sitewhere_protocol::{Acknowledge, Payload, PayloadKind};
///
/// let header = Header::outbound(OutboundCommand::SendAcknowledgement, Some("evt-1"));
/// let ack = Payload::from(Acknowledge {
///     hardware_id: "dev-1".into(),
///     message: Some("done".into()),
/// });
/// let bytes = encode_envelope(&header, &ack).unwrap();
///
/// let mut reader = EnvelopeReader::new(&bytes);
/// assert_eq!(reader.read_header().unwrap(), header);
/// assert_eq!(reader.read_payload(PayloadKind::Acknowledge).unwrap(), ack);
/// ```
pub fn encode_envelope(header: &Header, payload: &Payload) -> ProtocolResult<Vec<u8>> {
    let mut buffer = Vec::with_capacity(header.encoded_len() + payload_len_hint(payload) + 8);
    encode_delimited(header, &mut buffer)?;
    payload.encode_delimited(&mut buffer)?;
    Ok(buffer)
}

fn payload_len_hint(payload: &Payload) -> usize {
    match payload {
        Payload::DeviceStreamData(m) => m.data.len() + 64,
        _ => 64,
    }
}

/// Reads envelope parts sequentially from a byte slice.
///
/// Each read consumes exactly one delimited message and leaves the reader
/// positioned at the next one. A failed read consumes nothing.
#[derive(Debug, Clone)]
pub struct EnvelopeReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> EnvelopeReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Returns true once every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    /// Reads one delimited message of type `M`.
    pub fn read_delimited<M: Message + Default>(&mut self) -> ProtocolResult<M> {
        let available = self.data.len() - self.position;
        let mut cursor = self.remaining();
        if cursor.is_empty() {
            return Err(ProtocolError::Truncated {
                expected: 1,
                available: 0,
            });
        }

        let len = prost::encoding::decode_varint(&mut cursor)?;
        let prefix = available - cursor.len();

        if len > MAX_MESSAGE_SIZE as u64 {
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: MAX_MESSAGE_SIZE as u64,
            });
        }

        let len = len as usize;
        if cursor.len() < len {
            return Err(ProtocolError::Truncated {
                expected: prefix + len,
                available,
            });
        }

        let message = M::decode(&cursor[..len])?;
        self.position += prefix + len;
        Ok(message)
    }

    /// Reads the header part of an envelope.
    pub fn read_header(&mut self) -> ProtocolResult<Header> {
        self.read_delimited()
    }

    /// Reads a payload of the given kind.
    pub fn read_payload(&mut self, kind: PayloadKind) -> ProtocolResult<Payload> {
        let payload = match kind {
            PayloadKind::RegisterDevice => Payload::RegisterDevice(self.read_delimited()?),
            PayloadKind::Acknowledge => Payload::Acknowledge(self.read_delimited()?),
            PayloadKind::DeviceMeasurements => {
                Payload::DeviceMeasurements(self.read_delimited()?)
            }
            PayloadKind::DeviceLocation => Payload::DeviceLocation(self.read_delimited()?),
            PayloadKind::DeviceAlert => Payload::DeviceAlert(self.read_delimited()?),
            PayloadKind::DeviceStream => Payload::DeviceStream(self.read_delimited()?),
            PayloadKind::DeviceStreamData => Payload::DeviceStreamData(self.read_delimited()?),
            PayloadKind::DeviceStreamDataRequest => {
                Payload::DeviceStreamDataRequest(self.read_delimited()?)
            }
            PayloadKind::RegistrationAck => Payload::RegistrationAck(self.read_delimited()?),
            PayloadKind::DeviceStreamAck => Payload::DeviceStreamAck(self.read_delimited()?),
        };
        Ok(payload)
    }

    /// Reads the next device-to-platform envelope.
    ///
    /// Returns `Ok(None)` at the end of input. An unknown command leaves the
    /// payload unconsumed.
    pub fn next_outbound(&mut self) -> ProtocolResult<Option<(Header, Payload)>> {
        if self.is_empty() {
            return Ok(None);
        }
        let header = self.read_header()?;
        let command = header.outbound_command()?;
        let payload = self.read_payload(command.payload_kind())?;
        Ok(Some((header, payload)))
    }

    /// Reads the next platform-to-device system envelope.
    ///
    /// Returns `Ok(None)` at the end of input. An unknown command leaves the
    /// payload unconsumed.
    pub fn next_inbound(&mut self) -> ProtocolResult<Option<(Header, Payload)>> {
        if self.is_empty() {
            return Ok(None);
        }
        let header = self.read_header()?;
        let command = header.inbound_command()?;
        let payload = self.read_payload(command.payload_kind())?;
        Ok(Some((header, payload)))
    }
}

/// Formats bytes as space separated uppercase hex, for debug logging.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", byte);
    }
    out
}
