//! Envelope codec and message types for SiteWhere devices.
//!
//! # Protocol Overview
//!
//! Every message exchanged with the platform is an envelope of two
//! protobuf messages, each prefixed with its varint length:
//! - a [`Header`] carrying the command tag and an optional originator id
//! - a payload whose type is determined by the command
//!
//! Device-to-platform commands are [`OutboundCommand`]s; platform-to-device
//! system commands are [`InboundCommand`]s. Custom commands use the named
//! [`Invocation`] format instead.
//!
//! # Example
//!
//! ```rust
//! use sitewhere_protocol::{
//!     DeviceMeasurements, EnvelopeReader, Header, Measurement, OutboundCommand, Payload,
//!     encode_envelope,
//! };
//!
//! let header = Header::outbound(OutboundCommand::SendDeviceMeasurements, None);
//! let payload = Payload::from(DeviceMeasurements {
//!     hardware_id: "dev-1".into(),
//!     measurements: vec![Measurement { name: "engine.temp".into(), value: 125.0 }],
//!     event_date: None,
//! });
//! let bytes = encode_envelope(&header, &payload).unwrap();
//!
//! let (decoded_header, decoded) = EnvelopeReader::new(&bytes).next_outbound().unwrap().unwrap();
//! assert_eq!(decoded_header, header);
//! assert_eq!(decoded, payload);
//! ```

mod envelope;
mod error;
mod invocation;
mod types;

pub use envelope::{EnvelopeReader, encode_delimited, encode_envelope, hex_dump};
pub use error::{ProtocolError, ProtocolResult, RegistrationError};
pub use invocation::{
    ArgKind, Argument, ArgumentValue, CommandInvocation, Invocation, Originator,
};
pub use types::{
    Acknowledge, DeviceAlert, DeviceLocation, DeviceMeasurements, DeviceStream, DeviceStreamAck,
    DeviceStreamAckState, DeviceStreamData, DeviceStreamDataRequest, Header, InboundCommand,
    Measurement, Metadata, OutboundCommand, Payload, PayloadKind, RegisterDevice,
    RegistrationAck, RegistrationAckState, event_date, event_time,
};

/// Maximum size of a single envelope part (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
