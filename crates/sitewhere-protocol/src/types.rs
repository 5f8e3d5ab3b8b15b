//! Command sets, headers and payload messages.
//!
//! Messages are plain prost structs; field tags are part of the wire contract
//! with the platform and must not be renumbered.

use chrono::{DateTime, TimeZone, Utc};
use prost::{Enumeration, Message};

use crate::error::{ProtocolError, ProtocolResult, RegistrationError};

/// Commands a device sends to the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum OutboundCommand {
    SendRegistration = 1,
    SendAcknowledgement = 2,
    SendDeviceLocation = 3,
    SendDeviceAlert = 4,
    SendDeviceMeasurements = 5,
    SendDeviceStream = 6,
    SendDeviceStreamData = 7,
    RequestDeviceStreamData = 8,
}

impl OutboundCommand {
    /// Payload message that follows a header carrying this command.
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Self::SendRegistration => PayloadKind::RegisterDevice,
            Self::SendAcknowledgement => PayloadKind::Acknowledge,
            Self::SendDeviceLocation => PayloadKind::DeviceLocation,
            Self::SendDeviceAlert => PayloadKind::DeviceAlert,
            Self::SendDeviceMeasurements => PayloadKind::DeviceMeasurements,
            Self::SendDeviceStream => PayloadKind::DeviceStream,
            Self::SendDeviceStreamData => PayloadKind::DeviceStreamData,
            Self::RequestDeviceStreamData => PayloadKind::DeviceStreamDataRequest,
        }
    }
}

/// System commands the platform sends to a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum InboundCommand {
    AckRegistration = 1,
    AckDeviceStream = 2,
    ReceiveDeviceStreamData = 3,
}

impl InboundCommand {
    /// Payload message that follows a header carrying this command.
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Self::AckRegistration => PayloadKind::RegistrationAck,
            Self::AckDeviceStream => PayloadKind::DeviceStreamAck,
            Self::ReceiveDeviceStreamData => PayloadKind::DeviceStreamData,
        }
    }
}

/// First part of every envelope.
///
/// The command is kept as the raw tag so that headers from newer platform
/// versions still decode; classification happens separately.
#[derive(Clone, PartialEq, Message)]
pub struct Header {
    #[prost(int32, tag = "1")]
    pub command: i32,
    /// Correlates a response with the request that triggered it.
    #[prost(string, optional, tag = "2")]
    pub originator: Option<String>,
}

impl Header {
    /// Header for a device-to-platform message.
    pub fn outbound(command: OutboundCommand, originator: Option<&str>) -> Self {
        Self {
            command: command.into(),
            originator: originator.map(str::to_string),
        }
    }

    /// Header for a platform-to-device message.
    pub fn inbound(command: InboundCommand, originator: Option<&str>) -> Self {
        Self {
            command: command.into(),
            originator: originator.map(str::to_string),
        }
    }

    /// Classifies the tag as an outbound command.
    pub fn outbound_command(&self) -> ProtocolResult<OutboundCommand> {
        OutboundCommand::try_from(self.command)
            .map_err(|_| ProtocolError::UnknownCommand(self.command))
    }

    /// Classifies the tag as an inbound system command.
    pub fn inbound_command(&self) -> ProtocolResult<InboundCommand> {
        InboundCommand::try_from(self.command)
            .map_err(|_| ProtocolError::UnknownCommand(self.command))
    }
}

/// Name/value pair attached to a registration.
#[derive(Clone, PartialEq, Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct RegisterDevice {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(string, tag = "2")]
    pub specification_token: String,
    #[prost(message, repeated, tag = "3")]
    pub metadata: Vec<Metadata>,
    #[prost(string, optional, tag = "4")]
    pub site_token: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Acknowledge {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
}

/// A single named measurement value.
#[derive(Clone, PartialEq, Message)]
pub struct Measurement {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(double, tag = "2")]
    pub value: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceMeasurements {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(message, repeated, tag = "2")]
    pub measurements: Vec<Measurement>,
    /// Milliseconds since the Unix epoch.
    #[prost(fixed64, optional, tag = "3")]
    pub event_date: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceLocation {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(double, tag = "2")]
    pub latitude: f64,
    #[prost(double, tag = "3")]
    pub longitude: f64,
    #[prost(double, optional, tag = "4")]
    pub elevation: Option<f64>,
    #[prost(fixed64, optional, tag = "5")]
    pub event_date: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceAlert {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(string, tag = "2")]
    pub alert_type: String,
    #[prost(string, tag = "3")]
    pub message: String,
    #[prost(fixed64, optional, tag = "4")]
    pub event_date: Option<u64>,
}

/// Request to create a stream of binary chunks.
#[derive(Clone, PartialEq, Message)]
pub struct DeviceStream {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(string, tag = "2")]
    pub stream_id: String,
    #[prost(string, tag = "3")]
    pub content_type: String,
}

/// One chunk of stream data, in either direction.
#[derive(Clone, PartialEq, Message)]
pub struct DeviceStreamData {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(string, tag = "2")]
    pub stream_id: String,
    #[prost(fixed64, tag = "3")]
    pub sequence_number: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
    #[prost(fixed64, optional, tag = "5")]
    pub event_date: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct DeviceStreamDataRequest {
    #[prost(string, tag = "1")]
    pub hardware_id: String,
    #[prost(string, tag = "2")]
    pub stream_id: String,
    #[prost(fixed64, tag = "3")]
    pub sequence_number: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum RegistrationAckState {
    NewRegistration = 1,
    AlreadyRegistered = 2,
    RegistrationError = 3,
}

/// Platform response to a registration request.
#[derive(Clone, PartialEq, Message)]
pub struct RegistrationAck {
    #[prost(enumeration = "RegistrationAckState", tag = "1")]
    pub state: i32,
    #[prost(string, optional, tag = "2")]
    pub error_type: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub error_message: Option<String>,
}

impl RegistrationAck {
    /// Successful acknowledgement.
    pub fn accepted(state: RegistrationAckState) -> Self {
        Self {
            state: state.into(),
            error_type: None,
            error_message: None,
        }
    }

    /// Rejected registration with the platform's error code and message.
    pub fn rejected(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            state: RegistrationAckState::RegistrationError.into(),
            error_type: Some(error_type.into()),
            error_message: Some(error_message.into()),
        }
    }

    /// Returns the state, or a [`RegistrationError`] when the platform
    /// rejected the device or sent a state this client does not know.
    pub fn check(&self) -> Result<RegistrationAckState, RegistrationError> {
        match RegistrationAckState::try_from(self.state) {
            Ok(RegistrationAckState::RegistrationError) => Err(RegistrationError {
                error_type: self.error_type.clone(),
                message: self.error_message.clone(),
            }),
            Ok(state) => Ok(state),
            Err(_) => Err(RegistrationError {
                error_type: Some(format!("UNKNOWN_STATE_{}", self.state)),
                message: self.error_message.clone(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Enumeration)]
#[repr(i32)]
pub enum DeviceStreamAckState {
    StreamCreated = 1,
    StreamExists = 2,
    StreamFailed = 3,
}

/// Platform response to a stream create request.
#[derive(Clone, PartialEq, Message)]
pub struct DeviceStreamAck {
    #[prost(string, tag = "1")]
    pub stream_id: String,
    #[prost(enumeration = "DeviceStreamAckState", tag = "2")]
    pub state: i32,
}

impl DeviceStreamAck {
    pub fn new(stream_id: impl Into<String>, state: DeviceStreamAckState) -> Self {
        Self {
            stream_id: stream_id.into(),
            state: state.into(),
        }
    }

    /// True when the stream can receive data.
    pub fn is_usable(&self) -> bool {
        matches!(
            DeviceStreamAckState::try_from(self.state),
            Ok(DeviceStreamAckState::StreamCreated | DeviceStreamAckState::StreamExists)
        )
    }
}

/// Converts an event date field to a timestamp.
pub fn event_time(event_date: Option<u64>) -> Option<DateTime<Utc>> {
    let millis = i64::try_from(event_date?).ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Event date for a timestamp, in milliseconds since the epoch.
pub fn event_date(time: DateTime<Utc>) -> Option<u64> {
    u64::try_from(time.timestamp_millis()).ok()
}

/// Identifies which payload message to decode after a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    RegisterDevice,
    Acknowledge,
    DeviceMeasurements,
    DeviceLocation,
    DeviceAlert,
    DeviceStream,
    DeviceStreamData,
    DeviceStreamDataRequest,
    RegistrationAck,
    DeviceStreamAck,
}

/// Second part of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    RegisterDevice(RegisterDevice),
    Acknowledge(Acknowledge),
    DeviceMeasurements(DeviceMeasurements),
    DeviceLocation(DeviceLocation),
    DeviceAlert(DeviceAlert),
    DeviceStream(DeviceStream),
    DeviceStreamData(DeviceStreamData),
    DeviceStreamDataRequest(DeviceStreamDataRequest),
    RegistrationAck(RegistrationAck),
    DeviceStreamAck(DeviceStreamAck),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::RegisterDevice(_) => PayloadKind::RegisterDevice,
            Self::Acknowledge(_) => PayloadKind::Acknowledge,
            Self::DeviceMeasurements(_) => PayloadKind::DeviceMeasurements,
            Self::DeviceLocation(_) => PayloadKind::DeviceLocation,
            Self::DeviceAlert(_) => PayloadKind::DeviceAlert,
            Self::DeviceStream(_) => PayloadKind::DeviceStream,
            Self::DeviceStreamData(_) => PayloadKind::DeviceStreamData,
            Self::DeviceStreamDataRequest(_) => PayloadKind::DeviceStreamDataRequest,
            Self::RegistrationAck(_) => PayloadKind::RegistrationAck,
            Self::DeviceStreamAck(_) => PayloadKind::DeviceStreamAck,
        }
    }
}

macro_rules! payload_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Payload {
                fn from(message: $variant) -> Self {
                    Payload::$variant(message)
                }
            }
        )*
    };
}

payload_from!(
    RegisterDevice,
    Acknowledge,
    DeviceMeasurements,
    DeviceLocation,
    DeviceAlert,
    DeviceStream,
    DeviceStreamData,
    DeviceStreamDataRequest,
    RegistrationAck,
    DeviceStreamAck,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_classifies_known_commands() {
        let header = Header::outbound(OutboundCommand::SendDeviceAlert, Some("evt-9"));
        assert_eq!(
            header.outbound_command().unwrap(),
            OutboundCommand::SendDeviceAlert
        );
        assert_eq!(header.originator.as_deref(), Some("evt-9"));
    }

    #[test]
    fn header_rejects_unknown_tag() {
        let header = Header {
            command: 42,
            originator: None,
        };
        assert!(matches!(
            header.inbound_command(),
            Err(ProtocolError::UnknownCommand(42))
        ));
    }

    #[test]
    fn registration_ack_check() {
        let ok = RegistrationAck::accepted(RegistrationAckState::AlreadyRegistered);
        assert_eq!(ok.check().unwrap(), RegistrationAckState::AlreadyRegistered);

        let err = RegistrationAck::rejected("DUPLICATE", "device exists")
            .check()
            .unwrap_err();
        assert_eq!(err.error_type.as_deref(), Some("DUPLICATE"));
        assert_eq!(err.to_string(), "registration failed: DUPLICATE: device exists");
    }

    #[test]
    fn registration_ack_unknown_state_is_error() {
        let ack = RegistrationAck {
            state: 17,
            error_type: None,
            error_message: None,
        };
        let err = ack.check().unwrap_err();
        assert_eq!(err.error_type.as_deref(), Some("UNKNOWN_STATE_17"));
    }

    #[test]
    fn stream_ack_usable_states() {
        assert!(DeviceStreamAck::new("s", DeviceStreamAckState::StreamCreated).is_usable());
        assert!(DeviceStreamAck::new("s", DeviceStreamAckState::StreamExists).is_usable());
        assert!(!DeviceStreamAck::new("s", DeviceStreamAckState::StreamFailed).is_usable());
    }

    #[test]
    fn event_date_conversion() {
        let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let date = event_date(time);
        assert_eq!(date, Some(1_709_294_400_000));
        assert_eq!(event_time(date), Some(time));
        assert_eq!(event_time(None), None);
    }

    #[test]
    fn payload_kind_matches_commands() {
        assert_eq!(
            OutboundCommand::SendDeviceMeasurements.payload_kind(),
            PayloadKind::DeviceMeasurements
        );
        assert_eq!(
            OutboundCommand::RequestDeviceStreamData.payload_kind(),
            PayloadKind::DeviceStreamDataRequest
        );
        assert_eq!(
            InboundCommand::ReceiveDeviceStreamData.payload_kind(),
            PayloadKind::DeviceStreamData
        );
        let payload = Payload::from(DeviceStream {
            hardware_id: "dev-1".into(),
            stream_id: "s-1".into(),
            content_type: "audio/x-ac3".into(),
        });
        assert_eq!(
            payload.kind(),
            OutboundCommand::SendDeviceStream.payload_kind()
        );
    }
}
