//! Outbound message builder.
//!
//! [`DeviceMessaging`] is implemented for every [`Transport`], so hosts call
//! these operations directly on a connection or on the transport handed to
//! a callback. Each call validates its fields, encodes one envelope and
//! performs exactly one send. Nothing is retried.

use chrono::Utc;
use tracing::{Level, debug, enabled};

use sitewhere_protocol::{
    Acknowledge, DeviceAlert, DeviceLocation, DeviceMeasurements, DeviceStream, DeviceStreamData,
    DeviceStreamDataRequest, Header, Measurement, OutboundCommand, Payload, ProtocolError,
    RegisterDevice, encode_envelope, event_date, hex_dump,
};

use crate::error::{ClientError, ClientResult};
use crate::transport::Transport;

/// Device-to-platform operations.
pub trait DeviceMessaging: Transport {
    /// Registers the device with the platform.
    fn register_device(
        &mut self,
        hardware_id: &str,
        specification_token: &str,
        site_token: Option<&str>,
        originator: Option<&str>,
    ) -> ClientResult<()> {
        let registration = RegisterDevice {
            hardware_id: hardware_id.to_string(),
            specification_token: specification_token.to_string(),
            metadata: Vec::new(),
            site_token: site_token.map(str::to_string),
        };
        self.send_registration(registration, originator)
    }

    /// Sends a prepared registration, e.g. one carrying metadata.
    fn send_registration(
        &mut self,
        registration: RegisterDevice,
        originator: Option<&str>,
    ) -> ClientResult<()> {
        require_text("hardware_id", &registration.hardware_id)?;
        require_text("specification_token", &registration.specification_token)?;
        send_envelope(
            self,
            "registration",
            OutboundCommand::SendRegistration,
            originator,
            registration.into(),
        )
    }

    /// Acknowledges a command, usually with the command's originator.
    fn send_ack(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        message: Option<&str>,
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        let ack = Acknowledge {
            hardware_id: hardware_id.to_string(),
            message: message.map(str::to_string),
        };
        send_envelope(
            self,
            "acknowledgement",
            OutboundCommand::SendAcknowledgement,
            originator,
            ack.into(),
        )
    }

    fn send_measurement(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        name: &str,
        value: f64,
    ) -> ClientResult<()> {
        self.send_measurements(hardware_id, originator, &[(name, value)])
    }

    /// Sends several measurements in one envelope.
    fn send_measurements(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        values: &[(&str, f64)],
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        if values.is_empty() {
            return Err(ProtocolError::invalid_field("measurements", "must not be empty").into());
        }

        let mut measurements = Vec::with_capacity(values.len());
        for (name, value) in values {
            require_text("measurement name", name)?;
            require_finite("measurement value", *value)?;
            measurements.push(Measurement {
                name: name.to_string(),
                value: *value,
            });
        }

        let payload = DeviceMeasurements {
            hardware_id: hardware_id.to_string(),
            measurements,
            event_date: now(),
        };
        send_envelope(
            self,
            "measurement",
            OutboundCommand::SendDeviceMeasurements,
            originator,
            payload.into(),
        )
    }

    fn send_location(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        latitude: f64,
        longitude: f64,
        elevation: Option<f64>,
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        require_finite("latitude", latitude)?;
        require_finite("longitude", longitude)?;
        if let Some(elevation) = elevation {
            require_finite("elevation", elevation)?;
        }

        let location = DeviceLocation {
            hardware_id: hardware_id.to_string(),
            latitude,
            longitude,
            elevation,
            event_date: now(),
        };
        send_envelope(
            self,
            "location",
            OutboundCommand::SendDeviceLocation,
            originator,
            location.into(),
        )
    }

    fn send_alert(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        alert_type: &str,
        message: &str,
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        require_text("alert_type", alert_type)?;

        let alert = DeviceAlert {
            hardware_id: hardware_id.to_string(),
            alert_type: alert_type.to_string(),
            message: message.to_string(),
            event_date: now(),
        };
        send_envelope(
            self,
            "alert",
            OutboundCommand::SendDeviceAlert,
            originator,
            alert.into(),
        )
    }

    /// Asks the platform to create a stream; the answer arrives as a stream ack.
    fn create_device_stream(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        stream_id: &str,
        content_type: &str,
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        require_text("stream_id", stream_id)?;

        let stream = DeviceStream {
            hardware_id: hardware_id.to_string(),
            stream_id: stream_id.to_string(),
            content_type: content_type.to_string(),
        };
        send_envelope(
            self,
            "stream create",
            OutboundCommand::SendDeviceStream,
            originator,
            stream.into(),
        )
    }

    fn send_device_stream_data(
        &mut self,
        hardware_id: &str,
        originator: Option<&str>,
        stream_id: &str,
        sequence_number: u64,
        data: &[u8],
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        require_text("stream_id", stream_id)?;

        let chunk = DeviceStreamData {
            hardware_id: hardware_id.to_string(),
            stream_id: stream_id.to_string(),
            sequence_number,
            data: data.to_vec(),
            event_date: now(),
        };
        send_envelope(
            self,
            "stream data",
            OutboundCommand::SendDeviceStreamData,
            originator,
            chunk.into(),
        )
    }

    /// Requests a chunk back; it arrives as a stream data system command.
    fn request_device_stream_data(
        &mut self,
        hardware_id: &str,
        stream_id: &str,
        sequence_number: u64,
    ) -> ClientResult<()> {
        require_text("hardware_id", hardware_id)?;
        require_text("stream_id", stream_id)?;

        let request = DeviceStreamDataRequest {
            hardware_id: hardware_id.to_string(),
            stream_id: stream_id.to_string(),
            sequence_number,
        };
        send_envelope(
            self,
            "stream data request",
            OutboundCommand::RequestDeviceStreamData,
            None,
            request.into(),
        )
    }
}

impl<T: Transport + ?Sized> DeviceMessaging for T {}

fn send_envelope<T: Transport + ?Sized>(
    transport: &mut T,
    label: &'static str,
    command: OutboundCommand,
    originator: Option<&str>,
    payload: Payload,
) -> ClientResult<()> {
    let header = Header::outbound(command, originator);
    let bytes = encode_envelope(&header, &payload)?;

    if enabled!(Level::DEBUG) {
        debug!(
            command = ?command,
            originator = originator.unwrap_or_default(),
            bytes = bytes.len(),
            hex = %hex_dump(&bytes),
            "sending {}", label
        );
    }

    transport
        .send(&bytes)
        .map_err(|source| ClientError::send_failed(label, source))
}

fn require_text(field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.trim().is_empty() {
        return Err(ProtocolError::invalid_field(field, "must not be empty"));
    }
    Ok(())
}

fn require_finite(field: &'static str, value: f64) -> Result<(), ProtocolError> {
    if !value.is_finite() {
        return Err(ProtocolError::invalid_field(
            field,
            format!("must be finite, got {}", value),
        ));
    }
    Ok(())
}

fn now() -> Option<u64> {
    event_date(Utc::now())
}

#[cfg(test)]
mod tests {
    use sitewhere_protocol::{EnvelopeReader, event_time};

    use super::*;
    use crate::transport::TransportError;
    use crate::transport::testing::RecordingTransport;

    fn decode(bytes: &[u8]) -> (Header, Payload) {
        let mut reader = EnvelopeReader::new(bytes);
        let envelope = reader.next_outbound().unwrap().unwrap();
        assert!(reader.is_empty());
        envelope
    }

    #[test]
    fn send_measurement_envelope() {
        let mut transport = RecordingTransport::default();
        transport
            .send_measurement("dev-1", None, "engine.temp", 125.0)
            .unwrap();

        assert_eq!(transport.sent.len(), 1);
        let (header, payload) = decode(&transport.sent[0]);
        assert_eq!(
            header.outbound_command().unwrap(),
            OutboundCommand::SendDeviceMeasurements
        );
        assert_eq!(header.originator, None);

        let Payload::DeviceMeasurements(m) = payload else {
            panic!("unexpected payload");
        };
        assert_eq!(m.hardware_id, "dev-1");
        assert_eq!(m.measurements.len(), 1);
        assert_eq!(m.measurements[0].name, "engine.temp");
        assert_eq!(m.measurements[0].value, 125.0);
        assert!(event_time(m.event_date).is_some());
    }

    #[test]
    fn registration_carries_site_and_originator() {
        let mut transport = RecordingTransport::default();
        transport
            .register_device("dev-1", "spec-token", Some("site-1"), Some("req-1"))
            .unwrap();

        let (header, payload) = decode(&transport.sent[0]);
        assert_eq!(header.originator.as_deref(), Some("req-1"));
        assert_eq!(
            payload,
            Payload::RegisterDevice(RegisterDevice {
                hardware_id: "dev-1".into(),
                specification_token: "spec-token".into(),
                metadata: vec![],
                site_token: Some("site-1".into()),
            })
        );
    }

    #[test]
    fn location_accepts_negative_coordinates() {
        let mut transport = RecordingTransport::default();
        transport
            .send_location("dev-1", None, -33.75, -151.25, Some(0.0))
            .unwrap();

        let (_, payload) = decode(&transport.sent[0]);
        let Payload::DeviceLocation(location) = payload else {
            panic!("unexpected payload");
        };
        assert_eq!(location.latitude, -33.75);
        assert_eq!(location.longitude, -151.25);
        assert_eq!(location.elevation, Some(0.0));
    }

    #[test]
    fn non_finite_values_rejected_before_send() {
        let mut transport = RecordingTransport::default();

        let err = transport
            .send_measurement("dev-1", None, "x", f64::NAN)
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::InvalidField { .. })
        ));

        let err = transport
            .send_location("dev-1", None, 1.0, f64::INFINITY, None)
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn empty_hardware_id_rejected() {
        let mut transport = RecordingTransport::default();
        let err = transport.send_alert("", None, "a", "b").unwrap_err();
        assert!(err.to_string().contains("hardware_id"));
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn transport_failure_wrapped_as_send_failed() {
        let mut transport = RecordingTransport {
            fail_with: Some(|| TransportError::NotConnected),
            ..Default::default()
        };
        let err = transport
            .create_device_stream("dev-1", None, "s-1", "audio/x-ac3")
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::SendFailed {
                label: "stream create",
                source: TransportError::NotConnected
            }
        ));
    }

    #[test]
    fn stream_operations_one_send_each() {
        let mut transport = RecordingTransport::default();
        transport
            .send_device_stream_data("dev-1", Some("o"), "s-1", 7, &[1, 2, 3])
            .unwrap();
        transport.request_device_stream_data("dev-1", "s-1", 7).unwrap();
        transport.send_ack("dev-1", Some("cmd-1"), Some("done")).unwrap();
        assert_eq!(transport.sent.len(), 3);

        let (header, payload) = decode(&transport.sent[1]);
        assert_eq!(
            header.outbound_command().unwrap(),
            OutboundCommand::RequestDeviceStreamData
        );
        assert_eq!(
            payload,
            Payload::DeviceStreamDataRequest(DeviceStreamDataRequest {
                hardware_id: "dev-1".into(),
                stream_id: "s-1".into(),
                sequence_number: 7,
            })
        );
    }

    #[test]
    fn batch_measurements() {
        let mut transport = RecordingTransport::default();
        transport
            .send_measurements("dev-1", None, &[("a", 1.0), ("b", 0.0)])
            .unwrap();
        let (_, payload) = decode(&transport.sent[0]);
        let Payload::DeviceMeasurements(m) = payload else {
            panic!("unexpected payload");
        };
        assert_eq!(m.measurements.len(), 2);

        assert!(transport.send_measurements("dev-1", None, &[]).is_err());
    }
}
