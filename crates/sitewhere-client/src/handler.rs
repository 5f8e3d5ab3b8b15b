//! Host callbacks.

use tracing::{debug, info, warn};

use sitewhere_protocol::{DeviceStreamAck, DeviceStreamData, Header, RegistrationAck};

use crate::error::DispatchError;
use crate::transport::Transport;

/// Callbacks a host implements to react to connection and inbound events.
///
/// Every callback runs on the thread that drains the client's event
/// channel and receives the connection as a [`Transport`], so replies can be
/// sent directly with [`DeviceMessaging`](crate::DeviceMessaging). The
/// defaults only log.
pub trait ClientHandler {
    /// Bind and registration completed.
    fn on_connected(&mut self, _transport: &mut dyn Transport) {
        info!("connected");
    }

    /// The backend confirmed a disconnect, lost the connection, or failed to
    /// bind.
    fn on_disconnected(&mut self, _transport: &mut dyn Transport) {
        info!("disconnected");
    }

    /// The platform answered a registration. The ack is delivered as
    /// received, including rejections.
    fn on_registration_ack(
        &mut self,
        _transport: &mut dyn Transport,
        _header: &Header,
        ack: &RegistrationAck,
    ) {
        match ack.check() {
            Ok(state) => info!(state = ?state, "registration acknowledged"),
            Err(e) => warn!(error = %e, "registration rejected"),
        }
    }

    fn on_device_stream_ack(
        &mut self,
        _transport: &mut dyn Transport,
        _header: &Header,
        ack: &DeviceStreamAck,
    ) {
        debug!(stream_id = %ack.stream_id, state = ack.state, "stream acknowledged");
    }

    fn on_stream_data_received(
        &mut self,
        _transport: &mut dyn Transport,
        _header: &Header,
        chunk: &DeviceStreamData,
    ) {
        debug!(
            stream_id = %chunk.stream_id,
            sequence = chunk.sequence_number,
            bytes = chunk.data.len(),
            "stream data received"
        );
    }

    /// Raw custom command bytes, when the client runs without a registry.
    fn on_custom_command(&mut self, _transport: &mut dyn Transport, bytes: &[u8]) {
        debug!(bytes = bytes.len(), "custom command ignored");
    }

    /// An inbound command was dropped.
    fn on_dispatch_error(&mut self, _transport: &mut dyn Transport, error: &DispatchError) {
        warn!(error = %error, "command dropped");
    }
}
