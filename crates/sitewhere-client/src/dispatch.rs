//! Inbound command dispatcher.
//!
//! System commands are fixed protocol messages decoded by command tag.
//! Custom commands are either handed to the host as raw bytes or decoded as
//! named invocations and resolved through a [`CommandRegistry`].
//!
//! Nothing here fails outward: decode and dispatch errors are logged,
//! reported to [`ClientHandler::on_dispatch_error`] and the command dropped.
//! Unknown system command tags are ignored without reporting, so newer
//! platforms can add commands.

use tracing::{debug, trace, warn};

use sitewhere_protocol::{
    DeviceStreamAck, DeviceStreamData, EnvelopeReader, InboundCommand, Invocation, ProtocolError,
    RegistrationAck,
};

use crate::commands::CommandRegistry;
use crate::error::DispatchError;
use crate::handler::ClientHandler;
use crate::transport::Transport;

/// How custom commands are interpreted.
pub enum CustomCommands<H> {
    /// Bytes go to [`ClientHandler::on_custom_command`].
    Raw,
    /// Bytes are decoded as named invocations.
    Named(CommandRegistry<H>),
}

impl<H> std::fmt::Debug for CustomCommands<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raw => f.write_str("Raw"),
            Self::Named(registry) => f.debug_tuple("Named").field(registry).finish(),
        }
    }
}

#[derive(Debug)]
pub struct Dispatcher<H> {
    custom: CustomCommands<H>,
}

impl<H: ClientHandler> Dispatcher<H> {
    pub fn new(custom: CustomCommands<H>) -> Self {
        Self { custom }
    }

    /// Dispatcher delivering custom commands as raw bytes.
    pub fn raw() -> Self {
        Self::new(CustomCommands::Raw)
    }

    /// Dispatcher resolving custom commands through `registry`.
    pub fn named(registry: CommandRegistry<H>) -> Self {
        Self::new(CustomCommands::Named(registry))
    }

    /// The registry, when running in named mode.
    pub fn registry_mut(&mut self) -> Option<&mut CommandRegistry<H>> {
        match &mut self.custom {
            CustomCommands::Named(registry) => Some(registry),
            CustomCommands::Raw => None,
        }
    }

    /// Handles bytes received on the system channel.
    pub fn on_system_command(&mut self, bytes: &[u8], host: &mut H, transport: &mut dyn Transport) {
        if let Err(e) = dispatch_system(bytes, host, transport) {
            report(host, transport, e);
        }
    }

    /// Handles bytes received on the custom channel.
    pub fn on_custom_command(&mut self, bytes: &[u8], host: &mut H, transport: &mut dyn Transport) {
        match &mut self.custom {
            CustomCommands::Raw => host.on_custom_command(transport, bytes),
            CustomCommands::Named(registry) => {
                let result = Invocation::decode(bytes)
                    .map_err(DispatchError::from)
                    .and_then(|invocation| registry.dispatch(host, transport, &invocation));
                if let Err(e) = result {
                    report(host, transport, e);
                }
            }
        }
    }
}

fn dispatch_system<H: ClientHandler>(
    bytes: &[u8],
    host: &mut H,
    transport: &mut dyn Transport,
) -> Result<(), DispatchError> {
    let mut reader = EnvelopeReader::new(bytes);
    let header = reader.read_header()?;

    let command = match header.inbound_command() {
        Ok(command) => command,
        Err(ProtocolError::UnknownCommand(tag)) => {
            debug!(command = tag, "ignoring unknown system command");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    trace!(
        command = ?command,
        originator = header.originator.as_deref().unwrap_or_default(),
        bytes = bytes.len(),
        "system command"
    );

    match command {
        InboundCommand::AckRegistration => {
            let ack: RegistrationAck = reader.read_delimited()?;
            host.on_registration_ack(transport, &header, &ack);
        }
        InboundCommand::AckDeviceStream => {
            let ack: DeviceStreamAck = reader.read_delimited()?;
            host.on_device_stream_ack(transport, &header, &ack);
        }
        InboundCommand::ReceiveDeviceStreamData => {
            let chunk: DeviceStreamData = reader.read_delimited()?;
            host.on_stream_data_received(transport, &header, &chunk);
        }
    }
    Ok(())
}

fn report<H: ClientHandler>(host: &mut H, transport: &mut dyn Transport, error: DispatchError) {
    warn!(error = %error, "dropping inbound command");
    host.on_dispatch_error(transport, &error);
}

#[cfg(test)]
mod tests {
    use sitewhere_protocol::{
        DeviceStreamAckState, Header, Payload, RegistrationAckState, encode_envelope,
    };

    use super::*;
    use crate::commands::Signature;
    use crate::transport::testing::RecordingTransport;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        acks: Vec<RegistrationAck>,
        errors: Vec<String>,
    }

    impl ClientHandler for Recorder {
        fn on_registration_ack(
            &mut self,
            _transport: &mut dyn Transport,
            header: &Header,
            ack: &RegistrationAck,
        ) {
            self.events.push(format!(
                "registration ack from {}",
                header.originator.as_deref().unwrap_or("-")
            ));
            self.acks.push(ack.clone());
        }

        fn on_device_stream_ack(
            &mut self,
            _transport: &mut dyn Transport,
            _header: &Header,
            ack: &DeviceStreamAck,
        ) {
            self.events.push(format!("stream ack {}", ack.stream_id));
        }

        fn on_stream_data_received(
            &mut self,
            _transport: &mut dyn Transport,
            _header: &Header,
            chunk: &DeviceStreamData,
        ) {
            self.events.push(format!("chunk {}", chunk.sequence_number));
        }

        fn on_custom_command(&mut self, _transport: &mut dyn Transport, bytes: &[u8]) {
            self.events.push(format!("raw {:?}", bytes));
        }

        fn on_dispatch_error(&mut self, _transport: &mut dyn Transport, error: &DispatchError) {
            self.errors.push(error.to_string());
        }
    }

    fn system(command: InboundCommand, payload: impl Into<Payload>) -> Vec<u8> {
        encode_envelope(&Header::inbound(command, Some("req-1")), &payload.into()).unwrap()
    }

    #[test]
    fn system_commands_reach_callbacks() {
        let mut dispatcher = Dispatcher::<Recorder>::raw();
        let mut host = Recorder::default();
        let mut transport = RecordingTransport::default();

        let ack = RegistrationAck::accepted(RegistrationAckState::NewRegistration);
        dispatcher.on_system_command(
            &system(InboundCommand::AckRegistration, ack),
            &mut host,
            &mut transport,
        );
        dispatcher.on_system_command(
            &system(
                InboundCommand::AckDeviceStream,
                DeviceStreamAck::new("s-1", DeviceStreamAckState::StreamCreated),
            ),
            &mut host,
            &mut transport,
        );
        dispatcher.on_system_command(
            &system(
                InboundCommand::ReceiveDeviceStreamData,
                DeviceStreamData {
                    hardware_id: "dev-1".into(),
                    stream_id: "s-1".into(),
                    sequence_number: 4,
                    data: vec![1],
                    event_date: None,
                },
            ),
            &mut host,
            &mut transport,
        );

        assert_eq!(
            host.events,
            vec!["registration ack from req-1", "stream ack s-1", "chunk 4"]
        );
        assert!(host.errors.is_empty());
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn registration_error_delivered_intact() {
        let mut dispatcher = Dispatcher::<Recorder>::raw();
        let mut host = Recorder::default();
        let mut transport = RecordingTransport::default();

        let ack = RegistrationAck::rejected("DUPLICATE", "device exists");
        dispatcher.on_system_command(
            &system(InboundCommand::AckRegistration, ack.clone()),
            &mut host,
            &mut transport,
        );

        assert_eq!(host.acks, vec![ack]);
        assert_eq!(host.acks[0].error_type.as_deref(), Some("DUPLICATE"));
        assert_eq!(host.acks[0].error_message.as_deref(), Some("device exists"));
        assert!(host.errors.is_empty());
    }

    #[test]
    fn unknown_system_command_ignored() {
        let mut dispatcher = Dispatcher::<Recorder>::raw();
        let mut host = Recorder::default();
        let mut transport = RecordingTransport::default();

        let header = Header {
            command: 77,
            originator: None,
        };
        let ack = RegistrationAck::accepted(RegistrationAckState::NewRegistration);
        let bytes = encode_envelope(&header, &ack.into()).unwrap();
        dispatcher.on_system_command(&bytes, &mut host, &mut transport);

        assert!(host.events.is_empty());
        assert!(host.errors.is_empty());
    }

    #[test]
    fn malformed_system_command_reported() {
        let mut dispatcher = Dispatcher::<Recorder>::raw();
        let mut host = Recorder::default();
        let mut transport = RecordingTransport::default();

        let mut bytes = system(
            InboundCommand::AckRegistration,
            RegistrationAck::accepted(RegistrationAckState::AlreadyRegistered),
        );
        bytes.truncate(bytes.len() - 1);
        dispatcher.on_system_command(&bytes, &mut host, &mut transport);

        assert!(host.events.is_empty());
        assert_eq!(host.errors.len(), 1);
        assert!(host.errors[0].starts_with("failed to decode command"));
    }

    #[test]
    fn raw_custom_command_forwarded() {
        let mut dispatcher = Dispatcher::<Recorder>::raw();
        let mut host = Recorder::default();
        let mut transport = RecordingTransport::default();

        dispatcher.on_custom_command(&[5, 6], &mut host, &mut transport);
        assert_eq!(host.events, vec!["raw [5, 6]"]);
        assert!(dispatcher.registry_mut().is_none());
    }

    #[test]
    fn named_custom_command_dispatched() {
        let mut registry = CommandRegistry::<Recorder>::new();
        registry
            .register(
                "ping",
                Signature::empty(),
                |host: &mut Recorder, _: &mut dyn Transport, _| {
                    host.events.push("ping".into());
                    Ok(())
                },
            )
            .unwrap();
        let mut dispatcher = Dispatcher::named(registry);
        let mut host = Recorder::default();
        let mut transport = RecordingTransport::default();

        let bytes = Invocation::new("ping").encode().unwrap();
        dispatcher.on_custom_command(&bytes, &mut host, &mut transport);

        let bytes = Invocation::new("reboot").encode().unwrap();
        dispatcher.on_custom_command(&bytes, &mut host, &mut transport);

        dispatcher.on_custom_command(&[0xFF], &mut host, &mut transport);

        assert_eq!(host.events, vec!["ping"]);
        assert_eq!(host.errors.len(), 2);
        assert_eq!(host.errors[0], "unknown operation: reboot");
    }
}
