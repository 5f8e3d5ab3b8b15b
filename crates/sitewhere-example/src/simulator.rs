//! Stand-in platform for `--loopback` runs.
//!
//! Answers registrations and stream requests the way a platform would, and
//! after the first registration sends the demo custom commands once.

use std::collections::HashSet;

use tracing::{debug, info, trace, warn};

use sitewhere_client::LoopbackPlatform;
use sitewhere_protocol::{
    DeviceStreamAck, DeviceStreamAckState, EnvelopeReader, Header, InboundCommand, Invocation,
    Payload, ProtocolResult, RegistrationAck, RegistrationAckState,
};

#[derive(Debug)]
pub struct PlatformSimulator {
    platform: LoopbackPlatform,
    registered: HashSet<String>,
    demo_sent: bool,
    chunks_received: u64,
}

impl PlatformSimulator {
    pub fn new(platform: LoopbackPlatform) -> Self {
        Self {
            platform,
            registered: HashSet::new(),
            demo_sent: false,
            chunks_received: 0,
        }
    }

    /// Stream chunks received so far.
    pub fn chunks_received(&self) -> u64 {
        self.chunks_received
    }

    /// Handles every envelope the device sent since the last call and
    /// returns how many there were.
    pub fn respond(&mut self) -> usize {
        let mut handled = 0;
        for bytes in self.platform.take_outbound() {
            let mut reader = EnvelopeReader::new(&bytes);
            loop {
                match reader.next_outbound() {
                    Ok(Some((header, payload))) => {
                        handled += 1;
                        if let Err(e) = self.answer(&header, payload) {
                            warn!(error = %e, "simulator could not answer");
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "simulator received malformed envelope");
                        break;
                    }
                }
            }
        }
        handled
    }

    fn answer(&mut self, header: &Header, payload: Payload) -> ProtocolResult<()> {
        let originator = header.originator.as_deref();
        match payload {
            Payload::RegisterDevice(registration) => {
                let state = if self.registered.insert(registration.hardware_id.clone()) {
                    RegistrationAckState::NewRegistration
                } else {
                    RegistrationAckState::AlreadyRegistered
                };
                info!(
                    hardware_id = %registration.hardware_id,
                    state = ?state,
                    "platform: registration"
                );
                self.platform.send_system(
                    InboundCommand::AckRegistration,
                    originator,
                    RegistrationAck::accepted(state).into(),
                )?;
                self.send_demo_commands()?;
            }
            Payload::DeviceStream(stream) => {
                info!(
                    stream_id = %stream.stream_id,
                    content_type = %stream.content_type,
                    "platform: stream created"
                );
                self.platform.send_system(
                    InboundCommand::AckDeviceStream,
                    originator,
                    DeviceStreamAck::new(stream.stream_id, DeviceStreamAckState::StreamCreated)
                        .into(),
                )?;
            }
            Payload::DeviceStreamData(chunk) => {
                self.chunks_received += 1;
                trace!(
                    sequence = chunk.sequence_number,
                    bytes = chunk.data.len(),
                    "platform: chunk"
                );
            }
            Payload::Acknowledge(ack) => {
                info!(
                    originator = originator.unwrap_or_default(),
                    message = ack.message.as_deref().unwrap_or_default(),
                    "platform: ack"
                );
            }
            other => debug!(kind = ?other.kind(), "platform: event"),
        }
        Ok(())
    }

    fn send_demo_commands(&mut self) -> ProtocolResult<()> {
        if self.demo_sent {
            return Ok(());
        }
        self.demo_sent = true;

        let commands = [
            Invocation::new("ping").with_originator("demo-ping"),
            Invocation::new("testEvents").with_originator("demo-events"),
            Invocation::new("changeBackground")
                .arg("#0033cc")
                .with_originator("demo-background"),
        ];
        for invocation in commands {
            let name = invocation.name.clone();
            if !self.platform.deliver_custom(invocation.encode()?) {
                debug!(command = %name, "device not listening for commands");
            }
        }
        Ok(())
    }
}
