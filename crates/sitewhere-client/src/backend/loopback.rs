//! In-process backend.
//!
//! [`LoopbackBackend`] is the device side; [`LoopbackPlatform`] plays the
//! platform. The platform handle is `Clone + Send`, so tests and demos can
//! inject commands from any thread and inspect what the device sent.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use sitewhere_protocol::{
    EnvelopeReader, Header, InboundCommand, Payload, ProtocolResult, RegistrationAck,
    encode_envelope,
};

use super::{Backend, BackendEvent, SessionEvents};
use crate::config::ConnectionConfig;
use crate::transport::TransportError;

#[derive(Debug, Default)]
struct PlatformState {
    events: Option<SessionEvents>,
    hardware_id: Option<String>,
    registered: bool,
    bind_requests: usize,
    fail_next_bind: Option<String>,
    hold_binds: bool,
    outbound: Vec<Vec<u8>>,
}

impl PlatformState {
    fn emit(&self, event: BackendEvent) -> bool {
        match &self.events {
            Some(events) => events.send(event),
            None => false,
        }
    }
}

fn lock(shared: &Mutex<PlatformState>) -> MutexGuard<'_, PlatformState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Device side of an in-process connection.
#[derive(Debug)]
pub struct LoopbackBackend {
    shared: Arc<Mutex<PlatformState>>,
}

impl LoopbackBackend {
    /// Creates a connected backend/platform pair.
    pub fn pair() -> (Self, LoopbackPlatform) {
        let shared = Arc::new(Mutex::new(PlatformState::default()));
        (
            Self {
                shared: shared.clone(),
            },
            LoopbackPlatform { shared },
        )
    }
}

impl Backend for LoopbackBackend {
    fn bind(
        &mut self,
        config: &ConnectionConfig,
        events: SessionEvents,
    ) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        state.bind_requests += 1;

        if let Some(reason) = state.fail_next_bind.take() {
            debug!(session = events.session(), reason = %reason, "loopback bind refused");
            events.send(BackendEvent::BindFailed(reason));
            return Ok(());
        }

        state.hardware_id = Some(config.device_hardware_id.clone());
        state.events = Some(events);
        if state.hold_binds {
            debug!(hardware_id = %config.device_hardware_id, "loopback bind held");
        } else {
            debug!(hardware_id = %config.device_hardware_id, "loopback bound");
            state.emit(BackendEvent::Bound);
        }
        Ok(())
    }

    fn register(&mut self) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        if state.events.is_none() {
            return Err(TransportError::NotConnected);
        }
        state.registered = true;
        Ok(())
    }

    fn unregister(&mut self) -> Result<(), TransportError> {
        lock(&self.shared).registered = false;
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        state.registered = false;
        if let Some(events) = state.events.take() {
            events.send(BackendEvent::Disconnected);
        }
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = lock(&self.shared);
        if state.events.is_none() {
            return Err(TransportError::NotConnected);
        }
        trace!(bytes = bytes.len(), "loopback outbound");
        state.outbound.push(bytes.to_vec());
        Ok(())
    }
}

/// Platform side of an in-process connection.
#[derive(Debug, Clone)]
pub struct LoopbackPlatform {
    shared: Arc<Mutex<PlatformState>>,
}

impl LoopbackPlatform {
    /// Number of bind requests received so far.
    pub fn bind_requests(&self) -> usize {
        lock(&self.shared).bind_requests
    }

    pub fn is_bound(&self) -> bool {
        lock(&self.shared).events.is_some()
    }

    /// True while the device listens for inbound commands.
    pub fn is_registered(&self) -> bool {
        lock(&self.shared).registered
    }

    /// Hardware id passed with the last successful bind.
    pub fn hardware_id(&self) -> Option<String> {
        lock(&self.shared).hardware_id.clone()
    }

    /// Makes the next bind fail with `reason`.
    pub fn fail_next_bind(&self, reason: impl Into<String>) {
        lock(&self.shared).fail_next_bind = Some(reason.into());
    }

    /// Holds later binds open without confirming them until
    /// [`complete_bind`](Self::complete_bind), like a slow service.
    pub fn hold_binds(&self, hold: bool) {
        lock(&self.shared).hold_binds = hold;
    }

    /// Confirms a held bind. Returns false if no bind is open.
    pub fn complete_bind(&self) -> bool {
        lock(&self.shared).emit(BackendEvent::Bound)
    }

    /// Envelopes the device has sent, oldest first.
    pub fn outbound(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).outbound.clone()
    }

    /// Removes and returns every envelope sent so far.
    pub fn take_outbound(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut lock(&self.shared).outbound)
    }

    /// Decodes every envelope sent so far.
    pub fn decoded_outbound(&self) -> ProtocolResult<Vec<(Header, Payload)>> {
        let outbound = self.outbound();
        let mut decoded = Vec::with_capacity(outbound.len());
        for bytes in &outbound {
            let mut reader = EnvelopeReader::new(bytes);
            while let Some(envelope) = reader.next_outbound()? {
                decoded.push(envelope);
            }
        }
        Ok(decoded)
    }

    /// Delivers a system command. Returns false if the device is not
    /// registered for commands.
    pub fn deliver_system(&self, bytes: Vec<u8>) -> bool {
        let state = lock(&self.shared);
        state.registered && state.emit(BackendEvent::SystemCommand(bytes))
    }

    /// Delivers a custom command. Returns false if the device is not
    /// registered for commands.
    pub fn deliver_custom(&self, bytes: Vec<u8>) -> bool {
        let state = lock(&self.shared);
        state.registered && state.emit(BackendEvent::CustomCommand(bytes))
    }

    /// Encodes and delivers a system command.
    pub fn send_system(
        &self,
        command: InboundCommand,
        originator: Option<&str>,
        payload: Payload,
    ) -> ProtocolResult<bool> {
        let bytes = encode_envelope(&Header::inbound(command, originator), &payload)?;
        Ok(self.deliver_system(bytes))
    }

    /// Answers a registration.
    pub fn send_registration_ack(&self, ack: RegistrationAck) -> ProtocolResult<bool> {
        self.send_system(InboundCommand::AckRegistration, None, ack.into())
    }

    /// Simulates the service dropping the connection.
    pub fn drop_connection(&self) {
        let mut state = lock(&self.shared);
        state.registered = false;
        if let Some(events) = state.events.take() {
            events.send(BackendEvent::Disconnected);
        }
    }
}
