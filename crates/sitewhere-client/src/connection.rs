//! Connection lifecycle.
//!
//! ```text
//! Disconnected --connect--> Connecting --Bound--> Connected
//!      ^                        |                     |
//!      +------BindFailed--------+                     |
//!      +-----------disconnect / Disconnected ---------+
//! ```
//!
//! State only changes on the host's thread: in [`Connection::connect`] and
//! [`Connection::disconnect`], and while applying backend events drained
//! from the event channel.
//!
//! Each connect opens a new session. Only events from the latest session
//! move the state; anything an earlier session still delivers is dropped.

use tracing::{debug, info, warn};

use crate::backend::{
    Backend, BackendEvent, EventSender, SessionEvent, SessionEvents, SessionId,
};
use crate::config::ConnectionConfig;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Lifecycle change the host should be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Connected,
    Disconnected,
}

/// Owns a backend and tracks whether it may be used.
#[derive(Debug)]
pub struct Connection<B> {
    backend: B,
    events: EventSender,
    state: ConnectionState,
    session: SessionId,
}

impl<B: Backend> Connection<B> {
    /// Creates a disconnected connection whose backend reports to `events`.
    pub fn new(backend: B, events: EventSender) -> Self {
        Self {
            backend,
            events,
            state: ConnectionState::Disconnected,
            session: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Session opened by the latest connect; 0 before the first.
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// True if `session` is the latest one.
    pub fn is_current(&self, session: SessionId) -> bool {
        session == self.session
    }

    fn session_events(&self) -> SessionEvents {
        SessionEvents::new(self.session, self.events.clone())
    }

    /// Starts binding. Does nothing while connecting or connected.
    ///
    /// The outcome arrives as a backend event; a bind the backend refuses
    /// outright is reported the same way.
    pub fn connect(&mut self, config: &ConnectionConfig) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = ?self.state, "connect ignored");
            return;
        }

        self.session += 1;
        info!(
            address = %config.address(),
            hardware_id = %config.device_hardware_id,
            session = self.session,
            "connecting"
        );
        self.state = ConnectionState::Connecting;
        let events = self.session_events();
        if let Err(e) = self.backend.bind(config, events.clone()) {
            warn!(error = %e, "bind failed");
            events.send(BackendEvent::BindFailed(e.to_string()));
        }
    }

    /// Unregisters and unbinds. Does nothing while disconnected.
    ///
    /// The state is `Disconnected` when this returns; the backend confirms
    /// later with a `Disconnected` event.
    pub fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Disconnected => {
                debug!("disconnect ignored");
                return;
            }
            ConnectionState::Connected => {
                if let Err(e) = self.backend.unregister() {
                    warn!(error = %e, "unregister failed");
                }
            }
            ConnectionState::Connecting => {}
        }

        self.state = ConnectionState::Disconnected;
        if let Err(e) = self.backend.unbind() {
            warn!(error = %e, "unbind failed");
            self.session_events().send(BackendEvent::Disconnected);
        }
        info!("disconnecting");
    }

    /// Applies a lifecycle event. Command events and events from an earlier
    /// session yield `None`.
    pub fn apply(&mut self, stamped: &SessionEvent) -> Option<Transition> {
        if !self.is_current(stamped.session) {
            debug!(
                session = stamped.session,
                current = self.session,
                "event from earlier session ignored"
            );
            return None;
        }

        match &stamped.event {
            BackendEvent::Bound => {
                if self.state != ConnectionState::Connecting {
                    debug!(state = ?self.state, "late bind confirmation ignored");
                    return None;
                }
                if let Err(e) = self.backend.register() {
                    warn!(error = %e, "register failed");
                }
                self.state = ConnectionState::Connected;
                info!("connected");
                Some(Transition::Connected)
            }
            BackendEvent::BindFailed(reason) => {
                if self.state == ConnectionState::Connected {
                    debug!(reason = %reason, "stale bind failure ignored");
                    return None;
                }
                warn!(reason = %reason, "bind failed");
                self.state = ConnectionState::Disconnected;
                Some(Transition::Disconnected)
            }
            BackendEvent::Disconnected => {
                self.state = ConnectionState::Disconnected;
                info!("disconnected");
                Some(Transition::Disconnected)
            }
            BackendEvent::SystemCommand(_) | BackendEvent::CustomCommand(_) => None,
        }
    }
}

impl<B: Backend> Transport for Connection<B> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        self.backend.send(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EventReceiver, LoopbackBackend, LoopbackPlatform, event_channel};

    fn setup() -> (Connection<LoopbackBackend>, LoopbackPlatform, EventReceiver) {
        let (backend, platform) = LoopbackBackend::pair();
        let (tx, rx) = event_channel();
        (Connection::new(backend, tx), platform, rx)
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("localhost", 1883, "dev-1")
    }

    fn drain(
        connection: &mut Connection<LoopbackBackend>,
        rx: &mut EventReceiver,
    ) -> Vec<Transition> {
        let mut transitions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            transitions.extend(connection.apply(&event));
        }
        transitions
    }

    #[test]
    fn connect_twice_binds_once() {
        let (mut connection, platform, mut rx) = setup();

        connection.connect(&config());
        connection.connect(&config());
        assert_eq!(connection.state(), ConnectionState::Connecting);
        assert_eq!(platform.bind_requests(), 1);

        assert_eq!(drain(&mut connection, &mut rx), vec![Transition::Connected]);
        assert!(connection.is_connected());
        assert!(platform.is_registered());

        connection.connect(&config());
        assert_eq!(platform.bind_requests(), 1);
    }

    #[test]
    fn disconnect_when_disconnected_is_noop() {
        let (mut connection, platform, mut rx) = setup();
        connection.disconnect();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(drain(&mut connection, &mut rx).is_empty());
        assert_eq!(platform.bind_requests(), 0);
    }

    #[test]
    fn disconnect_is_synchronous_confirmation_async() {
        let (mut connection, platform, mut rx) = setup();
        connection.connect(&config());
        drain(&mut connection, &mut rx);

        connection.disconnect();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(!platform.is_registered());
        assert!(matches!(
            connection.send(&[1]),
            Err(TransportError::NotConnected)
        ));

        assert_eq!(
            drain(&mut connection, &mut rx),
            vec![Transition::Disconnected]
        );
    }

    #[test]
    fn send_requires_connected() {
        let (mut connection, platform, mut rx) = setup();
        assert!(matches!(
            connection.send(&[1]),
            Err(TransportError::NotConnected)
        ));

        connection.connect(&config());
        assert!(connection.send(&[1]).is_err());

        drain(&mut connection, &mut rx);
        connection.send(&[1]).unwrap();
        assert_eq!(platform.outbound(), vec![vec![1]]);
    }

    #[test]
    fn bind_failure_returns_to_disconnected() {
        let (mut connection, platform, mut rx) = setup();
        platform.fail_next_bind("no service");

        connection.connect(&config());
        assert_eq!(
            drain(&mut connection, &mut rx),
            vec![Transition::Disconnected]
        );
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        connection.connect(&config());
        assert_eq!(platform.bind_requests(), 2);
        assert_eq!(drain(&mut connection, &mut rx), vec![Transition::Connected]);
    }

    #[test]
    fn disconnect_while_connecting_ignores_late_bind() {
        let (mut connection, platform, mut rx) = setup();
        connection.connect(&config());
        connection.disconnect();

        // Bound then Disconnected are both queued; only the confirmation counts
        assert_eq!(
            drain(&mut connection, &mut rx),
            vec![Transition::Disconnected]
        );
        assert!(!platform.is_registered());
    }

    #[test]
    fn reconnect_while_connecting_ends_connected() {
        let (mut connection, platform, mut rx) = setup();
        connection.connect(&config());
        connection.disconnect();
        connection.connect(&config());
        assert_eq!(connection.session(), 2);

        // the first session's Bound and Disconnected are still queued
        assert_eq!(drain(&mut connection, &mut rx), vec![Transition::Connected]);
        assert!(connection.is_connected());
        assert!(platform.is_registered());
        assert_eq!(platform.bind_requests(), 2);
        connection.send(&[1]).unwrap();
    }

    #[test]
    fn remote_loss_while_connecting() {
        let (mut connection, platform, mut rx) = setup();
        platform.hold_binds(true);
        connection.connect(&config());

        platform.drop_connection();
        assert_eq!(
            drain(&mut connection, &mut rx),
            vec![Transition::Disconnected]
        );
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        platform.hold_binds(false);
        connection.connect(&config());
        assert_eq!(drain(&mut connection, &mut rx), vec![Transition::Connected]);
    }

    #[test]
    fn earlier_session_events_ignored() {
        let (mut connection, _platform, mut rx) = setup();
        connection.connect(&config());
        drain(&mut connection, &mut rx);

        let stale = SessionEvent {
            session: connection.session() - 1,
            event: BackendEvent::Disconnected,
        };
        assert_eq!(connection.apply(&stale), None);
        assert!(connection.is_connected());
    }

    #[test]
    fn remote_loss_disconnects() {
        let (mut connection, platform, mut rx) = setup();
        connection.connect(&config());
        drain(&mut connection, &mut rx);

        platform.drop_connection();
        assert_eq!(
            drain(&mut connection, &mut rx),
            vec![Transition::Disconnected]
        );
        assert!(!connection.is_connected());
    }
}
