//! The client object a host owns.

use tracing::{debug, trace};

use crate::backend::{Backend, BackendEvent, EventReceiver, SessionEvent, event_channel};
use crate::commands::CommandRegistry;
use crate::config::ConnectionConfig;
use crate::connection::{Connection, ConnectionState, Transition};
use crate::dispatch::Dispatcher;
use crate::handler::ClientHandler;
use crate::transport::{Transport, TransportError};

/// Composes a connection, the inbound dispatcher and the host's callbacks.
///
/// Backend events are queued on a channel and applied only when the host
/// calls [`handle_event`](Self::handle_event) (or one of the draining
/// helpers) on its own thread. The client implements [`Transport`], so
/// every [`DeviceMessaging`](crate::DeviceMessaging) operation is available
/// on it directly.
///
/// # Example
///
/// ```rust
/// use sitewhere_client::{
///     ClientHandler, ConnectionConfig, DeviceMessaging, LoopbackBackend, SiteWhereClient,
/// };
///
/// struct Host;
/// impl ClientHandler for Host {}
///
/// let (backend, platform) = LoopbackBackend::pair();
/// let mut client = SiteWhereClient::new(backend, Host);
/// client.connect(&ConnectionConfig::new("localhost", 1883, "dev-1"));
/// client.process_pending();
///
/// client.send_measurement("dev-1", None, "engine.temp", 125.0).unwrap();
/// assert_eq!(platform.outbound().len(), 1);
/// ```
pub struct SiteWhereClient<B, H> {
    connection: Connection<B>,
    dispatcher: Dispatcher<H>,
    handler: H,
    events: EventReceiver,
}

impl<B: Backend, H: ClientHandler> SiteWhereClient<B, H> {
    /// Creates a client delivering custom commands as raw bytes.
    pub fn new(backend: B, handler: H) -> Self {
        Self::with_dispatcher(backend, handler, Dispatcher::raw())
    }

    /// Creates a client resolving custom commands through `registry`.
    pub fn with_commands(backend: B, handler: H, registry: CommandRegistry<H>) -> Self {
        Self::with_dispatcher(backend, handler, Dispatcher::named(registry))
    }

    fn with_dispatcher(backend: B, handler: H, dispatcher: Dispatcher<H>) -> Self {
        let (tx, events) = event_channel();
        Self {
            connection: Connection::new(backend, tx),
            dispatcher,
            handler,
            events,
        }
    }

    /// Starts connecting; see [`Connection::connect`].
    pub fn connect(&mut self, config: &ConnectionConfig) {
        self.connection.connect(config);
    }

    /// Starts disconnecting; see [`Connection::disconnect`].
    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection(&self) -> &Connection<B> {
        &self.connection
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The command registry, when custom commands are named.
    pub fn commands_mut(&mut self) -> Option<&mut CommandRegistry<H>> {
        self.dispatcher.registry_mut()
    }

    /// Runs `f` with the handler and the connection, for host-initiated
    /// work that needs both.
    pub fn with_handler<R>(&mut self, f: impl FnOnce(&mut H, &mut dyn Transport) -> R) -> R {
        f(&mut self.handler, &mut self.connection)
    }

    /// Waits for the next backend event.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Applies every queued backend event without waiting. Returns how many
    /// were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Applies one backend event on the calling thread.
    pub fn handle_event(&mut self, stamped: SessionEvent) {
        trace!(
            event = event_name(&stamped.event),
            session = stamped.session,
            "backend event"
        );
        if !self.connection.is_current(stamped.session) {
            debug!(session = stamped.session, "event from earlier session dropped");
            return;
        }

        match stamped.event {
            BackendEvent::SystemCommand(bytes) => {
                if !self.connection.is_connected() {
                    debug!(bytes = bytes.len(), "system command while not connected dropped");
                    return;
                }
                self.dispatcher
                    .on_system_command(&bytes, &mut self.handler, &mut self.connection);
            }
            BackendEvent::CustomCommand(bytes) => {
                if !self.connection.is_connected() {
                    debug!(bytes = bytes.len(), "custom command while not connected dropped");
                    return;
                }
                self.dispatcher
                    .on_custom_command(&bytes, &mut self.handler, &mut self.connection);
            }
            event => {
                let lifecycle = SessionEvent {
                    session: stamped.session,
                    event,
                };
                match self.connection.apply(&lifecycle) {
                    Some(Transition::Connected) => {
                        self.handler.on_connected(&mut self.connection)
                    }
                    Some(Transition::Disconnected) => {
                        self.handler.on_disconnected(&mut self.connection)
                    }
                    None => {}
                }
            }
        }
    }
}

impl<B: Backend, H> Transport for SiteWhereClient<B, H> {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.connection.send(bytes)
    }
}

fn event_name(event: &BackendEvent) -> &'static str {
    match event {
        BackendEvent::Bound => "bound",
        BackendEvent::BindFailed(_) => "bind_failed",
        BackendEvent::Disconnected => "disconnected",
        BackendEvent::SystemCommand(_) => "system_command",
        BackendEvent::CustomCommand(_) => "custom_command",
    }
}
