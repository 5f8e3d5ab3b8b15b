//! Message-delivery backends.
//!
//! A backend moves envelopes between the device and the platform. It binds
//! asynchronously: `bind` only starts the work, and the outcome arrives later
//! as a [`BackendEvent`] on the channel passed in. Inbound commands arrive
//! the same way, on whatever thread the backend owns; the receiver is drained
//! on the host's thread, which makes the channel the single hand-off point.
//!
//! Every bind opens a new session. Events are stamped with the session that
//! produced them, so confirmations from a session the host has already left
//! can be told apart from the current one.

mod delivery;
mod loopback;

pub use delivery::{DeliveryServiceBackend, FrameChannel};
pub use loopback::{LoopbackBackend, LoopbackPlatform};

use tokio::sync::mpsc;

use crate::config::ConnectionConfig;
use crate::transport::TransportError;

/// Notifications a backend delivers to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Bind completed; the backend can register and send.
    Bound,
    /// Bind could not be completed.
    BindFailed(String),
    /// The backend confirmed an unbind or lost its connection.
    Disconnected,
    /// Fixed protocol command from the platform.
    SystemCommand(Vec<u8>),
    /// Application-defined command from the platform.
    CustomCommand(Vec<u8>),
}

/// Identifies one bind. Increases with every connect.
pub type SessionId = u64;

/// A backend event and the session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: BackendEvent,
}

/// Sending half of the backend event channel.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Receiving half of the backend event channel.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Event sender handed to one bind; stamps everything it sends with that
/// bind's session.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    session: SessionId,
    tx: EventSender,
}

impl SessionEvents {
    pub fn new(session: SessionId, tx: EventSender) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queues `event`. Returns false once the client is gone.
    pub fn send(&self, event: BackendEvent) -> bool {
        self.tx
            .send(SessionEvent {
                session: self.session,
                event,
            })
            .is_ok()
    }
}

/// Creates the channel a client and its backend share.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Connection to a message-delivery service.
pub trait Backend {
    /// Starts a session; completion and everything after it is reported
    /// through `events`.
    fn bind(
        &mut self,
        config: &ConnectionConfig,
        events: SessionEvents,
    ) -> Result<(), TransportError>;

    /// Registers for inbound command delivery.
    fn register(&mut self) -> Result<(), TransportError>;

    /// Stops inbound command delivery.
    fn unregister(&mut self) -> Result<(), TransportError>;

    /// Releases the binding; the backend confirms with
    /// [`BackendEvent::Disconnected`].
    fn unbind(&mut self) -> Result<(), TransportError>;

    /// Hands one encoded envelope to the service.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}
