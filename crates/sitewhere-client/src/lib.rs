//! Device messaging client: outbound builder, inbound dispatch, connection
//! lifecycle.
//!
//! A host owns a [`SiteWhereClient`], connects it through a [`Backend`] and
//! drains backend events on its own thread. Outbound events are sent through
//! the [`DeviceMessaging`] operations; inbound commands arrive as
//! [`ClientHandler`] callbacks.

pub mod backend;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod main_thread;
pub mod messaging;
pub mod reporting;
pub mod transport;

pub use backend::{
    Backend, BackendEvent, DeliveryServiceBackend, EventReceiver, EventSender, FrameChannel,
    LoopbackBackend, LoopbackPlatform, SessionEvent, SessionEvents, SessionId, event_channel,
};
pub use client::SiteWhereClient;
pub use commands::{
    CommandCall, CommandHandler, CommandRegistry, FromArgument, RegistryError, Signature,
};
pub use config::{
    ClientConfig, ConnectionConfig, ConnectionSettings, DeviceSettings, ReportingSettings,
};
pub use connection::{Connection, ConnectionState, Transition};
pub use dispatch::{CustomCommands, Dispatcher};
pub use error::{ClientError, ClientResult, DispatchError};
pub use handler::ClientHandler;
pub use main_thread::{MainQueue, MainTask, MainThread, MainThreadClosed};
pub use messaging::DeviceMessaging;
pub use reporting::{
    ReportingCommand, ReportingConfig, ReportingHandle, ReportingScheduler, ReportingState,
};
pub use transport::{Transport, TransportError};
