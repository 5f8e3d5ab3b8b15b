//! Backend selected on the command line.

use sitewhere_client::{
    Backend, ConnectionConfig, DeliveryServiceBackend, LoopbackBackend, SessionEvents,
    TransportError,
};

/// Either the in-process platform or a delivery service connection.
#[derive(Debug)]
pub enum HostBackend {
    Loopback(LoopbackBackend),
    Delivery(DeliveryServiceBackend),
}

impl Backend for HostBackend {
    fn bind(
        &mut self,
        config: &ConnectionConfig,
        events: SessionEvents,
    ) -> Result<(), TransportError> {
        match self {
            Self::Loopback(backend) => backend.bind(config, events),
            Self::Delivery(backend) => backend.bind(config, events),
        }
    }

    fn register(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Loopback(backend) => backend.register(),
            Self::Delivery(backend) => backend.register(),
        }
    }

    fn unregister(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Loopback(backend) => backend.unregister(),
            Self::Delivery(backend) => backend.unregister(),
        }
    }

    fn unbind(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Loopback(backend) => backend.unbind(),
            Self::Delivery(backend) => backend.unbind(),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Loopback(backend) => backend.send(bytes),
            Self::Delivery(backend) => backend.send(bytes),
        }
    }
}
