//! TCP backend talking to a local message-delivery service.
//!
//! The service relays envelopes to and from the broker. Every frame on the
//! socket is:
//!
//! ```text
//! +----------------------+---------+-------------------+
//! | length (u32, BE)     | channel | bytes             |
//! | = 1 + len(bytes)     | (u8)    |                   |
//! +----------------------+---------+-------------------+
//! ```
//!
//! The first frame after connecting is a hello carrying the device hardware
//! id; the service answers nothing until the device registers.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sitewhere_protocol::MAX_MESSAGE_SIZE;

use super::{Backend, BackendEvent, SessionEvents};
use crate::config::ConnectionConfig;
use crate::transport::TransportError;

/// Largest frame body accepted: a full header and payload plus the channel byte.
const MAX_FRAME_SIZE: usize = 2 * MAX_MESSAGE_SIZE + 16;

/// Channel byte of a delivery-service frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameChannel {
    /// Service to device: system command.
    System = 0x01,
    /// Service to device: custom command.
    Custom = 0x02,
    /// Device to service: hardware id announcement.
    Hello = 0x10,
    /// Device to service: start command delivery.
    Register = 0x11,
    /// Device to service: stop command delivery.
    Unregister = 0x12,
    /// Device to service: encoded envelope.
    Outbound = 0x20,
}

impl FrameChannel {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Self::System),
            0x02 => Some(Self::Custom),
            0x10 => Some(Self::Hello),
            0x11 => Some(Self::Register),
            0x12 => Some(Self::Unregister),
            0x20 => Some(Self::Outbound),
            _ => None,
        }
    }
}

/// Encodes one frame. Bodies over the frame limit are refused.
pub fn encode_frame(channel: FrameChannel, bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
    let size = bytes.len() + 1;
    let len = u32::try_from(size)
        .ok()
        .filter(|_| size <= MAX_FRAME_SIZE)
        .ok_or(TransportError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        })?;

    let mut frame = Vec::with_capacity(size + 4);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.push(channel as u8);
    frame.extend_from_slice(bytes);
    Ok(frame)
}

/// Reads one frame, returning `None` on a clean end of stream.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<(u8, Vec<u8>)>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame without channel byte",
        ));
    }
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame too large: {} bytes (max: {})", len, MAX_FRAME_SIZE),
        ));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    let bytes = body.split_off(1);
    Ok(Some((body[0], bytes)))
}

struct Session {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// Backend connected to a delivery service over TCP.
#[derive(Default)]
pub struct DeliveryServiceBackend {
    session: Option<Session>,
}

impl std::fmt::Debug for DeliveryServiceBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryServiceBackend")
            .field("bound", &self.session.is_some())
            .finish()
    }
}

impl DeliveryServiceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, channel: FrameChannel, bytes: &[u8]) -> Result<(), TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        session
            .outbound
            .send(encode_frame(channel, bytes)?)
            .map_err(|_| TransportError::Closed)
    }
}

impl Backend for DeliveryServiceBackend {
    fn bind(
        &mut self,
        config: &ConnectionConfig,
        events: SessionEvents,
    ) -> Result<(), TransportError> {
        let runtime = Handle::try_current()
            .map_err(|e| TransportError::rejected(format!("no async runtime: {}", e)))?;

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_session(config.clone(), events, outbound_rx));
        self.session = Some(Session { outbound });
        Ok(())
    }

    fn register(&mut self) -> Result<(), TransportError> {
        self.queue(FrameChannel::Register, &[])
    }

    fn unregister(&mut self) -> Result<(), TransportError> {
        self.queue(FrameChannel::Unregister, &[])
    }

    fn unbind(&mut self) -> Result<(), TransportError> {
        // dropping the queue ends the session, which confirms with Disconnected
        self.session.take();
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.queue(FrameChannel::Outbound, bytes)
    }
}

async fn run_session(
    config: ConnectionConfig,
    events: SessionEvents,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let address = config.address();
    debug!(
        address = %address,
        session = events.session(),
        "connecting to delivery service"
    );

    let stream = match tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
        .await
    {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            events.send(BackendEvent::BindFailed(format!(
                "failed to connect to {}: {}",
                address, e
            )));
            return;
        }
        Err(_) => {
            events.send(BackendEvent::BindFailed(format!(
                "connection to {} timed out after {}s",
                address,
                config.connect_timeout.as_secs()
            )));
            return;
        }
    };

    let (reader, mut writer) = stream.into_split();
    let hello = match encode_frame(FrameChannel::Hello, config.device_hardware_id.as_bytes()) {
        Ok(hello) => hello,
        Err(e) => {
            events.send(BackendEvent::BindFailed(format!("hello failed: {}", e)));
            return;
        }
    };
    if let Err(e) = writer.write_all(&hello).await {
        events.send(BackendEvent::BindFailed(format!("hello failed: {}", e)));
        return;
    }

    info!(
        address = %address,
        hardware_id = %config.device_hardware_id,
        session = events.session(),
        "bound to delivery service"
    );
    events.send(BackendEvent::Bound);

    let mut read_task = tokio::spawn(read_loop(reader, events.clone()));
    loop {
        tokio::select! {
            _ = &mut read_task => break,
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = writer.write_all(&frame).await {
                        warn!(error = %e, "write to delivery service failed");
                        break;
                    }
                }
                None => {
                    debug!("session released");
                    break;
                }
            },
        }
    }

    read_task.abort();
    let _ = writer.shutdown().await;
    events.send(BackendEvent::Disconnected);
}

async fn read_loop(mut reader: OwnedReadHalf, events: SessionEvents) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some((channel, bytes))) => {
                let event = match FrameChannel::from_byte(channel) {
                    Some(FrameChannel::System) => BackendEvent::SystemCommand(bytes),
                    Some(FrameChannel::Custom) => BackendEvent::CustomCommand(bytes),
                    _ => {
                        warn!(channel, "ignoring frame on unexpected channel");
                        continue;
                    }
                };
                if !events.send(event) {
                    return;
                }
            }
            Ok(None) => {
                info!("delivery service closed the connection");
                return;
            }
            Err(e) => {
                warn!(error = %e, "read from delivery service failed");
                return;
            }
        }
    }
}
