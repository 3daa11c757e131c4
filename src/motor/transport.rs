// Transport abstraction shared by the BLE and I2C adapters
//
// Every backend can `send`. `request` (write then fixed-length read) and
// `subscribe` (peer-initiated notifications) are optional; callers check
// `capabilities()` instead of assuming them.

use tracing::{debug, info};

use super::protocol::Frame;

/// Error types for transport I/O
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{operation} is not supported by transport {peer}")]
    Unsupported { operation: &'static str, peer: String },

    #[error("Link error on {peer}: {reason}")]
    Link { peer: String, reason: String },

    #[error("I2C error at address 0x{address:02X}: {kind:?}")]
    I2c {
        address: u8,
        kind: embedded_hal::i2c::ErrorKind,
    },
}

impl TransportError {
    pub fn link(peer: impl Into<String>, reason: impl Into<String>) -> Self {
        TransportError::Link {
            peer: peer.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Optional operations a transport implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub request: bool,
    pub subscribe: bool,
}

/// Notification streams a motor can push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyStream {
    MotorMeasurement,
}

/// Raw inbound payload handler.
///
/// Transports may call it from their own I/O thread at any time after
/// registration, concurrently with outbound sends.
pub type FrameHandler = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Identifies a registration made through [`Transport::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

pub trait Transport: Send {
    /// Stable identifier of the connected peer (device name, bus address)
    fn peer_id(&self) -> &str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Fire-and-forget write of one frame
    fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Write `frame`, then read exactly `expected_len` bytes
    fn request(&mut self, _frame: &Frame, _expected_len: usize) -> Result<Vec<u8>> {
        Err(self.unsupported("request"))
    }

    /// Enable `stream` on the peer and route its payloads to `handler`
    fn subscribe(&mut self, _stream: NotifyStream, _handler: FrameHandler) -> Result<SubscriptionId> {
        Err(self.unsupported("subscribe"))
    }

    /// Disable the stream behind `id` and drop its handler
    fn unsubscribe(&mut self, _id: SubscriptionId) -> Result<()> {
        Err(self.unsupported("unsubscribe"))
    }

    fn unsupported(&self, operation: &'static str) -> TransportError {
        TransportError::Unsupported {
            operation,
            peer: self.peer_id().to_string(),
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn peer_id(&self) -> &str {
        (**self).peer_id()
    }

    fn capabilities(&self) -> Capabilities {
        (**self).capabilities()
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        (**self).send(frame)
    }

    fn request(&mut self, frame: &Frame, expected_len: usize) -> Result<Vec<u8>> {
        (**self).request(frame, expected_len)
    }

    fn subscribe(&mut self, stream: NotifyStream, handler: FrameHandler) -> Result<SubscriptionId> {
        (**self).subscribe(stream, handler)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        (**self).unsubscribe(id)
    }
}

/// Transport that only logs frames. Used when no motor is attached.
pub struct LoggingTransport {
    name: String,
    sent: usize,
}

impl LoggingTransport {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        info!("Simulated motor transport '{}'", name);
        Self { name, sent: 0 }
    }

    /// Number of frames written so far
    pub fn sent(&self) -> usize {
        self.sent
    }
}

impl Transport for LoggingTransport {
    fn peer_id(&self) -> &str {
        &self.name
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        self.sent += 1;
        debug!("[{}] send {:?}", self.name, frame);
        Ok(())
    }
}
