// I2C bus transport adapter
//
// Frames are written verbatim to the motor's 7-bit address. Reads are a
// plain write followed by a separate read of a caller-specified length;
// the bus has no push notifications.

use embedded_hal::i2c::{Error as _, I2c};
use tracing::debug;

use super::protocol::Frame;
use super::transport::{Capabilities, Result, Transport, TransportError};

/// KeiganMotor on an I2C bus
pub struct I2cTransport<B: I2c> {
    bus: B,
    address: u8,
    peer: String,
}

impl<B: I2c> I2cTransport<B> {
    pub fn new(bus: B, address: u8) -> Self {
        Self {
            bus,
            address,
            peer: format!("i2c@0x{:02X}", address),
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Release the underlying bus
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn map_err(&self, e: B::Error) -> TransportError {
        TransportError::I2c {
            address: self.address,
            kind: e.kind(),
        }
    }
}

impl<B: I2c + Send> Transport for I2cTransport<B> {
    fn peer_id(&self) -> &str {
        &self.peer
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            request: true,
            subscribe: false,
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        debug!("[{}] write {:?}", self.peer, frame);
        self.bus
            .write(self.address, frame.as_bytes())
            .map_err(|e| self.map_err(e))
    }

    fn request(&mut self, frame: &Frame, expected_len: usize) -> Result<Vec<u8>> {
        self.send(frame)?;

        let mut response = vec![0u8; expected_len];
        self.bus
            .read(self.address, &mut response)
            .map_err(|e| self.map_err(e))?;
        debug!("[{}] read {:02X?}", self.peer, response);
        Ok(response)
    }
}
