// Test doubles for transports, GATT links and I2C buses

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use embedded_hal::i2c::{self, ErrorKind, Operation};

use super::ble::{Characteristic, GattLink};
use super::protocol::Frame;
use super::transport::{
    Capabilities, FrameHandler, NotifyStream, Result, SubscriptionId, Transport, TransportError,
};

#[derive(Default)]
struct TransportState {
    sent: Vec<Vec<u8>>,
    requests: Vec<(Vec<u8>, usize)>,
    responses: VecDeque<Vec<u8>>,
    handler: Option<Arc<FrameHandler>>,
    fail_send: bool,
    fail_subscribe: bool,
    unsubscribed: Vec<SubscriptionId>,
}

/// Recording transport. Clones share state so a test can inspect what the
/// session wrote after handing the transport over.
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    capabilities: Capabilities,
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new(name: &str, capabilities: Capabilities) -> Self {
        Self {
            name: name.to_string(),
            capabilities,
            state: Arc::default(),
        }
    }

    /// Send-only transport, like a bus without request support
    pub fn send_only(name: &str) -> Self {
        Self::new(name, Capabilities::default())
    }

    pub fn wireless(name: &str) -> Self {
        Self::new(
            name,
            Capabilities {
                request: false,
                subscribe: true,
            },
        )
    }

    pub fn bus(name: &str) -> Self {
        Self::new(
            name,
            Capabilities {
                request: true,
                subscribe: false,
            },
        )
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn requests(&self) -> Vec<(Vec<u8>, usize)> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of times the transport was asked to do any I/O
    pub fn io_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.sent.len() + state.requests.len()
    }

    pub fn queue_response(&self, response: Vec<u8>) {
        self.state.lock().unwrap().responses.push_back(response);
    }

    pub fn fail_send(&self, fail: bool) {
        self.state.lock().unwrap().fail_send = fail;
    }

    pub fn fail_subscribe(&self, fail: bool) {
        self.state.lock().unwrap().fail_subscribe = fail;
    }

    pub fn has_handler(&self) -> bool {
        self.state.lock().unwrap().handler.is_some()
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unwrap().unsubscribed.clone()
    }

    /// Deliver an inbound payload as the peer would
    pub fn notify(&self, payload: &[u8]) {
        // Release the lock before calling out
        let handler = self.state.lock().unwrap().handler.clone();
        if let Some(handler) = handler {
            handler(payload);
        }
    }
}

impl Transport for MockTransport {
    fn peer_id(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(TransportError::link(&self.name, "link down"));
        }
        state.sent.push(frame.as_bytes().to_vec());
        Ok(())
    }

    fn request(&mut self, frame: &Frame, expected_len: usize) -> Result<Vec<u8>> {
        if !self.capabilities.request {
            return Err(self.unsupported("request"));
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(TransportError::link(&self.name, "peer not responding"));
        }
        state.requests.push((frame.as_bytes().to_vec(), expected_len));
        state
            .responses
            .pop_front()
            .ok_or_else(|| TransportError::link(&self.name, "no response"))
    }

    fn subscribe(&mut self, _stream: NotifyStream, handler: FrameHandler) -> Result<SubscriptionId> {
        if !self.capabilities.subscribe {
            return Err(self.unsupported("subscribe"));
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_subscribe {
            return Err(TransportError::link(&self.name, "CCCD write rejected"));
        }
        state.handler = Some(Arc::new(handler));
        Ok(SubscriptionId(7))
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.handler = None;
        state.unsubscribed.push(id);
        Ok(())
    }
}

#[derive(Default)]
struct GattState {
    writes: Vec<(Characteristic, Vec<u8>, bool)>,
    cccd_writes: Vec<(Characteristic, [u8; 2])>,
    handlers: HashMap<Characteristic, Arc<FrameHandler>>,
    fail_cccd: bool,
    // Remaining CCCD writes before they start failing
    cccd_budget: Option<usize>,
    fail_register: bool,
}

/// In-memory GATT peripheral
#[derive(Clone)]
pub struct MockGatt {
    name: String,
    state: Arc<Mutex<GattState>>,
}

impl MockGatt {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::default(),
        }
    }

    pub fn writes(&self) -> Vec<(Characteristic, Vec<u8>, bool)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn cccd_writes(&self) -> Vec<(Characteristic, [u8; 2])> {
        self.state.lock().unwrap().cccd_writes.clone()
    }

    pub fn has_handler(&self, characteristic: Characteristic) -> bool {
        self.state.lock().unwrap().handlers.contains_key(&characteristic)
    }

    pub fn fail_cccd(&self, fail: bool) {
        self.state.lock().unwrap().fail_cccd = fail;
    }

    /// Let `n` more CCCD writes through, then fail the rest
    pub fn fail_cccd_after(&self, n: usize) {
        self.state.lock().unwrap().cccd_budget = Some(n);
    }

    pub fn fail_register(&self, fail: bool) {
        self.state.lock().unwrap().fail_register = fail;
    }

    pub fn notify(&self, characteristic: Characteristic, payload: &[u8]) {
        let handler = self.state.lock().unwrap().handlers.get(&characteristic).cloned();
        if let Some(handler) = handler {
            handler(payload);
        }
    }
}

impl GattLink for MockGatt {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, characteristic: Characteristic, data: &[u8], with_response: bool) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .writes
            .push((characteristic, data.to_vec(), with_response));
        Ok(())
    }

    fn write_cccd(&mut self, characteristic: Characteristic, value: [u8; 2]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(budget) = state.cccd_budget {
            if budget == 0 {
                return Err(TransportError::link(&self.name, "CCCD write failed"));
            }
            state.cccd_budget = Some(budget - 1);
        }
        if state.fail_cccd {
            return Err(TransportError::link(&self.name, "CCCD write failed"));
        }
        state.cccd_writes.push((characteristic, value));
        Ok(())
    }

    fn register_notify(&mut self, characteristic: Characteristic, handler: FrameHandler) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_register {
            return Err(TransportError::link(&self.name, "notification handler rejected"));
        }
        state.handlers.insert(characteristic, Arc::new(handler));
        Ok(())
    }

    fn unregister_notify(&mut self, characteristic: Characteristic) -> Result<()> {
        self.state.lock().unwrap().handlers.remove(&characteristic);
        Ok(())
    }
}

#[derive(Default)]
struct I2cState {
    writes: Vec<(u8, Vec<u8>)>,
    reads: VecDeque<Vec<u8>>,
    error: Option<ErrorKind>,
}

/// In-memory I2C bus
#[derive(Clone, Default)]
pub struct MockI2c {
    state: Arc<Mutex<I2cState>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn queue_read(&self, bytes: Vec<u8>) {
        self.state.lock().unwrap().reads.push_back(bytes);
    }

    pub fn fail_with(&self, kind: ErrorKind) {
        self.state.lock().unwrap().error = Some(kind);
    }
}

impl i2c::ErrorType for MockI2c {
    type Error = ErrorKind;
}

impl i2c::I2c for MockI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> std::result::Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.error {
            return Err(kind);
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => state.writes.push((address, bytes.to_vec())),
                Operation::Read(buf) => {
                    let data = state.reads.pop_front().unwrap_or_default();
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                }
            }
        }
        Ok(())
    }
}
