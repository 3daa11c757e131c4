// High-level session with one KeiganMotor
//
// Takes engineering units, builds commands, hands frames to the transport.
// A successful call means the transport accepted the write; the motor may
// still be moving.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, info, warn};

use super::protocol::{
    CodecError, Command, Inbound, LedState, Magnitude, MEASUREMENT_RESPONSE_LEN, MotorMeasurement,
    ReceiveType, Rgb, decode_inbound,
};
use super::transport::{NotifyStream, SubscriptionId, Transport, TransportError};
use super::units::{degrees_to_radians, rpm_to_rad_per_sec};

/// Error types for motor session operations
#[derive(Debug, thiserror::Error)]
pub enum MotorError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unexpected response from {peer}: {kind:?}")]
    UnexpectedResponse { peer: String, kind: ReceiveType },
}

impl MotorError {
    /// A parameter was rejected before any I/O
    pub fn is_invalid_parameter(&self) -> bool {
        matches!(self, MotorError::Codec(CodecError::InvalidParameter { .. }))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, MotorError::Transport(TransportError::Unsupported { .. }))
    }

    pub fn is_transport_failure(&self) -> bool {
        matches!(self, MotorError::Transport(e) if !matches!(e, TransportError::Unsupported { .. }))
    }
}

pub type Result<T> = std::result::Result<T, MotorError>;

#[derive(Debug)]
struct SubscriptionState {
    active: AtomicBool,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Handle for a motor measurement notification registration
#[derive(Debug)]
pub struct MeasurementSubscription {
    id: SubscriptionId,
    state: Arc<SubscriptionState>,
}

impl MeasurementSubscription {
    /// Stop forwarding measurements to the callback.
    ///
    /// The peer keeps notifying until [`MotorSession::unsubscribe`] is called.
    pub fn cancel(&self) {
        self.state.active.store(false, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.state.active.load(Ordering::Acquire)
    }

    /// Measurements handed to the callback
    pub fn delivered(&self) -> u64 {
        self.state.delivered.load(Ordering::Relaxed)
    }

    /// Notification payloads that failed to decode
    pub fn dropped(&self) -> u64 {
        self.state.dropped.load(Ordering::Relaxed)
    }
}

/// A session with one motor over one transport
pub struct MotorSession<T: Transport> {
    transport: T,
    peer: Arc<str>,
    stop_on_drop: bool,
}

impl<T: Transport> MotorSession<T> {
    pub fn new(transport: T) -> Self {
        let peer: Arc<str> = Arc::from(transport.peer_id());
        info!("Motor session opened on {}", peer);
        Self {
            transport,
            peer,
            stop_on_drop: false,
        }
    }

    /// Send `stop` when the session is dropped
    pub fn with_stop_on_drop(mut self, enabled: bool) -> Self {
        self.stop_on_drop = enabled;
        self
    }

    pub fn peer_id(&self) -> &str {
        &self.peer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode and send a single command
    pub fn command(&mut self, command: Command) -> Result<()> {
        let frame = command.encode();
        debug!("[{}] {:?} -> {:?}", self.peer, command, frame);
        self.transport.send(&frame)?;
        Ok(())
    }

    fn value(&mut self, name: &'static str, value: f64, make: fn(Magnitude) -> Command) -> Result<()> {
        let magnitude = Magnitude::new(name, value)?;
        self.command(make(magnitude))
    }

    // === Motor control ===

    /// Enable motor action
    pub fn enable(&mut self) -> Result<()> {
        self.command(Command::Enable)
    }

    /// Disable motor action
    pub fn disable(&mut self) -> Result<()> {
        self.command(Command::Disable)
    }

    /// Set speed [rad/s] used by run and move commands. The sign is ignored.
    pub fn speed(&mut self, rad_per_sec: f64) -> Result<()> {
        self.value("speed", rad_per_sec, Command::Speed)
    }

    /// Set speed [rpm]
    pub fn speed_rpm(&mut self, rpm: f64) -> Result<()> {
        self.speed(rpm_to_rad_per_sec(rpm))
    }

    /// Run at velocity [rad/s]. The sign is ignored; use run_forward/run_reverse for direction.
    pub fn run_at_velocity(&mut self, rad_per_sec: f64) -> Result<()> {
        self.value("velocity", rad_per_sec, Command::RunAtVelocity)
    }

    /// Run at velocity [rpm]
    pub fn run_at_rpm(&mut self, rpm: f64) -> Result<()> {
        self.run_at_velocity(rpm_to_rad_per_sec(rpm))
    }

    /// Run forward (counter clockwise) at the configured speed
    pub fn run_forward(&mut self) -> Result<()> {
        self.command(Command::RunForward)
    }

    /// Run reverse (clockwise) at the configured speed
    pub fn run_reverse(&mut self) -> Result<()> {
        self.command(Command::RunReverse)
    }

    /// Stop (speed control to zero)
    pub fn stop(&mut self) -> Result<()> {
        self.command(Command::Stop)
    }

    /// De-energize the motor and let it turn freely
    pub fn free(&mut self) -> Result<()> {
        self.command(Command::Free)
    }

    /// Move to absolute position [rad]
    pub fn move_to_position(&mut self, rad: f64) -> Result<()> {
        self.value("position", rad, Command::MoveToPosition)
    }

    /// Move to absolute position [degree]
    pub fn move_to_degree(&mut self, deg: f64) -> Result<()> {
        self.move_to_position(degrees_to_radians(deg))
    }

    /// Move by relative distance [rad]
    pub fn move_by_distance(&mut self, rad: f64) -> Result<()> {
        self.value("distance", rad, Command::MoveByDistance)
    }

    /// Move by relative distance [degree]
    pub fn move_by_degree(&mut self, deg: f64) -> Result<()> {
        self.move_by_distance(degrees_to_radians(deg))
    }

    /// Declare the current position to be `rad`
    pub fn preset_position(&mut self, rad: f64) -> Result<()> {
        self.value("position", rad, Command::PresetPosition)
    }

    // === Registers ===

    pub fn max_speed(&mut self, rad_per_sec: f64) -> Result<()> {
        self.value("max_speed", rad_per_sec, Command::MaxSpeed)
    }

    /// Acceleration [rad/s^2]
    pub fn acceleration(&mut self, rad_per_sec2: f64) -> Result<()> {
        self.value("acceleration", rad_per_sec2, Command::Acceleration)
    }

    /// Deceleration [rad/s^2]
    pub fn deceleration(&mut self, rad_per_sec2: f64) -> Result<()> {
        self.value("deceleration", rad_per_sec2, Command::Deceleration)
    }

    /// Max torque [N*m]
    pub fn max_torque(&mut self, newton_meter: f64) -> Result<()> {
        self.value("max_torque", newton_meter, Command::MaxTorque)
    }

    /// Persist all registers to flash
    pub fn save_all_registers(&mut self) -> Result<()> {
        self.command(Command::SaveAllRegisters)
    }

    pub fn reboot(&mut self) -> Result<()> {
        self.command(Command::Reboot)
    }

    // === LED ===

    /// Set LED state and color. Channels outside 0..=255 fail without sending anything.
    pub fn led(&mut self, state: LedState, red: i32, green: i32, blue: i32) -> Result<()> {
        let color = Rgb::new(red, green, blue)?;
        self.command(Command::Led { state, color })
    }

    // === Measurements ===

    /// Poll one measurement (bus transports only)
    pub fn read_motor_measurement(&mut self) -> Result<MotorMeasurement> {
        if !self.transport.capabilities().request {
            return Err(self.transport.unsupported("request").into());
        }

        let frame = Command::ReadMotorMeasurement.encode();
        let response = self.transport.request(&frame, MEASUREMENT_RESPONSE_LEN)?;
        match decode_inbound(&response)? {
            Inbound::MotorMeasurement(m) => {
                debug!("[{}] measurement {:?}", self.peer, m);
                Ok(m)
            }
            Inbound::Raw { kind, .. } => Err(MotorError::UnexpectedResponse {
                peer: self.peer.to_string(),
                kind,
            }),
        }
    }

    /// Enable motor measurement notifications and forward each decoded
    /// measurement to `callback` along with the peer identifier.
    ///
    /// The callback runs on the transport's notification thread, possibly
    /// while this session is sending. Payloads that fail to decode are
    /// counted and logged; they never reach the callback and never end the
    /// subscription. If enabling fails nothing is installed.
    pub fn on_received_motor_measurement<F>(&mut self, callback: F) -> Result<MeasurementSubscription>
    where
        F: Fn(&str, MotorMeasurement) + Send + Sync + 'static,
    {
        if !self.transport.capabilities().subscribe {
            return Err(self.transport.unsupported("subscribe").into());
        }

        let state = Arc::new(SubscriptionState {
            active: AtomicBool::new(true),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        let peer = Arc::clone(&self.peer);
        let handler_state = Arc::clone(&state);
        let handler = Box::new(move |payload: &[u8]| {
            if !handler_state.active.load(Ordering::Acquire) {
                return;
            }
            match MotorMeasurement::decode(payload) {
                Ok(m) => {
                    handler_state.delivered.fetch_add(1, Ordering::Relaxed);
                    callback(&*peer, m);
                }
                Err(e) => {
                    handler_state.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("[{}] dropping measurement notification: {}", peer, e);
                }
            }
        });

        let id = match self.transport.subscribe(NotifyStream::MotorMeasurement, handler) {
            Ok(id) => id,
            Err(e) => {
                warn!("[{}] motor measurement notification not enabled: {}", self.peer, e);
                return Err(e.into());
            }
        };
        info!("[{}] motor measurement notification enabled", self.peer);
        Ok(MeasurementSubscription { id, state })
    }

    /// Cancel delivery and disable the notification on the peer
    pub fn unsubscribe(&mut self, subscription: MeasurementSubscription) -> Result<()> {
        subscription.cancel();
        self.transport.unsubscribe(subscription.id)?;
        Ok(())
    }
}

impl<T: Transport> Drop for MotorSession<T> {
    fn drop(&mut self) {
        if self.stop_on_drop {
            if let Err(e) = self.stop() {
                warn!("Failed to stop motor {} on drop: {}", self.peer, e);
            }
        }
    }
}
