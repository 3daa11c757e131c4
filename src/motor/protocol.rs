// KeiganMotor command protocol
//
// Every outbound frame is an opcode byte followed by a fixed payload whose
// size is determined by the opcode:
//   Action: [opcode, 0x00, 0x00, 0x00, 0x00]
//   Value:  [opcode, 0x00, 0x00, f32_be(|value|), 0x00, 0x00]
//   LED:    [0xE0, 0x00, 0x00, state, red, green, blue, 0x00, 0x00]
//
// Value frames always carry the absolute value. Direction is chosen by
// opcode (run forward vs run reverse), never by the sign of the float.
// The same bytes go out over BLE and I2C.

use std::fmt;

/// Frame sizes per layout
pub const ACTION_FRAME_LEN: usize = 5;
pub const VALUE_FRAME_LEN: usize = 9;
pub const LED_FRAME_LEN: usize = 9;
pub const MAX_FRAME_LEN: usize = 9;

/// Offset of the big-endian float in value frames
const VALUE_OFFSET: usize = 3;
/// Offset of the LED state byte; red, green, blue follow
const LED_STATE_OFFSET: usize = 3;

/// Motor measurement payload: position, velocity, torque as f32 BE
pub const MEASUREMENT_PAYLOAD_LEN: usize = 12;
/// Receive-type byte + measurement payload, as returned over the bus
pub const MEASUREMENT_RESPONSE_LEN: usize = 1 + MEASUREMENT_PAYLOAD_LEN;

/// Error types for encoding and decoding frames
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Truncated frame: expected {expected} bytes, got {actual}")]
    TruncatedFrame { expected: usize, actual: usize },

    #[error("Unrecognized opcode 0x{0:02X}")]
    UnrecognizedOpcode(u8),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Opcodes understood by the codec
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Register commands (persisted with SaveAllRegisters)
    MaxSpeed = 0x02,
    Acceleration = 0x07,
    Deceleration = 0x08,
    MaxTorque = 0x0E,
    SaveAllRegisters = 0x41,

    // Action commands
    Disable = 0x50,
    Enable = 0x51,
    Speed = 0x58,
    PresetPosition = 0x5A,
    RunForward = 0x60,
    RunReverse = 0x61,
    RunAtVelocity = 0x62,
    MoveToPosition = 0x66,
    MoveByDistance = 0x68,
    Free = 0x6C,
    Stop = 0x6D,

    // Reads
    ReadMotorMeasurement = 0xB4,

    LedSet = 0xE0,
    Reboot = 0xF0,
}

/// Payload layout of a frame, fixed per opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Action,
    Value,
    Led,
}

/// Which part of the motor a command addresses.
///
/// Wireless transports write each group to its own characteristic; bus
/// transports ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandGroup {
    Motion,
    Register,
    Led,
}

impl Opcode {
    pub fn layout(self) -> Layout {
        match self {
            Opcode::MaxSpeed
            | Opcode::Acceleration
            | Opcode::Deceleration
            | Opcode::MaxTorque
            | Opcode::Speed
            | Opcode::PresetPosition
            | Opcode::RunAtVelocity
            | Opcode::MoveToPosition
            | Opcode::MoveByDistance => Layout::Value,
            Opcode::LedSet => Layout::Led,
            _ => Layout::Action,
        }
    }

    pub fn frame_len(self) -> usize {
        match self.layout() {
            Layout::Action => ACTION_FRAME_LEN,
            Layout::Value => VALUE_FRAME_LEN,
            Layout::Led => LED_FRAME_LEN,
        }
    }

    pub fn group(self) -> CommandGroup {
        match self {
            Opcode::MaxSpeed
            | Opcode::Acceleration
            | Opcode::Deceleration
            | Opcode::MaxTorque
            | Opcode::SaveAllRegisters
            | Opcode::Reboot => CommandGroup::Register,
            Opcode::LedSet => CommandGroup::Led,
            _ => CommandGroup::Motion,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self> {
        let opcode = match byte {
            0x02 => Opcode::MaxSpeed,
            0x07 => Opcode::Acceleration,
            0x08 => Opcode::Deceleration,
            0x0E => Opcode::MaxTorque,
            0x41 => Opcode::SaveAllRegisters,
            0x50 => Opcode::Disable,
            0x51 => Opcode::Enable,
            0x58 => Opcode::Speed,
            0x5A => Opcode::PresetPosition,
            0x60 => Opcode::RunForward,
            0x61 => Opcode::RunReverse,
            0x62 => Opcode::RunAtVelocity,
            0x66 => Opcode::MoveToPosition,
            0x68 => Opcode::MoveByDistance,
            0x6C => Opcode::Free,
            0x6D => Opcode::Stop,
            0xB4 => Opcode::ReadMotorMeasurement,
            0xE0 => Opcode::LedSet,
            0xF0 => Opcode::Reboot,
            other => return Err(CodecError::UnrecognizedOpcode(other)),
        };
        Ok(opcode)
    }
}

/// LED state of the motor body
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LedState {
    #[default]
    Off = 0,
    OnSolid = 1,
    OnFlash = 2,
    OnDim = 3,
}

impl TryFrom<u8> for LedState {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(LedState::Off),
            1 => Ok(LedState::OnSolid),
            2 => Ok(LedState::OnFlash),
            3 => Ok(LedState::OnDim),
            other => Err(CodecError::InvalidParameter {
                name: "state",
                reason: format!("{} is not a LED state (0..=3)", other),
            }),
        }
    }
}

/// LED color, each channel 0..=255
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    /// Validate raw channel values. Out-of-range channels are rejected, not clamped.
    pub fn new(red: i32, green: i32, blue: i32) -> Result<Self> {
        Ok(Self {
            red: channel("red", red)?,
            green: channel("green", green)?,
            blue: channel("blue", blue)?,
        })
    }
}

fn channel(name: &'static str, value: i32) -> Result<u8> {
    u8::try_from(value).map_err(|_| CodecError::InvalidParameter {
        name,
        reason: format!("{} is outside 0..=255", value),
    })
}

/// Non-negative, finite float32 carried by value frames
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Magnitude(f32);

impl Magnitude {
    /// Take the absolute value of `value` and narrow it to f32.
    ///
    /// The sign is dropped on purpose: the protocol has no signed
    /// magnitudes. Fails if the result is NaN or does not fit in f32.
    pub fn new(name: &'static str, value: f64) -> Result<Self> {
        let magnitude = value.abs() as f32;
        if !magnitude.is_finite() {
            return Err(CodecError::InvalidParameter {
                name,
                reason: format!("{} is not a finite float32", value),
            });
        }
        Ok(Self(magnitude))
    }

    fn from_wire(name: &'static str, value: f32) -> Result<Self> {
        if !value.is_finite() || value.is_sign_negative() {
            return Err(CodecError::InvalidParameter {
                name,
                reason: format!("{} is not a valid wire magnitude", value),
            });
        }
        Ok(Self(value))
    }

    pub fn get(self) -> f32 {
        self.0
    }
}

/// A single motor command. Each variant maps to exactly one opcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Enable,
    Disable,
    RunForward,
    RunReverse,
    Stop,
    Free,
    SaveAllRegisters,
    Reboot,
    ReadMotorMeasurement,

    /// Speed used by run/move commands [rad/s]
    Speed(Magnitude),
    /// Run at velocity [rad/s]
    RunAtVelocity(Magnitude),
    /// Absolute position [rad]
    MoveToPosition(Magnitude),
    /// Relative distance [rad]
    MoveByDistance(Magnitude),
    /// Overwrite the current position [rad]
    PresetPosition(Magnitude),
    MaxSpeed(Magnitude),
    Acceleration(Magnitude),
    Deceleration(Magnitude),
    MaxTorque(Magnitude),

    Led { state: LedState, color: Rgb },
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Enable => Opcode::Enable,
            Command::Disable => Opcode::Disable,
            Command::RunForward => Opcode::RunForward,
            Command::RunReverse => Opcode::RunReverse,
            Command::Stop => Opcode::Stop,
            Command::Free => Opcode::Free,
            Command::SaveAllRegisters => Opcode::SaveAllRegisters,
            Command::Reboot => Opcode::Reboot,
            Command::ReadMotorMeasurement => Opcode::ReadMotorMeasurement,
            Command::Speed(_) => Opcode::Speed,
            Command::RunAtVelocity(_) => Opcode::RunAtVelocity,
            Command::MoveToPosition(_) => Opcode::MoveToPosition,
            Command::MoveByDistance(_) => Opcode::MoveByDistance,
            Command::PresetPosition(_) => Opcode::PresetPosition,
            Command::MaxSpeed(_) => Opcode::MaxSpeed,
            Command::Acceleration(_) => Opcode::Acceleration,
            Command::Deceleration(_) => Opcode::Deceleration,
            Command::MaxTorque(_) => Opcode::MaxTorque,
            Command::Led { .. } => Opcode::LedSet,
        }
    }

    /// Magnitude carried by value commands
    pub fn magnitude(&self) -> Option<Magnitude> {
        match *self {
            Command::Speed(m)
            | Command::RunAtVelocity(m)
            | Command::MoveToPosition(m)
            | Command::MoveByDistance(m)
            | Command::PresetPosition(m)
            | Command::MaxSpeed(m)
            | Command::Acceleration(m)
            | Command::Deceleration(m)
            | Command::MaxTorque(m) => Some(m),
            _ => None,
        }
    }

    /// Build the wire frame for this command
    pub fn encode(&self) -> Frame {
        let mut frame = Frame::zeroed(self.opcode());
        match *self {
            Command::Led { state, color } => {
                frame.buf[LED_STATE_OFFSET] = state as u8;
                frame.buf[LED_STATE_OFFSET + 1] = color.red;
                frame.buf[LED_STATE_OFFSET + 2] = color.green;
                frame.buf[LED_STATE_OFFSET + 3] = color.blue;
            }
            _ => {
                if let Some(magnitude) = self.magnitude() {
                    frame.buf[VALUE_OFFSET..VALUE_OFFSET + 4]
                        .copy_from_slice(&magnitude.get().to_be_bytes());
                }
            }
        }
        frame
    }
}

/// An encoded outbound frame
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    opcode: Opcode,
    buf: [u8; MAX_FRAME_LEN],
    len: usize,
}

impl Frame {
    fn zeroed(opcode: Opcode) -> Self {
        let mut buf = [0u8; MAX_FRAME_LEN];
        buf[0] = opcode as u8;
        Self {
            opcode,
            buf,
            len: opcode.frame_len(),
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn group(&self) -> CommandGroup {
        self.opcode.group()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({:?} {:02X?})", self.opcode, self.as_bytes())
    }
}

/// Parse an outbound frame back into the command that produced it
pub fn decode_command(bytes: &[u8]) -> Result<Command> {
    let first = *bytes.first().ok_or(CodecError::TruncatedFrame {
        expected: 1,
        actual: 0,
    })?;
    let opcode = Opcode::try_from(first)?;
    require_len(bytes, opcode.frame_len())?;

    let command = match opcode.layout() {
        Layout::Led => Command::Led {
            state: LedState::try_from(bytes[LED_STATE_OFFSET])?,
            color: Rgb {
                red: bytes[LED_STATE_OFFSET + 1],
                green: bytes[LED_STATE_OFFSET + 2],
                blue: bytes[LED_STATE_OFFSET + 3],
            },
        },
        Layout::Value => {
            let value = Magnitude::from_wire("value", read_f32_be(bytes, VALUE_OFFSET))?;
            match opcode {
                Opcode::Speed => Command::Speed(value),
                Opcode::RunAtVelocity => Command::RunAtVelocity(value),
                Opcode::MoveToPosition => Command::MoveToPosition(value),
                Opcode::MoveByDistance => Command::MoveByDistance(value),
                Opcode::PresetPosition => Command::PresetPosition(value),
                Opcode::MaxSpeed => Command::MaxSpeed(value),
                Opcode::Acceleration => Command::Acceleration(value),
                Opcode::Deceleration => Command::Deceleration(value),
                _ => Command::MaxTorque(value),
            }
        }
        Layout::Action => match opcode {
            Opcode::Enable => Command::Enable,
            Opcode::Disable => Command::Disable,
            Opcode::RunForward => Command::RunForward,
            Opcode::RunReverse => Command::RunReverse,
            Opcode::Stop => Command::Stop,
            Opcode::Free => Command::Free,
            Opcode::SaveAllRegisters => Command::SaveAllRegisters,
            Opcode::Reboot => Command::Reboot,
            _ => Command::ReadMotorMeasurement,
        },
    };
    Ok(command)
}

/// Position [rad], velocity [rad/s] and torque [N*m] reported by the motor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotorMeasurement {
    pub position: f32,
    pub velocity: f32,
    pub torque: f32,
}

impl MotorMeasurement {
    /// Decode a 12-byte notification payload. Bytes past the twelfth are ignored.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        require_len(payload, MEASUREMENT_PAYLOAD_LEN)?;
        Ok(Self {
            position: read_f32_be(payload, 0),
            velocity: read_f32_be(payload, 4),
            torque: read_f32_be(payload, 8),
        })
    }
}

/// Leading byte of frames sent by the motor
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiveType {
    Read = 0x40,
    MotorMeasurement = 0xB4,
    ImuMeasurement = 0xB5,
    ErrorStatus = 0xBE,
}

impl TryFrom<u8> for ReceiveType {
    type Error = CodecError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x40 => Ok(ReceiveType::Read),
            0xB4 => Ok(ReceiveType::MotorMeasurement),
            0xB5 => Ok(ReceiveType::ImuMeasurement),
            0xBE => Ok(ReceiveType::ErrorStatus),
            other => Err(CodecError::UnrecognizedOpcode(other)),
        }
    }
}

/// A classified inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    MotorMeasurement(MotorMeasurement),
    /// Recognized receive type whose payload is passed through undecoded
    Raw { kind: ReceiveType, payload: Vec<u8> },
}

/// Classify an inbound frame by its receive-type byte
pub fn decode_inbound(frame: &[u8]) -> Result<Inbound> {
    let (&first, payload) = frame.split_first().ok_or(CodecError::TruncatedFrame {
        expected: 1,
        actual: 0,
    })?;

    match ReceiveType::try_from(first)? {
        ReceiveType::MotorMeasurement => {
            MotorMeasurement::decode(payload).map_err(|e| match e {
                // Report lengths against the whole frame, header included
                CodecError::TruncatedFrame { expected, actual } => CodecError::TruncatedFrame {
                    expected: expected + 1,
                    actual: actual + 1,
                },
                other => other,
            })
            .map(Inbound::MotorMeasurement)
        }
        kind => Ok(Inbound::Raw {
            kind,
            payload: payload.to_vec(),
        }),
    }
}

fn require_len(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(CodecError::TruncatedFrame {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Caller guarantees `bytes.len() >= offset + 4`
fn read_f32_be(bytes: &[u8], offset: usize) -> f32 {
    f32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
