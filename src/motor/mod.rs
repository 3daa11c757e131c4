// KeiganMotor protocol stack
//
// Provides:
// - Unit conversions (rpm, degrees <-> rad/s, rad)
// - Command codec shared by every transport
// - Transport abstraction with BLE and I2C adapters
// - High-level motor session API

pub mod ble;
pub mod i2c;
pub mod protocol;
mod session;
pub mod transport;
pub mod units;

#[cfg(test)]
pub(crate) mod testing;

pub use ble::{BleTransport, Characteristic, GattLink};
pub use i2c::I2cTransport;
pub use protocol::{
    CodecError, Command, Frame, Inbound, LedState, Magnitude, MotorMeasurement, Opcode, Rgb,
    decode_command, decode_inbound,
};
pub use session::{MeasurementSubscription, MotorError, MotorSession};
pub use transport::{
    Capabilities, FrameHandler, LoggingTransport, NotifyStream, SubscriptionId, Transport,
    TransportError,
};
