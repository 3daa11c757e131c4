// Timeouts, topics, transport addressing
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Velocity commands older than this trigger a single stop
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_MOTOR: &str = "keigan/cmd/motor"; // commands
pub const TOPIC_MEASUREMENT: &str = "keigan/state/measurement"; // position/velocity/torque
pub const TOPIC_HEALTH: &str = "keigan/state/health"; // health status

// I2C bus transport
pub const I2C_DEVICE: &str = "/dev/i2c-1";
pub const I2C_ADDRESS: u8 = 0x20;

// Enable hardware motor control (set to false for simulation/testing)
pub const MOTOR_ENABLED: bool = true;

// BLE GATT layout of the motor
pub const BLE_SERVICE_UUID: &str = "f140ea35-8936-4d35-a0ed-dfcd795baa8c";
pub const BLE_CONTROL_CHAR_UUID: &str = "f1400001-8936-4d35-a0ed-dfcd795baa8c";
pub const BLE_LED_CHAR_UUID: &str = "f1400003-8936-4d35-a0ed-dfcd795baa8c";
pub const BLE_MOTOR_MEASUREMENT_CHAR_UUID: &str = "f1400004-8936-4d35-a0ed-dfcd795baa8c";
pub const BLE_IMU_MEASUREMENT_CHAR_UUID: &str = "f1400005-8936-4d35-a0ed-dfcd795baa8c";
pub const BLE_SETTING_CHAR_UUID: &str = "f1400006-8936-4d35-a0ed-dfcd795baa8c";

// Client Characteristic Configuration Descriptor (0x2902) values
pub const CCCD_ENABLE_NOTIFICATION: [u8; 2] = [0x01, 0x00];
pub const CCCD_DISABLE_NOTIFICATION: [u8; 2] = [0x00, 0x00];
