// BLE transport adapter
//
// The motor exposes one GATT service with a characteristic per command
// group plus notify-only measurement characteristics. Discovery and
// connection belong to whatever BLE stack implements `GattLink`; this
// adapter only routes frames and manages the measurement notification.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::protocol::{CommandGroup, Frame};
use super::transport::{
    Capabilities, FrameHandler, NotifyStream, Result, SubscriptionId, Transport, TransportError,
};
use crate::config::{
    BLE_CONTROL_CHAR_UUID, BLE_IMU_MEASUREMENT_CHAR_UUID, BLE_LED_CHAR_UUID,
    BLE_MOTOR_MEASUREMENT_CHAR_UUID, BLE_SETTING_CHAR_UUID, CCCD_DISABLE_NOTIFICATION,
    CCCD_ENABLE_NOTIFICATION,
};

/// Characteristics of the KeiganMotor service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    Control,
    Led,
    MotorMeasurement,
    ImuMeasurement,
    Setting,
}

impl Characteristic {
    pub fn uuid(self) -> &'static str {
        match self {
            Characteristic::Control => BLE_CONTROL_CHAR_UUID,
            Characteristic::Led => BLE_LED_CHAR_UUID,
            Characteristic::MotorMeasurement => BLE_MOTOR_MEASUREMENT_CHAR_UUID,
            Characteristic::ImuMeasurement => BLE_IMU_MEASUREMENT_CHAR_UUID,
            Characteristic::Setting => BLE_SETTING_CHAR_UUID,
        }
    }

    /// Characteristic a command group is written to
    pub fn for_group(group: CommandGroup) -> Self {
        match group {
            CommandGroup::Motion => Characteristic::Control,
            CommandGroup::Register => Characteristic::Setting,
            CommandGroup::Led => Characteristic::Led,
        }
    }

    fn for_stream(stream: NotifyStream) -> Self {
        match stream {
            NotifyStream::MotorMeasurement => Characteristic::MotorMeasurement,
        }
    }
}

/// Primitives a connected BLE peripheral must provide
pub trait GattLink: Send {
    /// Advertised local name of the peripheral
    fn device_name(&self) -> &str;

    fn write(&mut self, characteristic: Characteristic, data: &[u8], with_response: bool) -> Result<()>;

    /// Write the Client Characteristic Configuration Descriptor (0x2902)
    fn write_cccd(&mut self, characteristic: Characteristic, value: [u8; 2]) -> Result<()>;

    /// Deliver every notification payload of `characteristic` to `handler`
    fn register_notify(&mut self, characteristic: Characteristic, handler: FrameHandler) -> Result<()>;

    fn unregister_notify(&mut self, characteristic: Characteristic) -> Result<()>;
}

/// KeiganMotor over BLE
pub struct BleTransport<L: GattLink> {
    link: L,
    next_id: u64,
    subscriptions: HashMap<SubscriptionId, Characteristic>,
}

impl<L: GattLink> BleTransport<L> {
    pub fn new(link: L) -> Self {
        info!("BLE transport for '{}'", link.device_name());
        Self {
            link,
            next_id: 0,
            subscriptions: HashMap::new(),
        }
    }
}

impl<L: GattLink> Transport for BleTransport<L> {
    fn peer_id(&self) -> &str {
        self.link.device_name()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            request: false,
            subscribe: true,
        }
    }

    fn send(&mut self, frame: &Frame) -> Result<()> {
        let characteristic = Characteristic::for_group(frame.group());
        // Firmware up to 2.14 has no write-without-response on the LED characteristic
        let with_response = characteristic == Characteristic::Led;
        debug!(
            "[{}] write {:?} to {:?}",
            self.link.device_name(),
            frame,
            characteristic
        );
        self.link.write(characteristic, frame.as_bytes(), with_response)
    }

    fn subscribe(&mut self, stream: NotifyStream, handler: FrameHandler) -> Result<SubscriptionId> {
        let characteristic = Characteristic::for_stream(stream);
        if self.subscriptions.values().any(|&c| c == characteristic) {
            return Err(TransportError::link(
                self.link.device_name(),
                format!("{:?} notification already registered", characteristic),
            ));
        }

        if let Err(e) = self.link.write_cccd(characteristic, CCCD_ENABLE_NOTIFICATION) {
            warn!(
                "[{}] enabling {:?} notification failed: {}",
                self.link.device_name(),
                characteristic,
                e
            );
            return Err(e);
        }
        if let Err(e) = self.link.register_notify(characteristic, handler) {
            // Leave the peer the way we found it
            if let Err(rollback) = self.link.write_cccd(characteristic, CCCD_DISABLE_NOTIFICATION) {
                warn!(
                    "[{}] disabling {:?} notification after failed registration failed: {}",
                    self.link.device_name(),
                    characteristic,
                    rollback
                );
            }
            return Err(e);
        }

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscriptions.insert(id, characteristic);
        info!(
            "[{}] {:?} notification enabled",
            self.link.device_name(),
            characteristic
        );
        Ok(id)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let Some(&characteristic) = self.subscriptions.get(&id) else {
            return Err(TransportError::link(
                self.link.device_name(),
                format!("unknown subscription {:?}", id),
            ));
        };
        // Keep the entry until the peer is torn down so a failure can be retried
        self.link.unregister_notify(characteristic)?;
        self.link.write_cccd(characteristic, CCCD_DISABLE_NOTIFICATION)?;
        self.subscriptions.remove(&id);
        info!(
            "[{}] {:?} notification disabled",
            self.link.device_name(),
            characteristic
        );
        Ok(())
    }
}
