// 50 Hz loop bridging Zenoh commands to one KeiganMotor, with a watchdog
// Note: run/run-at-velocity keep the motor turning on their own, so if the
// command source dies the watchdog sends a single stop

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, MOTOR_ENABLED, TOPIC_CMD_MOTOR, TOPIC_HEALTH, TOPIC_MEASUREMENT,
};
use crate::messages::{MotorCommand, MotorState, RuntimeHealth};
use crate::motor::{
    LedState, LoggingTransport, MotorError, MotorMeasurement, MotorSession, Transport,
};

/// Where the runtime finds its motor
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub i2c_device: String,
    pub address: u8,
    pub motor_enabled: bool,
}

pub struct Runtime<T: Transport> {
    session: MotorSession<T>,
    motion_cmd_at: Option<Instant>,
    health: RuntimeHealth,
}

impl<T: Transport> Runtime<T> {
    pub fn new(session: MotorSession<T>) -> Self {
        Self {
            session,
            motion_cmd_at: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn session(&self) -> &MotorSession<T> {
        &self.session
    }

    /// Apply one incoming command
    pub fn on_command(&mut self, cmd: MotorCommand, now: Instant) -> Result<(), MotorError> {
        info!("Received command: {:?}", &cmd);
        if let Err(e) = self.apply(&cmd) {
            if !e.is_invalid_parameter() {
                self.health = RuntimeHealth::MotorFault;
            }
            return Err(e);
        }

        if cmd.is_continuous_motion() {
            self.motion_cmd_at = Some(now);
        } else if cmd.ends_continuous_motion() {
            self.motion_cmd_at = None;
        }
        self.health = RuntimeHealth::Ok;
        Ok(())
    }

    fn apply(&mut self, cmd: &MotorCommand) -> Result<(), MotorError> {
        let session = &mut self.session;
        match *cmd {
            MotorCommand::Enable => session.enable(),
            MotorCommand::Disable => session.disable(),
            MotorCommand::Stop => session.stop(),
            MotorCommand::Free => session.free(),
            MotorCommand::RunForward => session.run_forward(),
            MotorCommand::RunReverse => session.run_reverse(),
            MotorCommand::SpeedRpm { rpm } => session.speed_rpm(rpm),
            MotorCommand::RunAtRpm { rpm } => session.run_at_rpm(rpm),
            MotorCommand::MoveToDegree { deg } => session.move_to_degree(deg),
            MotorCommand::MoveByDegree { deg } => session.move_by_degree(deg),
            MotorCommand::Led {
                state,
                red,
                green,
                blue,
            } => {
                let state = LedState::try_from(state)?;
                session.led(state, red, green, blue)
            }
            MotorCommand::SaveAllRegisters => session.save_all_registers(),
        }
    }

    /// Stop the motor once if continuous motion has not been refreshed in time
    pub fn watchdog(&mut self, now: Instant) -> RuntimeHealth {
        let Some(at) = self.motion_cmd_at else {
            return self.health;
        };

        let cmd_age = now.saturating_duration_since(at);
        if cmd_age > CMD_TIMEOUT {
            warn!("Command stale ({:?} old), stopping motor", cmd_age);
            self.motion_cmd_at = None;
            self.health = match self.session.stop() {
                Ok(()) => RuntimeHealth::CmdStale,
                Err(e) => {
                    warn!("Watchdog stop failed: {}", e);
                    RuntimeHealth::MotorFault
                }
            };
        }
        self.health
    }

    /// Poll a measurement when the transport can answer reads
    pub fn poll_measurement(&mut self) -> Option<MotorMeasurement> {
        if !self.session.transport().capabilities().request {
            return None;
        }
        match self.session.read_motor_measurement() {
            Ok(m) => {
                if self.health == RuntimeHealth::MotorFault {
                    info!("Measurement read recovered");
                    self.health = if self.motion_cmd_at.is_some() {
                        RuntimeHealth::Ok
                    } else {
                        RuntimeHealth::CmdStale
                    };
                }
                Some(m)
            }
            Err(e) => {
                warn!("Measurement read failed: {}", e);
                self.health = RuntimeHealth::MotorFault;
                None
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn open_motor(config: &RuntimeConfig) -> Result<Box<dyn Transport>, Box<dyn std::error::Error + Send + Sync>> {
    info!(
        "Opening I2C bus {} (motor at 0x{:02X})",
        config.i2c_device, config.address
    );
    let bus = linux_embedded_hal::I2cdev::new(&config.i2c_device)?;
    Ok(Box::new(crate::motor::I2cTransport::new(bus, config.address)))
}

#[cfg(not(target_os = "linux"))]
fn open_motor(config: &RuntimeConfig) -> Result<Box<dyn Transport>, Box<dyn std::error::Error + Send + Sync>> {
    Err(format!(
        "I2C bus {} is only available on Linux; run with --no-motor",
        config.i2c_device
    )
    .into())
}

pub async fn run(config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let transport: Box<dyn Transport> = if config.motor_enabled && MOTOR_ENABLED {
        open_motor(&config)?
    } else {
        Box::new(LoggingTransport::new("simulated"))
    };
    let session = MotorSession::new(transport).with_stop_on_drop(true);

    info!("Opening Zenoh session...");
    let zenoh_session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = zenoh_session.declare_subscriber(TOPIC_CMD_MOTOR).await?;
    let pub_measurement = zenoh_session.declare_publisher(TOPIC_MEASUREMENT).await?;
    let pub_health = zenoh_session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new(session);
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_MOTOR);
    info!("Publishing to: {}, {}", TOPIC_MEASUREMENT, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), in arrival order
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<MotorCommand>(&payload) {
                Ok(cmd) => {
                    if let Err(e) = runtime.on_command(cmd, Instant::now()) {
                        warn!("Command failed: {}", e);
                    }
                }
                Err(e) => {
                    warn!("Failed to parse command: {}", e);
                }
            }
        }

        // 2. Watchdog
        runtime.watchdog(Instant::now());

        // 3. Publish measurement
        if let Some(m) = runtime.poll_measurement() {
            let state = MotorState::new(runtime.session().peer_id(), &m);
            pub_measurement.put(serde_json::to_string(&state)?).await?;
        }

        // 4. Publish health, including the outcome of this tick's poll
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motor::testing::MockTransport;

    fn runtime(mock: &MockTransport) -> Runtime<MockTransport> {
        Runtime::new(MotorSession::new(mock.clone()))
    }

    #[test]
    fn test_commands_applied_in_order() {
        let mock = MockTransport::send_only("km");
        let mut rt = runtime(&mock);
        let now = Instant::now();

        rt.on_command(MotorCommand::Enable, now).unwrap();
        rt.on_command(MotorCommand::SpeedRpm { rpm: 60.0 }, now).unwrap();
        rt.on_command(MotorCommand::RunForward, now).unwrap();

        let opcodes: Vec<u8> = mock.sent().iter().map(|f| f[0]).collect();
        assert_eq!(opcodes, vec![0x51, 0x58, 0x60]);
        assert_eq!(rt.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_stops_once_when_stale() {
        let mock = MockTransport::send_only("km");
        let mut rt = runtime(&mock);
        let start = Instant::now();

        rt.on_command(MotorCommand::RunAtRpm { rpm: 30.0 }, start).unwrap();
        assert_eq!(rt.watchdog(start + Duration::from_millis(100)), RuntimeHealth::Ok);
        assert_eq!(mock.sent().len(), 1);

        let late = start + CMD_TIMEOUT + Duration::from_millis(1);
        assert_eq!(rt.watchdog(late), RuntimeHealth::CmdStale);
        assert_eq!(mock.sent().last(), Some(&vec![0x6D, 0, 0, 0, 0]));

        // Already stopped, no repeated stop frames
        rt.watchdog(late + Duration::from_secs(1));
        assert_eq!(mock.sent().len(), 2);
    }

    #[test]
    fn test_watchdog_ignores_discrete_commands() {
        let mock = MockTransport::send_only("km");
        let mut rt = runtime(&mock);
        let start = Instant::now();

        rt.on_command(MotorCommand::MoveByDegree { deg: 90.0 }, start).unwrap();
        rt.watchdog(start + Duration::from_secs(5));
        assert_eq!(mock.sent().len(), 1);

        rt.on_command(MotorCommand::RunReverse, start).unwrap();
        rt.on_command(MotorCommand::Stop, start).unwrap();
        rt.watchdog(start + Duration::from_secs(5));
        assert_eq!(mock.sent().len(), 3);
    }

    #[test]
    fn test_position_move_disarms_watchdog() {
        let mock = MockTransport::send_only("km");
        let mut rt = runtime(&mock);
        let start = Instant::now();

        rt.on_command(MotorCommand::RunForward, start).unwrap();
        rt.on_command(
            MotorCommand::MoveToDegree { deg: 90.0 },
            start + Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(rt.watchdog(start + Duration::from_millis(300)), RuntimeHealth::Ok);

        let opcodes: Vec<u8> = mock.sent().iter().map(|f| f[0]).collect();
        assert_eq!(opcodes, vec![0x60, 0x66]);
    }

    #[test]
    fn test_invalid_led_command_rejected() {
        let mock = MockTransport::send_only("km");
        let mut rt = runtime(&mock);
        let now = Instant::now();

        let err = rt
            .on_command(
                MotorCommand::Led {
                    state: 9,
                    red: 0,
                    green: 0,
                    blue: 0,
                },
                now,
            )
            .unwrap_err();
        assert!(err.is_invalid_parameter());
        assert_eq!(mock.io_count(), 0);
        assert_ne!(rt.health(), RuntimeHealth::MotorFault);
    }

    #[test]
    fn test_transport_failure_marks_fault() {
        let mock = MockTransport::send_only("km");
        mock.fail_send(true);
        let mut rt = runtime(&mock);
        assert!(rt.on_command(MotorCommand::Enable, Instant::now()).is_err());
        assert_eq!(rt.health(), RuntimeHealth::MotorFault);
    }

    #[test]
    fn test_poll_measurement() {
        let mock = MockTransport::bus("i2c@0x20");
        let mut response = vec![0xB4];
        response.extend_from_slice(&0.5f32.to_be_bytes());
        response.extend_from_slice(&1.5f32.to_be_bytes());
        response.extend_from_slice(&(-0.25f32).to_be_bytes());
        mock.queue_response(response);
        let mut rt = runtime(&mock);

        let m = rt.poll_measurement().unwrap();
        assert_eq!((m.position, m.velocity, m.torque), (0.5, 1.5, -0.25));

        // Nothing queued: peer does not answer
        assert!(rt.poll_measurement().is_none());
        assert_eq!(rt.health(), RuntimeHealth::MotorFault);

        let send_only = MockTransport::send_only("km");
        assert!(runtime(&send_only).poll_measurement().is_none());
        assert_eq!(send_only.io_count(), 0);
    }

    #[test]
    fn test_poll_recovers_from_fault() {
        let mock = MockTransport::bus("i2c@0x20");
        let mut rt = runtime(&mock);

        assert!(rt.poll_measurement().is_none());
        assert_eq!(rt.health(), RuntimeHealth::MotorFault);

        let mut response = vec![0xB4];
        for v in [0.0f32, 0.0, 0.0] {
            response.extend_from_slice(&v.to_be_bytes());
        }
        mock.queue_response(response);
        assert!(rt.poll_measurement().is_some());
        assert_eq!(rt.watchdog(Instant::now()), RuntimeHealth::CmdStale);

        // A later successful command clears a send fault
        mock.fail_send(true);
        assert!(rt.on_command(MotorCommand::RunForward, Instant::now()).is_err());
        mock.fail_send(false);
        rt.on_command(MotorCommand::RunForward, Instant::now()).unwrap();
        assert_eq!(rt.health(), RuntimeHealth::Ok);
    }
}
