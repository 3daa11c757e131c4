// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::motor::MotorMeasurement;

// Command from teleop/scripts -> runtime, tagged by "op"
// e.g. {"op":"run_at_rpm","rpm":30.0} or {"op":"led","state":1,"red":255,"green":0,"blue":0}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MotorCommand {
    Enable,
    Disable,
    Stop,
    Free,
    RunForward,
    RunReverse,
    SpeedRpm { rpm: f64 },
    RunAtRpm { rpm: f64 },
    MoveToDegree { deg: f64 },
    MoveByDegree { deg: f64 },
    Led { state: u8, red: i32, green: i32, blue: i32 },
    SaveAllRegisters,
}

impl MotorCommand {
    /// Commands that keep the motor turning until told otherwise.
    /// The watchdog stops the motor if these stop arriving.
    pub fn is_continuous_motion(&self) -> bool {
        matches!(
            self,
            MotorCommand::RunForward | MotorCommand::RunReverse | MotorCommand::RunAtRpm { .. }
        )
    }

    /// Commands after which the motor is no longer in velocity mode
    pub fn ends_continuous_motion(&self) -> bool {
        matches!(
            self,
            MotorCommand::Stop
                | MotorCommand::Free
                | MotorCommand::Disable
                | MotorCommand::MoveToDegree { .. }
                | MotorCommand::MoveByDegree { .. }
        )
    }
}

// Measurement published by runtime -> consumers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MotorState {
    pub peer: String,
    pub position: f32,
    pub velocity: f32,
    pub torque: f32,
}

impl MotorState {
    pub fn new(peer: &str, m: &MotorMeasurement) -> Self {
        Self {
            peer: peer.to_string(),
            position: m.position,
            velocity: m.velocity,
            torque: m.torque,
        }
    }
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    MotorFault,
}
