// Frame dump: prints the exact bytes each session operation puts on the wire.
// No hardware needed.
//
// Usage: cargo run --example frame_dump

use keigan_motor::motor::{Frame, LedState, MotorSession, Transport, TransportError, decode_command};

/// Prints every frame instead of writing it anywhere
struct PrintTransport;

impl Transport for PrintTransport {
    fn peer_id(&self) -> &str {
        "stdout"
    }

    fn send(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let bytes: Vec<String> = frame.as_bytes().iter().map(|b| format!("{:02X}", b)).collect();
        match decode_command(frame.as_bytes()) {
            Ok(cmd) => println!("  {:<26} {:?}", bytes.join(" "), cmd),
            Err(e) => println!("  {:<26} <{}>", bytes.join(" "), e),
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let mut motor = MotorSession::new(PrintTransport);

    println!("Actions:");
    motor.enable()?;
    motor.run_forward()?;
    motor.run_reverse()?;
    motor.stop()?;
    motor.free()?;
    motor.disable()?;

    println!("Values (sign is dropped, direction comes from the opcode):");
    motor.speed_rpm(30.0)?;
    motor.run_at_rpm(-30.0)?;
    motor.move_to_degree(90.0)?;
    motor.move_by_degree(-90.0)?;

    println!("Registers:");
    motor.max_speed(10.0)?;
    motor.acceleration(5.0)?;
    motor.save_all_registers()?;

    println!("LED:");
    motor.led(LedState::OnSolid, 255, 0, 0)?;
    motor.led(LedState::OnFlash, 0, 0, 255)?;
    if let Err(e) = motor.led(LedState::OnDim, 256, 0, 0) {
        println!("  rejected: {}", e);
    }

    Ok(())
}
