// Keyboard teleop: W/S run forward/reverse, R/F speed, L cycle LED, space stop, X free, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use keigan_motor::config::TOPIC_CMD_MOTOR;
use keigan_motor::messages::MotorCommand;
use std::time::{Duration, Instant};
use tracing::info;

const SPEEDS_RPM: [f64; 3] = [10.0, 30.0, 60.0];
const LED_COLORS: [(i32, i32, i32); 3] = [(255, 0, 0), (0, 255, 0), (0, 0, 255)];
const INPUT_TIMEOUT_MS: u64 = 100; // Stop re-sending run commands after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_MOTOR).await?;

    info!("Controls: W/S=run, R/F=speed, L=LED, SPACE=stop, X=free, Q=quit");
    publish(&publisher, &MotorCommand::Enable).await?;
    publish(&publisher, &MotorCommand::SpeedRpm { rpm: SPEEDS_RPM[0] }).await?;
    print_speed(0);

    enable_raw_mode()?;
    let result = run_teleop(&publisher).await;
    disable_raw_mode()?;

    publish(&publisher, &MotorCommand::Stop).await?;
    result
}

async fn publish(
    publisher: &zenoh::pubsub::Publisher<'_>,
    cmd: &MotorCommand,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    publisher.put(serde_json::to_string(cmd)?).await?;
    Ok(())
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;
    let mut led_idx: usize = 0;

    // Direction held by the last movement key
    let mut running: Option<MotorCommand> = None;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        running = Some(MotorCommand::RunForward);
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        running = Some(MotorCommand::RunReverse);
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        publish(publisher, &MotorCommand::SpeedRpm { rpm: SPEEDS_RPM[speed_idx] }).await?;
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        publish(publisher, &MotorCommand::SpeedRpm { rpm: SPEEDS_RPM[speed_idx] }).await?;
                        print_speed(speed_idx);
                    }

                    KeyCode::Char('l') if pressed => {
                        led_idx = (led_idx + 1) % LED_COLORS.len();
                        let (red, green, blue) = LED_COLORS[led_idx];
                        publish(
                            publisher,
                            &MotorCommand::Led {
                                state: 1,
                                red,
                                green,
                                blue,
                            },
                        )
                        .await?;
                    }

                    KeyCode::Char(' ') if pressed => {
                        running = None;
                        publish(publisher, &MotorCommand::Stop).await?;
                    }
                    KeyCode::Char('x') if pressed => {
                        running = None;
                        publish(publisher, &MotorCommand::Free).await?;
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Let the runtime watchdog stop the motor once keys are released
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            running = None;
        }

        // Refresh the run command at ~50Hz while a movement key is held
        if let Some(cmd) = &running {
            publish(publisher, cmd).await?;
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {} ({} rpm)", label, SPEEDS_RPM[idx]);
}
