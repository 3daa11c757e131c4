use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use keigan_motor::config::{I2C_ADDRESS, I2C_DEVICE};
use keigan_motor::runtime::RuntimeConfig;

/// Zenoh bridge for a KeiganMotor on an I2C bus
#[derive(Parser, Debug)]
#[command(name = "keigan-motor", version)]
struct Args {
    /// I2C character device the motor is attached to
    #[arg(long, default_value = I2C_DEVICE)]
    i2c_device: String,

    /// 7-bit I2C address of the motor (decimal or 0x-prefixed hex)
    #[arg(long, default_value_t = I2C_ADDRESS, value_parser = parse_address)]
    address: u8,

    /// Log frames instead of driving a motor
    #[arg(long)]
    no_motor: bool,
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    match parsed {
        Ok(address) if address <= 0x7F => Ok(address),
        Ok(address) => Err(format!("0x{:02X} is not a 7-bit address", address)),
        Err(e) => Err(e.to_string()),
    }
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(LevelFilter::INFO.into()))
        .init();

    let args = Args::parse();
    let config = RuntimeConfig {
        i2c_device: args.i2c_device,
        address: args.address,
        motor_enabled: !args.no_motor,
    };

    if let Err(e) = keigan_motor::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
