//! Reads the factory MAC address from an ESP8266's OTP registers.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use esp8266tool::session::SessionConfig;
use esp8266tool::transport::serial::DEFAULT_BAUD_RATE;
use esp8266tool::{SerialConfig, Session};
use tracing_subscriber::EnvFilter;

/// Read MAC address from OTP ROM
#[derive(Debug, Parser)]
#[command(name = "read_mac", version)]
struct Args {
    /// Serial port device
    #[arg(long)]
    port: String,

    /// Baud rate
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Give up on an unresponsive device after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

async fn run(args: &Args) -> esp8266tool::Result<()> {
    tracing::info!("trying to establish connection with the device");

    let serial = SerialConfig::new(&args.port).baud_rate(args.baud);
    let mut config = SessionConfig::default();
    if let Some(secs) = args.timeout {
        config = config.exchange_timeout(Duration::from_secs(secs));
    }

    let mut session = Session::serial(&serial, config)?;
    session.sync().await?;

    let mac = session.read_mac().await?;
    tracing::info!("MAC address is: {}", mac);
    println!("{mac}");

    session.disconnect();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
