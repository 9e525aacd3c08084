use clap::Parser;
use log::debug;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use serial_bridge::prelude::*;
use serial_bridge::serial::DEFAULT_BAUD_RATE;
use serial_bridge::serial::port::available_ports;

/// RS232C/UART serial data exchanger
///
/// Relays every byte received on one serial port to the other until Ctrl-C.
#[derive(Parser, Debug)]
#[command(name = "serial_bridge", version, about)]
struct Cli {
    /// serial device A
    #[arg(required_unless_present = "list")]
    device_a: Option<String>,

    /// serial device B
    #[arg(required_unless_present = "list")]
    device_b: Option<String>,

    /// baud rate applied to both ports
    #[arg(short = 's', long = "baudrate", default_value_t = DEFAULT_BAUD_RATE)]
    baud_rate: u32,

    /// echo relayed bytes: off, a2b (0), b2a (1) or both (2)
    #[arg(short, long, default_value = "off", allow_hyphen_values = true)]
    verbose: Verbosity,

    /// echo as timestamped hex lines instead of raw bytes
    #[arg(long)]
    hex: bool,

    /// idle wait of each pump in milliseconds
    #[arg(long = "poll-ms", default_value_t = 10)]
    poll_ms: u64,

    /// list serial ports and exit
    #[arg(long)]
    list: bool,
}

fn list_ports() -> ExitCode {
    match available_ports() {
        Ok(ports) => {
            for port in ports {
                println!("{}", port.port_name);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("serial_bridge: failed to list serial ports: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("serial_bridge=info"))
        .init();

    let cli = Cli::parse();
    if cli.list {
        return list_ports();
    }
    let (Some(device_a), Some(device_b)) = (cli.device_a, cli.device_b) else {
        eprintln!("serial_bridge: two serial devices are required");
        return ExitCode::FAILURE;
    };

    let config = BridgeConfig::new(device_a, device_b)
        .with_baud_rate(cli.baud_rate)
        .with_verbosity(cli.verbose)
        .with_echo_format(if cli.hex { EchoFormat::Hex } else { EchoFormat::Text })
        .with_poll_interval(Duration::from_millis(cli.poll_ms));
    let sink = Arc::new(ConsoleSink::new(config.echo_format));

    let mut bridge = Bridge::new(config, SerialOpener, sink);
    match bridge.run().await {
        Ok(report) => {
            debug!("Session ended: {report:?}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("serial_bridge: {e}");
            ExitCode::FAILURE
        }
    }
}
