//! Loopback tests for the CDC-UART bridge firmware.
//!
//! Flash the firmware, wire the bridge's TX to RX and RTS to CTS, then run
//! this against the enumerated CDC ACM port. Every byte written to the
//! port must come back unchanged.

mod device;
mod tests;

use clap::Parser;
use colored::Colorize;

use device::{resolve_port, BridgePort};
use tests::{print_results, run_all_tests, Variant};

#[derive(Parser)]
#[command(name = "integration-tests")]
#[command(about = "Loopback tests for the CDC-UART bridge firmware")]
struct Args {
    /// Serial port for the bridge (use "auto" to find it by USB VID/PID)
    #[arg(short, long, default_value = "auto")]
    port: String,

    /// Firmware was built with the software serial backend
    #[arg(long)]
    soft: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Resolve port (auto-detect if "auto")
    let port = resolve_port(&args.port)?;
    let variant = if args.soft {
        Variant::Software
    } else {
        Variant::Hardware
    };

    println!("{}", "CDC-UART Bridge Loopback Tests".bold());
    println!("Port: {}", port);
    println!("Backend: {:?}", variant);
    println!();

    println!("Connecting to bridge...");
    let mut bridge = BridgePort::open(&port, variant.default_baud())?;

    // Let the line settle after enumeration, then discard anything stale
    std::thread::sleep(std::time::Duration::from_millis(500));
    bridge.drain()?;
    println!("{}", "Connected!".green());

    println!("\nRunning tests...\n");

    let results = run_all_tests(&mut bridge, variant);
    print_results(&results);

    // Exit with error code if any tests failed
    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
