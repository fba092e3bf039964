//! Echo Device Probe Tool
//!
//! A standalone tool to test serial communication with echo devices.
//! Opens the port, waits out the device reset, sends a text character by
//! character and prints what comes back.
//!
//! Usage:
//!   cargo run --example echo_probe -- [OPTIONS] [PORT]
//!
//! Options:
//!   --port PORT       Serial port (default: first detected, else /dev/ttyACM0)
//!   --baud RATE       Baud rate (default: 9600)
//!   --settle MS       Settle period after port open in ms (default: 2000)
//!   --timeout MS      Read timeout in ms (default: 1000)
//!   --delay MS        Inter-character delay in ms (default: 50)
//!   --text STRING     Text to send (default: "hello")
//!   --demo            Run against the built-in simulated echo peer
//!   --list            List available ports and exit

use echowire_core::sim::SimulatedEcho;
use echowire_core::transport::{self, Connection, ConnectionConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Parse arguments
    let mut port_name: Option<String> = None;
    let mut baud_rate = transport::DEFAULT_BAUD_RATE;
    let mut settle_ms = transport::DEFAULT_SETTLE_MS;
    let mut timeout_ms = transport::DEFAULT_TIMEOUT_MS;
    let mut delay_ms = transport::DEFAULT_INTER_SEND_DELAY_MS;
    let mut text = "hello".to_string();
    let mut demo = false;
    let mut list_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                i += 1;
                if i < args.len() {
                    port_name = Some(args[i].clone());
                }
            }
            "--baud" | "-b" => {
                i += 1;
                if i < args.len() {
                    baud_rate = args[i].parse().unwrap_or(transport::DEFAULT_BAUD_RATE);
                }
            }
            "--settle" | "-s" => {
                i += 1;
                if i < args.len() {
                    settle_ms = args[i].parse().unwrap_or(transport::DEFAULT_SETTLE_MS);
                }
            }
            "--timeout" | "-t" => {
                i += 1;
                if i < args.len() {
                    timeout_ms = args[i].parse().unwrap_or(transport::DEFAULT_TIMEOUT_MS);
                }
            }
            "--delay" | "-d" => {
                i += 1;
                if i < args.len() {
                    delay_ms = args[i].parse().unwrap_or(transport::DEFAULT_INTER_SEND_DELAY_MS);
                }
            }
            "--text" => {
                i += 1;
                if i < args.len() {
                    text = args[i].clone();
                }
            }
            "--demo" => {
                demo = true;
            }
            "--list" | "-l" => {
                list_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            arg if !arg.starts_with('-') => {
                port_name = Some(arg.to_string());
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
            }
        }
        i += 1;
    }

    if list_only {
        let ports = transport::list_ports();
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!(
                "{}  {}",
                port.name,
                port.product.as_deref().unwrap_or("(unknown device)")
            );
        }
        return ExitCode::SUCCESS;
    }

    let port_name = port_name.unwrap_or_else(|| {
        transport::list_ports()
            .first()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "/dev/ttyACM0".to_string())
    });

    let config = ConnectionConfig {
        port_name: port_name.clone(),
        baud_rate,
        timeout_ms,
        settle_ms,
        inter_send_delay_ms: delay_ms,
    };

    println!("Echo Device Probe");
    println!();
    println!("Configuration:");
    if demo {
        println!("  Port:              (simulated echo peer)");
    } else {
        println!("  Port:              {}", port_name);
    }
    println!("  Baud rate:         {}", baud_rate);
    println!("  Settle period:     {}ms", settle_ms);
    println!("  Read timeout:      {}ms", timeout_ms);
    println!("  Inter-char delay:  {}ms", delay_ms);
    println!("  Text:              {:?}", text);
    println!();

    // Open phase
    let mut conn = if demo {
        Connection::from_channel(Box::new(SimulatedEcho::new()), config)
    } else {
        let mut conn = Connection::new(config);
        println!("Opening serial port (device resets, settling)...");
        if let Err(e) = conn.open() {
            eprintln!("❌ Failed to open: {}", e);
            eprintln!("   Make sure the port exists and you have permission (dialout group)");
            return ExitCode::FAILURE;
        }
        conn
    };
    println!("✓ Connection open");
    println!();

    // Send phase
    for (ch, result) in text.chars().zip(conn.send_str(&text)) {
        match result {
            Ok(ack) if ack.is_empty() => {
                println!("  '{}' -> (no echo within timeout)", ch);
            }
            Ok(ack) => {
                println!("  '{}' -> echoed back {:?}", ch, ack.to_text());
            }
            Err(e) => {
                eprintln!("❌ Send failed: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let (tx, rx, sends) = conn.counters();
    println!();
    println!("✓ Session complete: {} sends, {} bytes out, {} bytes back", sends, tx, rx);
    conn.close();

    ExitCode::SUCCESS
}

fn print_help() {
    println!("Echo Device Probe Tool");
    println!();
    println!("Usage: echo_probe [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  --port, -p PORT     Serial port (default: first detected)");
    println!("  --baud, -b RATE     Baud rate (default: 9600)");
    println!("  --settle, -s MS     Settle period after open (default: 2000)");
    println!("  --timeout, -t MS    Read timeout (default: 1000)");
    println!("  --delay, -d MS      Inter-character delay (default: 50)");
    println!("  --text STRING       Text to send (default: \"hello\")");
    println!("  --demo              Use the built-in simulated echo peer");
    println!("  --list, -l          List available ports and exit");
    println!("  --help, -h          Show this help");
}
