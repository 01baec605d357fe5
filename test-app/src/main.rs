// coinlink-cli -- operator tool for the coin controller board.
//
// Usage:
//   coinlink-cli ports
//   coinlink-cli commands
//   coinlink-cli --port /dev/ttyUSB0 send 1 S 5 300
//   coinlink-cli --prefix /dev/ttyUSB send 2 O --wait-ms 500 --listen 2
//   coinlink-cli monitor --duration 30 --listen 12
//   coinlink-cli shell

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use coinlink_core::CommandCode;
use coinlink_io::{Bridge, BridgeBuilder, Command as Frame, LineFilter, ResponseUnit};
use coinlink_transport::discovery::{self, DEFAULT_PORT_PREFIX};
use coinlink_transport::DEFAULT_BAUD_RATE;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// coinlink-cli -- send commands to and read responses from the coin controller.
#[derive(Parser)]
#[command(name = "coinlink-cli", version, about)]
struct Cli {
    /// Serial port path (e.g. /dev/ttyUSB0). Discovered by prefix if omitted.
    #[arg(long)]
    port: Option<String>,

    /// Path prefix used to discover the port.
    #[arg(long, default_value = DEFAULT_PORT_PREFIX)]
    prefix: String,

    /// Baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,

    /// Reader idle interval in milliseconds.
    #[arg(long, default_value_t = 1)]
    idle_ms: u64,

    /// Log at debug level (RUST_LOG overrides).
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports, marking the ones matching --prefix.
    Ports,

    /// List the command codes the controller understands.
    Commands,

    /// Send one command, then print the responses that arrive.
    Send {
        /// Destination address (single character).
        #[arg(value_parser = parse_address)]
        to: char,

        /// Command code (e.g. S, T, U, O, P).
        op: CommandCode,

        /// First operand (0-255).
        #[arg(default_value_t = 0)]
        operand1: u8,

        /// Second operand, sent as two seven-bit values.
        #[arg(default_value_t = 0)]
        operand2: u16,

        /// How long to collect responses after sending.
        #[arg(long, default_value_t = 250)]
        wait_ms: u64,

        /// Only print lines addressed to or from these characters.
        #[arg(long)]
        listen: Option<LineFilter>,
    },

    /// Print incoming lines as they arrive.
    Monitor {
        /// Duration in seconds (0 = run until Ctrl-C).
        #[arg(long, default_value_t = 0)]
        duration: u64,

        /// Only print lines addressed to or from these characters.
        #[arg(long)]
        listen: Option<LineFilter>,
    },

    /// Interactive prompt: `send <to> <op> [o1] [o2]`, `read [chars]`, `help`, `quit`.
    Shell,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a destination address: exactly one character.
fn parse_address(s: &str) -> std::result::Result<char, String> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("address must be a single character, got {s:?}")),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_bridge(cli: &Cli) -> Result<Bridge> {
    let mut builder = BridgeBuilder::new()
        .port_prefix(&cli.prefix)
        .baud_rate(cli.baud)
        .idle_interval(Duration::from_millis(cli.idle_ms));
    if let Some(port) = &cli.port {
        builder = builder.serial_port(port);
    }
    let port = builder.resolve_port()?;
    let bridge = builder
        .serial_port(&port)
        .build()
        .await
        .with_context(|| format!("failed to open {port}"))?;
    eprintln!("Connected to {port} at {} baud", cli.baud);
    Ok(bridge)
}

/// Print drained units. Returns `true` once a reader fault has been seen.
fn print_units(units: Vec<ResponseUnit>) -> bool {
    let mut faulted = false;
    for unit in units {
        match &unit {
            ResponseUnit::Line(_) => println!("{unit}"),
            ResponseUnit::Fault(_) => {
                eprintln!("[error] {unit}");
                faulted = true;
            }
        }
    }
    faulted
}

async fn close_bridge(bridge: Bridge) -> Result<()> {
    let queue = bridge.queue().clone();
    let outcome = bridge.shutdown().await?;
    print_units(queue.drain_all(None));
    if let Err(fault) = outcome {
        bail!("serial reader stopped: {fault}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_ports(prefix: &str) -> Result<()> {
    let ports = discovery::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }
    for port in ports {
        let marker = if port.starts_with(prefix) { "*" } else { " " };
        println!("{marker} {port}");
    }
    Ok(())
}

fn cmd_commands() {
    println!("Code  Description");
    println!("----  -----------");
    for code in CommandCode::ALL {
        println!("{:<4}  {}", code.as_char(), code.description());
    }
}

async fn cmd_send(
    bridge: &mut Bridge,
    frame: Frame,
    wait: Duration,
    listen: Option<&LineFilter>,
) -> Result<()> {
    println!("sending {}", String::from_utf8_lossy(&frame.encode()));
    bridge.send(&frame).await.context("failed to send command")?;
    tokio::time::sleep(wait).await;
    print_units(bridge.read(listen));
    Ok(())
}

async fn cmd_monitor(bridge: &Bridge, duration_secs: u64, listen: Option<&LineFilter>) -> Result<()> {
    println!("Monitoring responses (Ctrl-C to stop)...");

    let deadline = (duration_secs > 0).then(|| Instant::now() + Duration::from_secs(duration_secs));
    let mut tick = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tick.tick() => {
                if print_units(bridge.read(listen)) || bridge.reader_finished() {
                    break;
                }
                if deadline.is_some_and(|dl| Instant::now() >= dl) {
                    println!("Monitor duration elapsed.");
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Execute one shell line. Returns `false` when the shell should exit.
async fn shell_line(bridge: &mut Bridge, line: &str) -> Result<bool> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        [] => {}
        ["quit" | "exit"] => return Ok(false),
        ["help"] => cmd_commands(),
        ["read"] => {
            print_units(bridge.read(None));
        }
        ["read", ids] => {
            let filter = LineFilter::new(ids.chars());
            print_units(bridge.read(Some(&filter)));
        }
        ["send", to, op, rest @ ..] if rest.len() <= 2 => {
            let to = parse_address(to).map_err(anyhow::Error::msg)?;
            let op: CommandCode = op.parse()?;
            let operand1: u8 = match rest.first() {
                Some(v) => v.parse().context("operand1 must be 0-255")?,
                None => 0,
            };
            let operand2: u16 = match rest.get(1) {
                Some(v) => v.parse().context("operand2 must be 0-65535")?,
                None => 0,
            };
            let frame = Frame::new(to, op).with_operands(operand1, operand2);
            println!("sending {}", String::from_utf8_lossy(&frame.encode()));
            bridge.send(&frame).await?;
        }
        _ => println!("unrecognised input; try `help`, `send 1 S 5 300`, `read 12` or `quit`"),
    }
    Ok(true)
}

async fn cmd_shell(bridge: &mut Bridge) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match shell_line(bridge, &line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("[error] {e:#}"),
        }
        if bridge.reader_finished() {
            eprintln!("[warning] serial reader has stopped");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Command::Ports => return cmd_ports(&cli.prefix),
        Command::Commands => {
            cmd_commands();
            return Ok(());
        }
        _ => {}
    }

    let mut bridge = open_bridge(&cli).await?;

    let result = match &cli.command {
        Command::Send {
            to,
            op,
            operand1,
            operand2,
            wait_ms,
            listen,
        } => {
            let frame = Frame::new(*to, *op).with_operands(*operand1, *operand2);
            cmd_send(&mut bridge, frame, Duration::from_millis(*wait_ms), listen.as_ref()).await
        }
        Command::Monitor { duration, listen } => {
            cmd_monitor(&bridge, *duration, listen.as_ref()).await
        }
        Command::Shell => cmd_shell(&mut bridge).await,
        Command::Ports | Command::Commands => unreachable!("handled before connecting"),
    };

    let closed = close_bridge(bridge).await;
    result.and(closed)
}
