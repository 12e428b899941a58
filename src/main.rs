//! Binary entrypoint for the SMS gateway CLI.
//!
//! Commands:
//! - `start [--port <path>] [--http-port <n>] [--serve]` - run the gateway until Ctrl-C
//! - `init` - write a starter `config.toml`
//! - `probe --port <path> [-b <baud>]` - send one `AT` probe and print a JSON verdict
//! - `ports` - list serial ports present on this machine
//!
//! See the library crate docs for module-level details: `smsgate::`.
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::sync::Arc;

use smsgate::config::Config;
use smsgate::gateway::{Gateway, LoggingHooks};
use smsgate::serial::PortOpener;

#[derive(Parser)]
#[command(name = "smsgate")]
#[command(about = "An HTTP to SMS gateway for AT-command devices on a serial port")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway: HTTP intake and/or the serial dispatcher
    Start {
        /// Serial device to connect (e.g. /dev/ttyUSB0); implies connecting
        #[arg(short, long)]
        port: Option<String>,

        /// HTTP port to listen on; implies serving
        #[arg(long)]
        http_port: Option<u16>,

        /// Start the HTTP server even if `server.auto_start` is off
        #[arg(long)]
        serve: bool,
    },
    /// Write a default configuration file
    Init,
    /// Open a serial port, send one probe command and report the outcome
    Probe {
        /// Device serial port
        #[arg(short, long)]
        port: String,
        /// Baud rate
        #[arg(short = 'b', long, default_value_t = 9600)]
        baud: u32,
    },
    /// List available serial ports
    Ports,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            port,
            http_port,
            serve,
        } => {
            let mut config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting smsgate v{}", env!("CARGO_PKG_VERSION"));

            if let Some(http_port) = http_port {
                config.server.port = http_port;
            }
            let want_server = config.server.auto_start || serve || http_port.is_some();
            let want_device = config.serial.auto_connect || port.is_some();
            if !want_server && !want_device {
                bail!(
                    "nothing to start: enable server.auto_start or serial.auto_connect, or pass --serve / --port"
                );
            }

            let opener = serial_opener(&config);
            let mut gateway = Gateway::new(config, opener, Arc::new(LoggingHooks));

            if want_device {
                if let Err(e) = gateway.connect_device(port.as_deref()) {
                    // Keep accepting requests; they wait in the queue.
                    warn!("Failed to connect serial device: {} (continuing without device)", e);
                }
            }
            if want_server {
                if let Err(e) = gateway.start_server().await {
                    error!("{}", e);
                    gateway.shutdown().await;
                    return Err(e.into());
                }
            }

            tokio::signal::ctrl_c().await?;
            info!("Received shutdown signal");
            gateway.shutdown().await;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Probe { port, baud } => {
            let pre_config = Config::load(&cli.config).await.ok();
            init_logging(&pre_config, cli.verbose);
            let config = pre_config.unwrap_or_default();
            let ok = probe_device(&config, &port, baud);
            std::process::exit(if ok { 0 } else { 1 });
        }
        Commands::Ports => {
            init_logging(&None, cli.verbose);
            list_ports()?;
        }
    }

    Ok(())
}

#[cfg(feature = "serial")]
fn serial_opener(config: &Config) -> Arc<dyn PortOpener> {
    Arc::new(smsgate::serial::SerialPortOpener::new(
        config.serial.baud_rate,
        config.serial.timeout(),
    ))
}

#[cfg(not(feature = "serial"))]
fn serial_opener(_config: &Config) -> Arc<dyn PortOpener> {
    warn!("Serial support not compiled in, using mock device");
    Arc::new(smsgate::serial::mock::MockPortOpener::new())
}

#[cfg(feature = "serial")]
fn probe_device(config: &Config, port: &str, baud: u32) -> bool {
    use smsgate::serial::{commands, SerialLink, SerialPortOpener};

    let link = SerialLink::new(Arc::new(SerialPortOpener::new(baud, config.serial.timeout())));
    let mut guard = link.lock();
    let result = guard
        .open(port)
        .and_then(|_| guard.write_command(commands::probe(&config.serial.commands)));
    guard.close();

    let payload = serde_json::json!({
        "status": if result.is_ok() { "ok" } else { "failed" },
        "port": port,
        "baud": baud,
        "error": result.as_ref().err().map(|e| e.to_string()),
    });
    println!("{}", payload);
    result.is_ok()
}

#[cfg(not(feature = "serial"))]
fn probe_device(_config: &Config, port: &str, baud: u32) -> bool {
    error!("probe requires the 'serial' feature");
    let payload = serde_json::json!({
        "status": "unsupported",
        "port": port,
        "baud": baud,
    });
    println!("{}", payload);
    false
}

#[cfg(feature = "serial")]
fn list_ports() -> Result<()> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_ports() -> Result<()> {
    bail!("listing ports requires the 'serial' feature")
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match (verbosity, config) {
        (0, Some(cfg)) => cfg.logging.level_filter(),
        (0, None) => log::LevelFilter::Info,
        (1, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // RUST_LOG directives (e.g. `http=warn`) refine the base level per target
    builder.parse_env("RUST_LOG");

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] [{}] {}", ts, record.level(), record.target(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.target(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
