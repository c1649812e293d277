//! mitemp service - BLE thermometer collector and WebSocket broadcaster.
//!
//! Run with: `cargo run -p mitemp-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use mitemp_core::scan::{ScanOptions, scan_with_options};
use mitemp_core::{SensorSession, is_valid_address};
use mitemp_service::config::default_config_path;
use mitemp_service::{AppState, Collector, Config, app, build_registry, subscribe};

/// mitemp service - collects Xiaomi thermometer readings and broadcasts
/// them over WebSocket.
#[derive(Parser, Debug)]
#[command(name = "mitemp-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Seconds between snapshots (overrides config).
    #[arg(short, long, global = true)]
    interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Connect to one sensor, print its readings and disconnect.
    Read {
        /// Hardware address of the sensor.
        #[arg(short, long)]
        address: String,

        /// Label to log the sensor under.
        #[arg(short, long, default_value = "sensor")]
        name: String,
    },

    /// List thermometers in range.
    Scan {
        /// Scan duration in seconds.
        #[arg(short, long, default_value_t = 10)]
        duration: u64,

        /// Show every BLE device, not just thermometers.
        #[arg(long)]
        all: bool,
    },

    /// Subscribe to a running service and print each snapshot.
    Watch {
        /// WebSocket URL of the stream.
        #[arg(short, long, default_value = "ws://127.0.0.1:8899/")]
        url: String,

        /// Pretty-print each payload.
        #[arg(long)]
        pretty: bool,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write a starter configuration file.
    Init {
        /// Where to write it (defaults to the standard config path).
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = Args::parse();
    init_logging()?;

    match args.command.take() {
        Some(Command::Read { address, name }) => read_sensor(&args, &name, &address).await,
        Some(Command::Scan { duration, all }) => scan(duration, all).await,
        Some(Command::Watch { url, pretty }) => watch(&url, pretty).await,
        Some(Command::Config {
            action: ConfigAction::Init { path, force },
        }) => init_config(path, force),
        Some(Command::Run) | None => run_server(args).await,
    }
}

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mitemp_service=info".parse()?)
                .add_directive("mitemp_core=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(interval) = args.interval {
        config.collector.interval = interval;
    }

    config.validate()?;
    Ok(config)
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if config.sensors.is_empty() {
        warn!(
            "No sensors configured; run `mitemp-service config init` to create {}",
            default_config_path().display()
        );
    }

    let registry = Arc::new(build_registry(&config)?);
    let state = AppState::new(config.clone(), Arc::clone(&registry));

    let report = registry.connect_all().await;
    for (name, result) in &report.results {
        if let Err(e) = result {
            warn!("Sensor {} unavailable at startup: {}", name, e);
        }
    }

    let sweep = registry.start_reconnect_sweep(state.shutdown.child_token());
    let collector = Collector::new(Arc::clone(&state)).start();

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app(Arc::clone(&state)))
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    state.shutdown.cancel();
    let (sweep, collector) = tokio::join!(sweep, collector);
    if let Err(e) = sweep {
        warn!("Reconnect sweep task failed: {}", e);
    }
    if let Err(e) = collector {
        warn!("Collector task failed: {}", e);
    }
    registry.disconnect_all().await;
    info!("Shutdown complete");

    Ok(())
}

/// Resolve on Ctrl-C, cancelling `token` so open WebSocket supervisors
/// close their connections.
async fn shutdown_signal(token: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
    token.cancel();
}

async fn read_sensor(args: &Args, name: &str, address: &str) -> anyhow::Result<()> {
    if !is_valid_address(address) {
        bail!("invalid address '{}': expected format 'XX:XX:XX:XX:XX:XX'", address);
    }

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.validate_ble()?;
    let session = SensorSession::ble(name, address, config.ble.session_config());

    session.connect().await?;
    let measurement = session.read_measurement().await;
    let battery = session.read_battery().await;
    if let Err(e) = session.disconnect().await {
        warn!("Failed to disconnect: {}", e);
    }

    let measurement = measurement?;
    println!("Sensor:      {} ({})", name, address);
    println!("Temperature: {:.2} °C", measurement.temperature);
    println!("Humidity:    {} %", measurement.humidity);
    match battery {
        Ok(level) => println!("Battery:     {} %", level),
        Err(e) => println!("Battery:     unavailable ({})", e),
    }
    if let Some(mv) = measurement.voltage_mv {
        println!("Voltage:     {} mV", mv);
    }

    Ok(())
}

async fn scan(duration: u64, all: bool) -> anyhow::Result<()> {
    let mut options = ScanOptions::new().duration(Duration::from_secs(duration));
    if all {
        options = options.all_devices();
    }

    let sensors = scan_with_options(options).await?;
    if sensors.is_empty() {
        println!("No devices found");
        return Ok(());
    }

    println!("{:<20} {:<24} {:>6}", "ADDRESS", "NAME", "RSSI");
    for sensor in sensors {
        println!(
            "{:<20} {:<24} {:>6}",
            sensor.identifier,
            sensor.name.as_deref().unwrap_or("Unknown"),
            sensor
                .rssi
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}

async fn watch(url: &str, pretty: bool) -> anyhow::Result<()> {
    let stream = subscribe(url).await?;
    futures::pin_mut!(stream);

    while let Some(payload) = stream.next().await {
        let payload = payload?;
        if pretty {
            let value: serde_json::Value = serde_json::from_str(&payload)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("{}", payload);
        }
    }

    info!("Stream closed by server");
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(default_config_path);
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    Config::example().save(&path)?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
