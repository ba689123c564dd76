//! Zenoh bridge for ABB ACS400 drives.
//!
//! Without a subcommand the bridge polls the drive and publishes telemetry.
//! The other subcommands talk to the drive once and print the result; they
//! do not connect to Zenoh.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use drivesight_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner, init_logging};
use tokio::sync::mpsc;

use zenoh_bridge_acs400::catalog::Catalog;
use zenoh_bridge_acs400::command::{PRESSURE_REFERENCE_COMMAND, subscribe_setpoints};
use zenoh_bridge_acs400::config::{Acs400BridgeConfig, Acs400Config};
use zenoh_bridge_acs400::dashboard::{BlynkClient, DashboardSink, watch_setpoint_pin};
use zenoh_bridge_acs400::gateway::{DumpEntry, Gateway};
use zenoh_bridge_acs400::poller::DrivePoller;
use zenoh_bridge_acs400::sink::ZenohSink;
use zenoh_bridge_acs400::transport::ModbusRtuTransport;

const DEFAULT_CONFIG: &str = "acs400.json5";

/// Pending setpoint commands; more than a handful means the loop is stuck.
const COMMAND_QUEUE: usize = 8;

/// Zenoh bridge for ABB ACS400 drives (Modbus RTU).
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-acs400")]
#[command(about = "Polls an ACS400 drive and publishes to Zenoh")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    args: BridgeArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the bridge (default)
    Run,
    #[command(flatten)]
    Diagnose(Diagnostic),
}

/// One-shot drive commands.
#[derive(Subcommand, Debug, Clone)]
enum Diagnostic {
    /// Read one catalog register
    Read {
        #[arg(long)]
        group: u16,
        #[arg(long)]
        index: u16,
    },
    /// Show relay output states
    Relays,
    /// Show digital input states
    Inputs,
    /// Show the process pressure
    Pressure,
    /// Read a whole group, or probe every parameter group
    Dump {
        #[arg(long)]
        group: Option<u16>,
    },
    /// Write a pressure reference in bar (needs write_enabled)
    SetPressure {
        #[arg(allow_negative_numbers = true)]
        bar: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.args.config_or(DEFAULT_CONFIG);
    let config = Acs400BridgeConfig::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    init_logging(config.logging(), &cli.args).context("Failed to init tracing")?;
    tracing::info!(config = %path.display(), "Loaded configuration");

    let catalog = Arc::new(config.build_catalog()?);
    let gateway = build_gateway(&config.acs400, catalog);

    match cli.command {
        None | Some(Command::Run) => run_bridge(config, gateway).await,
        Some(Command::Diagnose(diagnostic)) => diagnose(gateway, diagnostic).await,
    }
}

fn build_gateway(drive: &Acs400Config, catalog: Arc<Catalog>) -> Gateway<ModbusRtuTransport> {
    let transport = ModbusRtuTransport::new(drive.serial.clone(), drive.unit_id, drive.timeout());
    let gateway = Gateway::new(transport, catalog).with_pressure_map(drive.pressure.map);

    if drive.write_enabled {
        gateway.with_write_access()
    } else {
        gateway
    }
}

async fn run_bridge(
    config: Acs400BridgeConfig,
    gateway: Gateway<ModbusRtuTransport>,
) -> Result<()> {
    let drive = config.acs400.clone();

    let mut runner = BridgeRunner::new("acs400", config)
        .await
        .context("Failed to start bridge")?
        .with_status_publishing();

    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);

    let mut poller = DrivePoller::new(gateway, &drive)
        .with_sink(Arc::new(ZenohSink::new(runner.publisher(), &drive.device)));

    if let Some(dashboard) = &drive.dashboard {
        let client = Arc::new(
            BlynkClient::from_config(dashboard).context("Failed to create dashboard client")?,
        );
        poller = poller.with_sink(Arc::new(DashboardSink::new(
            client.clone(),
            dashboard.pins.clone(),
        )));

        if let Some(pin) = dashboard.setpoint_pin {
            runner.spawn(watch_setpoint_pin(
                client,
                pin,
                Duration::from_secs(dashboard.setpoint_poll_secs),
                commands_tx.clone(),
            ));
        }
    }

    let command_key = runner
        .publisher()
        .keys()
        .command(&drive.device, PRESSURE_REFERENCE_COMMAND);
    let session = runner.session().clone();
    runner.spawn_with_error(
        "setpoint-subscriber",
        subscribe_setpoints(session, command_key.clone(), commands_tx),
    );

    runner.spawn(poller.run(commands_rx));

    let metadata = serde_json::json!({
        "device": drive.device,
        "serial_port": drive.serial.port,
        "unit_id": drive.unit_id,
        "poll_interval_secs": drive.poll_interval_secs,
        "points": drive.points.iter().map(|p| &p.key).collect::<Vec<_>>(),
        "write_enabled": drive.write_enabled,
        "command_key": command_key,
        "dashboard": drive.dashboard.is_some(),
    });

    runner.run_with_metadata(Some(metadata)).await?;
    Ok(())
}

async fn diagnose(
    mut gateway: Gateway<ModbusRtuTransport>,
    diagnostic: Diagnostic,
) -> Result<()> {
    match diagnostic {
        Diagnostic::Read { group, index } => {
            let reading = gateway.read_scaled(group, index).await?;
            if let Some(entry) = gateway.catalog().lookup(group, index) {
                println!(
                    "{} {}: {} {} (raw {})",
                    entry.code(),
                    entry.name,
                    reading.scaled,
                    entry.unit,
                    reading.raw
                );
            }
        }
        Diagnostic::Relays => {
            for flag in gateway.read_relays().await?.flags() {
                println!("{}: {}", flag.name, on_off(flag.on));
            }
        }
        Diagnostic::Inputs => {
            for flag in gateway.read_digital_inputs().await?.flags() {
                println!("{}: {}", flag.name, on_off(flag.on));
            }
        }
        Diagnostic::Pressure => {
            let bar = gateway.read_pressure().await?;
            println!("pressure: {:.2} bar", bar);
        }
        Diagnostic::Dump { group: Some(group) } => {
            let lines = gateway.dump_group(group).await?;
            print_dump(&lines, true);
        }
        Diagnostic::Dump { group: None } => {
            let lines = gateway.dump_all().await;
            print_dump(&lines, false);
        }
        Diagnostic::SetPressure { bar } => {
            let ack = gateway.write_pressure_reference(bar).await?;
            println!(
                "pressure reference {} bar written to {:04} ({:.1} %, raw {})",
                ack.bar, ack.address, ack.signal_pct, ack.raw
            );
        }
    }
    Ok(())
}

fn print_dump(lines: &[DumpEntry], show_failures: bool) {
    let mut failed = 0;
    for line in lines {
        let (name, unit) = line
            .entry
            .as_ref()
            .map_or(("", ""), |e| (e.name.as_str(), e.unit.as_str()));
        match &line.outcome {
            Ok(reading) => println!("{:04} {:<20} {} {}", line.address, name, reading.scaled, unit),
            Err(e) => {
                failed += 1;
                if show_failures {
                    println!("{:04} {:<20} error: {}", line.address, name, e);
                }
            }
        }
    }
    println!("{} registers read, {} failed", lines.len() - failed, failed);
}

fn on_off(on: bool) -> &'static str {
    if on { "on" } else { "off" }
}
