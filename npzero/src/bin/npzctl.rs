//! Command-line tool for planning and inspecting nPZero configurations.
//!
//! `plan` runs a configuration pass against the simulated device and prints
//! every register write it produced, so a configuration can be checked
//! before it goes near hardware.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;

use npzero::{
    peripheral::npz::{
        DeviceConfig, Npz,
        codec::AdcChannel,
        protocol::format_transaction,
        telemetry::AdcReading,
    },
    tracing::{self, prelude::*},
    transport::sim::{SimBus, Transaction},
};

/// nPZero configuration planner
#[derive(Parser, Debug)]
#[command(name = "npzctl")]
#[command(version)]
#[command(about = "Plan and inspect nPZero power-management configurations")]
struct Args {
    /// Log at DEBUG level (TRACE with -dd).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    debug: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the register writes a configuration produces.
    Plan {
        /// JSON configuration file.
        #[arg(required_unless_present = "preset", conflicts_with = "preset")]
        config: Option<PathBuf>,

        /// Use the built-in sensor node configuration.
        #[arg(long)]
        preset: bool,

        /// Read the configuration back afterwards and log it.
        #[arg(long)]
        dump: bool,

        /// Finish with the SLEEP command.
        #[arg(long)]
        sleep: bool,
    },

    /// Print the built-in sensor node configuration as JSON.
    Preset,

    /// Convert an ADC code to a voltage.
    Adc {
        channel: Channel,

        /// Code, decimal or 0x-prefixed hex.
        #[arg(value_parser = parse_byte)]
        code: u8,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Channel {
    Internal,
    External,
}

impl From<Channel> for AdcChannel {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Internal => AdcChannel::Internal,
            Channel::External => AdcChannel::External,
        }
    }
}

fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid code {:?}: {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.debug {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing::init(level);

    match args.command {
        Command::Plan {
            config,
            preset: _,
            dump,
            sleep,
        } => {
            let config = match config {
                Some(path) => load_config(&path)?,
                None => DeviceConfig::sensor_node(),
            };
            plan(&config, dump, sleep).await
        }
        Command::Preset => {
            let json = serde_json::to_string_pretty(&DeviceConfig::sensor_node())?;
            println!("{}", json);
            Ok(())
        }
        Command::Adc { channel, code } => {
            let reading = AdcReading {
                channel: channel.into(),
                code,
            };
            println!("{}", reading);
            if reading.millivolts().is_none() && !reading.is_disconnected() {
                bail!(
                    "code 0x{:02X} is not in the {} table",
                    code,
                    AdcChannel::from(channel)
                );
            }
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<DeviceConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn plan(config: &DeviceConfig, dump: bool, sleep: bool) -> Result<()> {
    let mut npz = Npz::new(SimBus::new());
    npz.init().await.context("Simulated device did not answer")?;
    npz.i2c_mut().clear_log();

    let report = npz.configure(config).await;
    if sleep {
        npz.sleep().await?;
    }

    for transaction in npz.i2c().transactions() {
        if let Transaction::Write { register, data } = transaction {
            println!("{}", format_transaction(*register, Some(data.as_slice()), false));
        }
    }
    println!();
    println!("{}", report);

    for allocation in report.allocations() {
        if let Some(bytes) = arena_bytes(npz.i2c(), allocation.range.addresses()) {
            debug!(slot = %allocation.slot, "Arena {}: {:02X?}", allocation.range, bytes);
        }
    }
    if dump {
        if sleep {
            npz.i2c_mut().wake();
        }
        npz.dump_configuration().await?;
    }

    if !report.is_success() {
        bail!("{} unit(s) failed", report.failures().count());
    }
    Ok(())
}

fn arena_bytes(bus: &SimBus, addresses: impl Iterator<Item = u8>) -> Option<Vec<u8>> {
    let bytes: Vec<u8> = addresses.map(|addr| bus.register(addr)).collect();
    (!bytes.is_empty()).then_some(bytes)
}
