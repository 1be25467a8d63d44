//! chordmap CLI
//!
//! Configuration checks and device listing for chordmap.

use std::path::{Path, PathBuf};

use chordmap_config::{BindingConfig, Config};
use chordmap_daemon::device::enumerate_devices;
use chordmap_daemon::BindingTable;
use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;

#[derive(Parser, Debug)]
#[command(name = "chordmap")]
#[command(about = "Tap/hold and chord remapping for evdev keyboards")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/chordmap/config.kdl")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration file and its bindings
    Validate {
        /// Print the parsed configuration as JSON
        #[arg(long)]
        json: bool,
    },

    /// List available input devices
    Devices,
}

fn main() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let config_path: PathBuf = shellexpand::tilde(&cli.config).into_owned().into();

    match cli.command {
        Commands::Validate { json } => cmd_validate(&config_path, json),
        Commands::Devices => cmd_devices(),
    }
}

fn cmd_validate(config_path: &Path, json: bool) -> miette::Result<()> {
    let config = chordmap_config::parse_config(config_path)?;

    let table = BindingTable::from_config(&config)
        .map_err(|e| miette::miette!("{}: {}", e, e.source))?;

    if json {
        let triggers: Vec<String> = table.triggers().map(|t| t.to_string()).collect();
        let report = serde_json::json!({
            "config": config,
            "triggers": triggers,
        });
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        return Ok(());
    }

    println!("Validating configuration: {}", config_path.display());
    println!("Configuration is valid!");
    print_summary(&config, &table);
    Ok(())
}

fn print_summary(config: &Config, table: &BindingTable) {
    println!("  Output device: {}", config.global.output_name);
    println!(
        "  Passthrough: {}",
        if config.global.passthrough { "on" } else { "off" }
    );

    println!("  Devices: {}", config.devices.len());
    for device in &config.devices {
        match (&device.name, &device.path) {
            (_, Some(path)) => println!("    - {}", path.display()),
            (Some(name), None) => println!("    - {}", name),
            (None, None) => {}
        }
    }

    println!("  Bindings: {} declared, {} trigger(s)", config.bindings.len(), table.len());
    for binding in &config.bindings {
        println!("    - {}", binding.describe());
        if let BindingConfig::TapHold {
            timeout_ms: Some(ms),
            ..
        } = binding
        {
            println!("      (hold after {} ms)", ms);
        }
    }
}

fn cmd_devices() -> miette::Result<()> {
    println!("Available input devices:\n");

    let devices = enumerate_devices().map_err(|e| miette::miette!("{:#}", e))?;

    for device in devices {
        let device_type = if device.is_keyboard { "keyboard" } else { "other" };

        println!("  {} [{}]", device.name, device_type);
        println!("    Path: {}", device.path.display());
        println!("    ID: {}", device.vendor_product());
        println!();
    }

    Ok(())
}
