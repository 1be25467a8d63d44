//! chordmap daemon
//!
//! Grabs keyboards and runs the remapping engine on their events.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chordmap_daemon::device::{self, DeviceInfo};
use chordmap_daemon::injector::VirtualDevice;
use chordmap_daemon::reader;
use chordmap_daemon::{BindingTable, Engine, EventWriter};
use clap::Parser;
use nix::unistd::{access, AccessFlags};
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{reload, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "chordmapd")]
#[command(about = "Tap/hold and chord remapping daemon for evdev keyboards")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "~/.config/chordmap/config.kdl")]
    config: String,

    /// Device node to read instead of the configured devices (repeatable)
    #[arg(short, long = "device", value_name = "PATH")]
    devices: Vec<PathBuf>,

    /// Read devices without grabbing them
    #[arg(long)]
    no_grab: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG wins; otherwise the config's log-level is applied once loaded
    let env_filter = EnvFilter::try_from_default_env().ok();
    let has_env_filter = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config_path: PathBuf = shellexpand::tilde(&args.config).into_owned().into();
    tracing::info!("Loading configuration from {}", config_path.display());

    let config = chordmap_config::parse_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if !has_env_filter {
        filter_handle
            .modify(|filter| *filter = EnvFilter::new(config.global.log_level.as_filter()))
            .context("Failed to apply configured log level")?;
    }

    let table = BindingTable::from_config(&config).context("Invalid binding in configuration")?;
    tracing::info!(
        "Loaded {} binding(s) and {} device(s)",
        table.len(),
        config.devices.len()
    );

    access("/dev/uinput", AccessFlags::R_OK | AccessFlags::W_OK).context(
        "No read/write access to /dev/uinput; load the uinput module and check permissions",
    )?;

    let available = device::enumerate_devices()?;
    let paths = select_devices(&args, &config, &available)?;

    let output = VirtualDevice::new_keyboard(&config.global.output_name)?;

    let mut streams = Vec::with_capacity(paths.len());
    for path in &paths {
        let opened = device::open_device(path, !args.no_grab)?;
        let stream = opened
            .device
            .into_event_stream()
            .with_context(|| format!("Failed to create event stream for {}", opened.name))?;
        streams.push((opened.name, stream));
    }

    let mut engine = Engine::new(table, EventWriter::new(output));
    engine.set_passthrough(config.global.passthrough);
    let exit = engine.exit_handle();

    let (sender, mut source) = reader::channel();
    let reader_task = tokio::spawn(reader::forward_devices(streams, sender.clone()));
    let mut engine_task = tokio::task::spawn_blocking(move || engine.run(&mut source));

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tracing::info!("chordmap daemon running on {} device(s)", paths.len());

    let result = tokio::select! {
        result = &mut engine_task => result,
        _ = shutdown_signal(&mut sigterm) => {
            tracing::info!("Shutting down...");
            exit.request();
            sender.shutdown();
            engine_task.await
        }
    };

    // Dropping the streams releases the grabs
    reader_task.abort();

    result
        .context("Engine thread panicked")?
        .context("Event loop stopped on a device error")?;

    Ok(())
}

/// Devices from `--device`, else from the config, else every keyboard.
fn select_devices(
    args: &Args,
    config: &chordmap_config::Config,
    available: &[DeviceInfo],
) -> Result<Vec<PathBuf>> {
    let paths = if !args.devices.is_empty() {
        args.devices.clone()
    } else if !config.devices.is_empty() {
        config
            .devices
            .iter()
            .map(|d| device::resolve_device(d, available))
            .collect::<Result<Vec<_>>>()?
    } else {
        tracing::info!("No devices configured, using every keyboard");
        device::default_keyboards(available, &config.global.output_name)
    };

    if paths.is_empty() {
        bail!("No keyboard found to read from");
    }
    Ok(paths)
}

async fn shutdown_signal(sigterm: &mut Signal) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}
