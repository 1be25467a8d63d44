//! Device enumeration and selection

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chordmap_config::DeviceConfig;
use evdev::Device;

/// Information about an input device
#[derive(Debug)]
pub struct DeviceInfo {
    pub path: PathBuf,
    pub name: String,
    pub vendor: u16,
    pub product: u16,
    pub is_keyboard: bool,
}

impl DeviceInfo {
    /// Get vendor:product string (e.g., "3434:0361")
    pub fn vendor_product(&self) -> String {
        format!("{:04x}:{:04x}", self.vendor, self.product)
    }
}

/// A device opened for reading.
pub struct OpenedDevice {
    pub name: String,
    pub path: PathBuf,
    pub device: Device,
}

/// Enumerate all `/dev/input/event*` devices that can be opened
pub fn enumerate_devices() -> Result<Vec<DeviceInfo>> {
    let mut devices = Vec::new();

    for entry in std::fs::read_dir("/dev/input").context("Failed to read /dev/input")? {
        let entry = entry?;
        let path = entry.path();

        if !is_event_node(&path) {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                let id = device.input_id();
                devices.push(DeviceInfo {
                    name: device.name().unwrap_or("Unknown").to_string(),
                    vendor: id.vendor(),
                    product: id.product(),
                    is_keyboard: is_keyboard(&device),
                    path,
                });
            }
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    devices.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(devices)
}

fn is_event_node(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("event"))
        .unwrap_or(false)
}

/// Check if a device is a keyboard
pub fn is_keyboard(device: &Device) -> bool {
    device.supported_events().contains(evdev::EventType::KEY)
        && device
            .supported_keys()
            .map(|keys| keys.contains(evdev::Key::KEY_A))
            .unwrap_or(false)
}

/// Resolve one configured device to a node path.
///
/// A path wins over a name. A name matches the first keyboard whose evdev name
/// is equal to it.
pub fn resolve_device(config: &DeviceConfig, available: &[DeviceInfo]) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        return Ok(path.clone());
    }

    let Some(name) = &config.name else {
        bail!("Device entry has neither a name nor a path");
    };

    available
        .iter()
        .find(|info| info.is_keyboard && &info.name == name)
        .map(|info| info.path.clone())
        .with_context(|| format!("No keyboard named '{}' found", name))
}

/// Every keyboard except our own virtual output.
pub fn default_keyboards(available: &[DeviceInfo], output_name: &str) -> Vec<PathBuf> {
    available
        .iter()
        .filter(|info| info.is_keyboard && info.name != output_name)
        .map(|info| info.path.clone())
        .collect()
}

/// Open a device node, optionally grabbing it for exclusive access.
pub fn open_device(path: &Path, grab: bool) -> Result<OpenedDevice> {
    let mut device =
        Device::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let name = device.name().unwrap_or("Unknown").to_string();

    if grab {
        device
            .grab()
            .with_context(|| format!("Failed to grab {} ({})", name, path.display()))?;
        tracing::info!("Grabbed {} ({})", name, path.display());
    } else {
        tracing::info!("Opened {} ({}) without grabbing", name, path.display());
    }

    Ok(OpenedDevice {
        name,
        path: path.to_path_buf(),
        device,
    })
}
