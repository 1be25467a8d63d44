//! Virtual keyboard output via uinput

use std::io;

use anyhow::{Context, Result};
use evdev::{uinput::VirtualDeviceBuilder, AttributeSet, EventType, InputEvent, Key};

use crate::key::KeyPhase;
use crate::writer::OutputSink;

/// The synthetic keyboard every remapped event is written to.
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualDevice {
    /// Create a virtual keyboard advertising every standard key code.
    ///
    /// # Errors
    ///
    /// Fails if `/dev/uinput` cannot be opened or the device cannot be built,
    /// usually a permissions problem.
    pub fn new_keyboard(name: &str) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }

        let device = VirtualDeviceBuilder::new()
            .context("Failed to open /dev/uinput")?
            .name(name)
            .with_keys(&keys)
            .context("Failed to register keys on virtual device")?
            .build()
            .with_context(|| format!("Failed to create virtual device '{}'", name))?;

        tracing::info!("Created virtual keyboard '{}'", name);
        Ok(Self { device })
    }
}

impl OutputSink for VirtualDevice {
    fn emit(&mut self, key: Key, phase: KeyPhase) -> io::Result<()> {
        let event = InputEvent::new(EventType::KEY, key.code(), phase.value());
        let syn = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        self.device.emit(&[event, syn])
    }
}
