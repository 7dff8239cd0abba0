//! Platform-specific operations
//!
//! Handles the board around the panel: backlight GPIO, framebuffer
//! discovery and system metrics.

pub mod displays;
pub mod metrics;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Backlight enable line, driven through the sysfs GPIO interface
#[derive(Debug, Clone)]
pub struct Backlight {
    gpio_root: PathBuf,
    pin: u32,
}

impl Backlight {
    pub fn new(sys_root: impl AsRef<Path>, pin: u32) -> Self {
        Self {
            gpio_root: sys_root.as_ref().join("class").join("gpio"),
            pin,
        }
    }

    /// Export the pin if needed, make it an output and drive it high
    pub fn on(&self) -> Result<()> {
        let pin_dir = self.gpio_root.join(format!("gpio{}", self.pin));
        if !pin_dir.exists() {
            write_attr(&self.gpio_root.join("export"), &self.pin.to_string())?;
        }
        write_attr(&pin_dir.join("direction"), "out")?;
        write_attr(&pin_dir.join("value"), "1")?;

        info!("Backlight on (GPIO {})", self.pin);
        Ok(())
    }
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).with_context(|| format!("Failed to write '{value}' to {}", path.display()))
}
