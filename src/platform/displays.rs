use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Console pseudo-device listed next to real framebuffers
const FBCON: &str = "fbcon";

#[derive(Debug, Clone)]
pub struct DisplayScanner {
    sys_root: PathBuf,
    dev_root: PathBuf,
    driver: String,
}

impl DisplayScanner {
    pub fn new(sys_root: impl Into<PathBuf>, driver: impl Into<String>) -> Self {
        Self {
            sys_root: sys_root.into(),
            dev_root: PathBuf::from("/dev"),
            driver: driver.into(),
        }
    }

    /// Device node of the first framebuffer driven by our panel driver
    pub fn find_display(&self) -> Result<PathBuf> {
        let graphics = self.sys_root.join("class").join("graphics");
        let mut names = Vec::new();

        for entry in fs::read_dir(&graphics)
            .with_context(|| format!("Failed to read {}", graphics.display()))?
        {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name != FBCON {
                names.push(name);
            }
        }
        names.sort();

        for name in names {
            let name_file = graphics.join(&name).join("name");
            let driver = fs::read_to_string(&name_file)
                .with_context(|| format!("Could not enumerate framebuffers: {}", name_file.display()))?;
            debug!("Framebuffer {name} is driven by {}", driver.trim());

            if driver.trim() == self.driver {
                let dev = self.dev_root.join(&name);
                info!("Displaying on {}", dev.display());
                return Ok(dev);
            }
        }

        Err(anyhow!(
            "No framebuffer driven by '{}' under {}",
            self.driver,
            graphics.display()
        ))
    }
}
