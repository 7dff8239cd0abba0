//! Runtime configuration
//!
//! Defaults match the deployed appliance; each field can be overridden
//! through a `PIBOX_*` environment variable.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub socket_path: PathBuf,
    pub sys_root: PathBuf,
    pub display_driver: String,
    pub backlight_pin: u32,
    pub font_regular: PathBuf,
    pub font_bold: PathBuf,
    pub splash_image: PathBuf,
    pub temp_probe: PathBuf,
    pub status_initial_delay: Duration,
    pub status_interval: Duration,
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/pibox/framebuffer.sock"),
            sys_root: PathBuf::from("/sys"),
            display_driver: "fb_st7789v".to_string(),
            backlight_pin: 22,
            font_regular: PathBuf::from("/usr/share/fonts/truetype/piboto/Piboto-Regular.ttf"),
            font_bold: PathBuf::from("/usr/share/fonts/truetype/piboto/Piboto-Bold.ttf"),
            splash_image: PathBuf::from("/usr/share/pibox/splash.png"),
            temp_probe: PathBuf::from("/home/pi/pitemp-2.sh"),
            status_initial_delay: Duration::from_secs(6),
            status_interval: Duration::from_secs(3),
            max_body_bytes: 32 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Defaults with overrides from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("PIBOX_SOCKET") {
            cfg.socket_path = v.into();
        }
        if let Some(v) = lookup("PIBOX_SYS_ROOT") {
            cfg.sys_root = v.into();
        }
        if let Some(v) = lookup("PIBOX_DISPLAY_DRIVER") {
            cfg.display_driver = v;
        }
        if let Some(v) = lookup("PIBOX_FONT_REGULAR") {
            cfg.font_regular = v.into();
        }
        if let Some(v) = lookup("PIBOX_FONT_BOLD") {
            cfg.font_bold = v.into();
        }
        if let Some(v) = lookup("PIBOX_SPLASH") {
            cfg.splash_image = v.into();
        }
        if let Some(v) = lookup("PIBOX_TEMP_PROBE") {
            cfg.temp_probe = v.into();
        }
        if let Some(pin) = parse_var(&lookup, "PIBOX_BACKLIGHT_PIN")? {
            cfg.backlight_pin = pin;
        }
        if let Some(secs) = parse_var(&lookup, "PIBOX_STATUS_DELAY_SECS")? {
            cfg.status_initial_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "PIBOX_STATUS_INTERVAL_SECS")? {
            cfg.status_interval = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var(&lookup, "PIBOX_MAX_BODY_BYTES")? {
            cfg.max_body_bytes = bytes;
        }

        Ok(cfg)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .with_context(|| format!("Failed to parse {key}='{v}'"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let cfg = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(cfg.socket_path, PathBuf::from("/var/run/pibox/framebuffer.sock"));
        assert_eq!(cfg.display_driver, "fb_st7789v");
        assert_eq!(cfg.backlight_pin, 22);
        assert_eq!(cfg.status_initial_delay, Duration::from_secs(6));
        assert_eq!(cfg.status_interval, Duration::from_secs(3));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_lookup(lookup_from(&[
            ("PIBOX_SOCKET", "/tmp/fb.sock"),
            ("PIBOX_BACKLIGHT_PIN", "18"),
            ("PIBOX_STATUS_INTERVAL_SECS", " 10 "),
        ]))
        .unwrap();
        assert_eq!(cfg.socket_path, PathBuf::from("/tmp/fb.sock"));
        assert_eq!(cfg.backlight_pin, 18);
        assert_eq!(cfg.status_interval, Duration::from_secs(10));
    }

    #[test]
    fn bad_number_names_the_variable() {
        let err = Config::from_lookup(lookup_from(&[("PIBOX_BACKLIGHT_PIN", "twenty")]))
            .unwrap_err();
        assert!(err.to_string().contains("PIBOX_BACKLIGHT_PIN"));
    }
}
