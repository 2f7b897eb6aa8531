//! Configuration file support for iqrf-ota.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (IQRF_OTA_*)
//! 3. Local config file (./iqrf-ota.toml or ./iqrf-ota-ports.toml)
//! 4. Global config file (~/.config/iqrf-ota/config.toml)
//!
//! ```toml
//! [port.connection]
//! serial = "/dev/ttyACM0"
//! baud = 57600
//!
//! [ota]
//! upload_dir = "/var/cache/iqrf-gateway-daemon/upload"
//! repeat = 2
//! timeout_ms = 1500
//! ```

use anyhow::Context;
use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCAL_CONFIG: &str = "iqrf-ota.toml";
const LOCAL_PORTS_CONFIG: &str = "iqrf-ota-ports.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// USB adapter remembered for auto-detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

/// Port-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Known USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

impl PortConfig {
    /// Whether a remembered adapter has this VID/PID.
    pub fn knows(&self, vid: u16, pid: u16) -> bool {
        self.usb_device.iter().any(|d| d.vid == vid && d.pid == pid)
    }
}

/// Defaults for OTA requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtaConfig {
    /// Directory bare image file names are resolved against.
    pub upload_dir: Option<PathBuf>,
    /// Default extra attempts per command.
    pub repeat: Option<u8>,
    /// Allow internal EEPROM data by default.
    #[serde(default)]
    pub upload_eeprom_data: bool,
    /// Allow external EEPROM data by default.
    #[serde(default)]
    pub upload_eeeprom_data: bool,
    /// Response timeout of the coordinator UART in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl OtaConfig {
    /// Configured upload directory, or `upload` in the platform cache directory.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(|| {
            ProjectDirs::from("", "", "iqrf-ota").map_or_else(
                || PathBuf::from("upload"),
                |dirs| dirs.cache_dir().join("upload"),
            )
        })
    }

    /// Configured response timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// OTA request defaults.
    #[serde(default)]
    pub ota: OtaConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Local config overrides global
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        if let Some(ports_config) = Self::load_ports_config() {
            config.port = ports_config;
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!("Could not load config from {}, using defaults", path.display());
            Self::default()
        }
    }

    /// Load one config file, warning about unreadable ones.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {} (invalid TOML): {e}", path.display());
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            },
        }
    }

    /// Load remembered ports, local file first.
    fn load_ports_config() -> Option<PortConfig> {
        let candidates = std::iter::once(PathBuf::from(LOCAL_PORTS_CONFIG))
            .chain(Self::global_config_dir().map(|dir| dir.join("ports.toml")));

        for path in candidates {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            match toml::from_str(&content) {
                Ok(config) => {
                    debug!("Loaded ports config from {}", path.display());
                    return Some(config);
                },
                Err(e) => warn!("Ignoring ports config {}: {e}", path.display()),
            }
        }
        None
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "iqrf-ota").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.port.connection.serial.is_some() {
            self.port.connection.serial = other.port.connection.serial;
        }
        if other.port.connection.baud.is_some() {
            self.port.connection.baud = other.port.connection.baud;
        }
        self.port.usb_device.extend(other.port.usb_device);

        if other.ota.upload_dir.is_some() {
            self.ota.upload_dir = other.ota.upload_dir;
        }
        if other.ota.repeat.is_some() {
            self.ota.repeat = other.ota.repeat;
        }
        if other.ota.timeout_ms.is_some() {
            self.ota.timeout_ms = other.ota.timeout_ms;
        }
        self.ota.upload_eeprom_data |= other.ota.upload_eeprom_data;
        self.ota.upload_eeeprom_data |= other.ota.upload_eeeprom_data;
    }

    /// Remember a USB adapter for future auto-detection.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        if self.port.knows(vid, pid) {
            return Ok(());
        }

        // Local file if the project already has one, global otherwise
        let path = if Path::new(LOCAL_PORTS_CONFIG).exists() || Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_PORTS_CONFIG)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)
                .with_context(|| format!("Cannot create {}", global_dir.display()))?;
            global_dir.join("ports.toml")
        } else {
            PathBuf::from(LOCAL_PORTS_CONFIG)
        };

        self.port.usb_device.push(UsbDevice { vid, pid });
        self.save_ports(&path)
    }

    fn save_ports(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(&self.port)?;
        fs::write(path, content).with_context(|| format!("Cannot write {}", path.display()))?;
        info!("Saved USB device to {}", path.display());
        Ok(())
    }
}
