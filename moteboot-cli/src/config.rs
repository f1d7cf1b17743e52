//! Configuration file support for moteboot.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MOTEBOOT_*)
//! 3. Local config file (./moteboot.toml)
//! 4. Global config file (~/.config/moteboot/config.toml)
//!
//! Remembered USB bridges live in a separate ports file
//! (`./moteboot_ports.toml`, else the global `ports.toml`).

use {
    crate::BIN_NAME,
    directories::ProjectDirs,
    log::{debug, info, warn},
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

const LOCAL_CONFIG: &str = "moteboot.toml";
const LOCAL_PORTS: &str = "moteboot_ports.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Boot loader baud rate.
    pub baud: Option<u32>,
}

/// `[port]` table, also stored on its own in the ports file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// USB bridges accepted without asking.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
}

impl PortConfig {
    fn merge(&mut self, other: Self) {
        self.connection.serial = other.connection.serial.or(self.connection.serial.take());
        self.connection.baud = other.connection.baud.or(self.connection.baud);
        for device in other.usb_device {
            if !self.usb_device.contains(&device) {
                self.usb_device.push(device);
            }
        }
    }
}

/// `[device]` table: boot loader settings of the attached mote.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Chip family (`jennic` or `pacemate`).
    pub chip: Option<String>,
    /// Whether the line boot loader echoes commands.
    pub echo: Option<bool>,
    /// Reply timeout in milliseconds.
    pub reply_timeout_ms: Option<u64>,
    /// Reset pulse length in milliseconds.
    pub reset_pulse_ms: Option<u64>,
    /// Handshake attempts when entering program mode.
    pub connect_attempts: Option<u32>,
}

impl DeviceConfig {
    /// Configured reply timeout.
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }

    /// Configured DTR/RTS pulse length.
    pub fn reset_pulse(&self) -> Option<Duration> {
        self.reset_pulse_ms.map(Duration::from_millis)
    }

    fn merge(&mut self, other: Self) {
        self.chip = other.chip.or(self.chip.take());
        self.echo = other.echo.or(self.echo);
        self.reply_timeout_ms = other.reply_timeout_ms.or(self.reply_timeout_ms);
        self.reset_pulse_ms = other.reset_pulse_ms.or(self.reset_pulse_ms);
        self.connect_attempts = other.connect_attempts.or(self.connect_attempts);
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Port configuration.
    #[serde(default)]
    pub port: PortConfig,
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
}

impl Config {
    /// Global config, then `./moteboot.toml`, then the first ports file found.
    pub fn load() -> Self {
        let mut config = Self::default();

        let files = [Self::global_config_path(), Some(PathBuf::from(LOCAL_CONFIG))];
        for path in files.into_iter().flatten() {
            if let Some(layer) = read_toml::<Self>(&path) {
                debug!("Loaded config from {}", path.display());
                config.merge(layer);
            }
        }

        let ports_files = [Some(PathBuf::from(LOCAL_PORTS)), Self::global_ports_path()];
        if let Some(ports) = ports_files
            .into_iter()
            .flatten()
            .find_map(|path| read_toml::<PortConfig>(&path))
        {
            config.port.merge(ports);
        }

        config
    }

    /// Load only `path` (`--config`). A missing or broken file yields defaults.
    pub fn load_from_path(path: &Path) -> Self {
        read_toml(path).unwrap_or_else(|| {
            warn!("Could not load config from {}, using defaults", path.display());
            Self::default()
        })
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", BIN_NAME).map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    fn global_ports_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("ports.toml"))
    }

    /// Whether the USB bridge `vid:pid` was remembered.
    pub fn knows_usb_device(&self, vid: u16, pid: u16) -> bool {
        self.port.usb_device.iter().any(|d| d.matches(vid, pid))
    }

    fn merge(&mut self, other: Self) {
        self.port.merge(other.port);
        self.device.merge(other.device);
    }

    /// Remember a USB bridge so later runs select it without asking.
    ///
    /// Written next to a local config when there is one, else globally.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        if self.knows_usb_device(vid, pid) {
            return Ok(());
        }

        let local = Path::new(LOCAL_PORTS).exists() || Path::new(LOCAL_CONFIG).exists();
        let path = match Self::global_config_dir() {
            Some(dir) if !local => {
                fs::create_dir_all(&dir)?;
                dir.join("ports.toml")
            },
            _ => PathBuf::from(LOCAL_PORTS),
        };

        self.port.usb_device.push(UsbDevice { vid, pid });
        fs::write(&path, toml::to_string_pretty(&self.port)?)?;
        info!("Saved USB device {vid:04X}:{pid:04X} to {}", path.display());
        Ok(())
    }
}

/// Parse `path` as TOML; absent files are silent, broken ones warn.
fn read_toml<T: DeserializeOwned>(path: &Path) -> Option<T> {
    if !path.exists() {
        return None;
    }
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|content| toml::from_str(&content).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring config file {}: {e}", path.display());
            None
        },
    }
}
