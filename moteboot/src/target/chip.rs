//! Chip families, device identification and configuration.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::Dialect,
        target::{Flasher, jennic::JennicFlasher, pacemate::PacemateFlasher},
    },
    std::{fmt, str::FromStr, time::Duration},
};

/// Supported chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ChipFamily {
    /// Jennic JN51xx (binary boot loader).
    #[default]
    Jennic,
    /// Pacemate sensor board with an NXP LPC2136 (line ISP).
    Pacemate,
}

impl ChipFamily {
    /// Default baud rate of the boot loader.
    #[must_use]
    pub fn default_baud(&self) -> u32 {
        match self {
            Self::Jennic => 38_400,
            Self::Pacemate => 115_200,
        }
    }

    /// Baud rates the boot loader accepts.
    #[must_use]
    pub fn supported_bauds(&self) -> &'static [u32] {
        match self {
            Self::Jennic => &[19_200, 38_400, 57_600, 115_200],
            Self::Pacemate => &[9_600, 19_200, 38_400, 57_600, 115_200],
        }
    }

    /// Operations the family provides.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Jennic => &[
                Capability::EraseFlash,
                Capability::WriteFlash,
                Capability::ReadFlash,
                Capability::ReadMacAddress,
                Capability::GetChipType,
                Capability::Reset,
            ],
            Self::Pacemate => &[
                Capability::EraseFlash,
                Capability::WriteFlash,
                Capability::ReadFlash,
                Capability::WriteCrc,
                Capability::Reset,
            ],
        }
    }

    /// Whether the family provides `capability`.
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Get the chip family from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "jennic" | "jn51xx" | "jn5139" | "jn5148" => Some(Self::Jennic),
            "pacemate" | "lpc2136" | "lpc" => Some(Self::Pacemate),
            _ => None,
        }
    }

    /// Create a flasher on a native serial port.
    #[cfg(feature = "native")]
    pub fn create_flasher(&self, config: &ChipConfig, port_name: &str) -> Result<Box<dyn Flasher>> {
        let serial = crate::port::SerialConfig::new(port_name, config.baud);
        let port = crate::port::NativePort::open(&serial)?;
        Ok(self.create_flasher_with_port(config, port))
    }

    /// Create a flasher on an existing port.
    pub fn create_flasher_with_port<P: Port + 'static>(
        &self,
        config: &ChipConfig,
        port: P,
    ) -> Box<dyn Flasher> {
        let mut config = config.clone();
        config.family = *self;
        match self {
            Self::Jennic => Box::new(JennicFlasher::new(port, config)),
            Self::Pacemate => Box::new(PacemateFlasher::new(port, config)),
        }
    }
}

impl fmt::Display for ChipFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jennic => write!(f, "Jennic"),
            Self::Pacemate => write!(f, "Pacemate"),
        }
    }
}

impl FromStr for ChipFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::Config(format!("unknown chip family: {s}")))
    }
}

/// Operation a device family may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Erase flash sectors or the whole flash.
    EraseFlash,
    /// Program flash.
    WriteFlash,
    /// Read flash.
    ReadFlash,
    /// Read the factory MAC address.
    ReadMacAddress,
    /// Identify the chip.
    GetChipType,
    /// Write the image CRC block.
    WriteCrc,
    /// Reset into the application.
    Reset,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::EraseFlash => "erase flash",
            Self::WriteFlash => "write flash",
            Self::ReadFlash => "read flash",
            Self::ReadMacAddress => "read MAC address",
            Self::GetChipType => "get chip type",
            Self::WriteCrc => "write CRC",
            Self::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Identified microcontroller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ChipType {
    /// Jennic JN5121.
    Jn5121,
    /// Jennic JN513x.
    Jn513x,
    /// Jennic JN513x revision 1.
    Jn513xR1,
    /// Jennic JN5148.
    Jn5148,
    /// NXP LPC2136.
    Lpc2136,
    /// Unrecognized identifier.
    Unknown,
}

impl ChipType {
    /// Map the Jennic chip identification register.
    pub fn from_jennic_id(id: u32) -> Self {
        match id {
            0x1000_8686 => Self::Jn5121,
            0x1040_4686 => Self::Jn513x,
            0x1080_4686 => Self::Jn513xR1,
            0x1040_8686 => Self::Jn5148,
            _ => Self::Unknown,
        }
    }

    /// Flash offset of the factory MAC address.
    pub fn mac_in_flash_start(self) -> u32 {
        match self {
            Self::Jn5121 => 0x24,
            _ => 0x30,
        }
    }

    /// Whether the boot loader must be told which flash device is fitted.
    pub fn needs_flash_configuration(self) -> bool {
        !matches!(self, Self::Jn5121 | Self::Lpc2136)
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jn5121 => "JN5121",
            Self::Jn513x => "JN513X",
            Self::Jn513xR1 => "JN513XR1",
            Self::Jn5148 => "JN5148",
            Self::Lpc2136 => "LPC2136",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// External SPI flash fitted next to a Jennic chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashType {
    /// SST 25VF010A.
    Sst25vf010a,
    /// ST M25P10-A.
    Stm25p10a,
    /// Atmel 25F512.
    Atmel25f512,
    /// ST M25P40.
    Stm25p40,
    /// Unrecognized identifier.
    Unknown,
}

impl FlashType {
    /// Map the manufacturer and device identifier bytes.
    pub fn from_ids(manufacturer: u8, device: u8) -> Self {
        match (manufacturer, device) {
            (0xBF, 0x49) => Self::Sst25vf010a,
            (0x10, 0x10) => Self::Stm25p10a,
            (0x1F, 0x60) => Self::Atmel25f512,
            (0x12, 0x12) => Self::Stm25p40,
            _ => Self::Unknown,
        }
    }

    /// Code sent in the flash configure request.
    pub fn configure_code(self) -> u8 {
        match self {
            Self::Sst25vf010a | Self::Unknown => 0,
            Self::Atmel25f512 => 1,
            Self::Stm25p10a => 2,
            Self::Stm25p40 => 3,
        }
    }
}

impl fmt::Display for FlashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sst25vf010a => "SST25VF010A",
            Self::Stm25p10a => "STM25P10A",
            Self::Atmel25f512 => "Atmel25F512",
            Self::Stm25p40 => "STM25P40",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// 64-bit IEEE EUI-64 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 8]);

impl MacAddress {
    /// Create an address from its bytes.
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Create an address from the first eight bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 8] = bytes
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                Error::InvalidArgument(format!("MAC address needs 8 bytes, got {}", bytes.len()))
            })?;
        Ok(Self(array))
    }

    /// Address bytes.
    pub fn bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Lower 16 bits, the usual short node id.
    pub fn short_id(&self) -> u16 {
        u16::from_be_bytes([self.0[6], self.0[7]])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Connection parameters of one device.
#[derive(Debug, Clone)]
pub struct ChipConfig {
    /// Chip family.
    pub family: ChipFamily,
    /// Boot loader baud rate.
    pub baud: u32,
    /// Whether the device echoes request lines (line dialect).
    pub echo: bool,
    /// Wait for a reply.
    pub reply_timeout: Duration,
    /// Extra wait when a line reply stalls.
    pub idle_timeout: Duration,
    /// Stalls tolerated by the line reader.
    pub retry_budget: u32,
    /// Duration of the reset pulse.
    pub reset_pulse: Duration,
    /// Handshake attempts when entering program mode.
    pub connect_attempts: u32,
}

impl ChipConfig {
    /// Create a new chip configuration for the given family.
    pub fn new(family: ChipFamily) -> Self {
        let dialect = family_dialect(family, true);
        Self {
            family,
            baud: family.default_baud(),
            echo: true,
            reply_timeout: dialect.reply_timeout,
            idle_timeout: dialect.idle_timeout,
            retry_budget: dialect.retry_budget,
            reset_pulse: dialect.reset_pulse,
            connect_attempts: 10,
        }
    }

    /// Set the baud rate.
    #[must_use]
    pub fn with_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Set the echo flag.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the reply timeout.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the reset pulse duration.
    #[must_use]
    pub fn with_reset_pulse(mut self, pulse: Duration) -> Self {
        self.reset_pulse = pulse;
        self
    }

    /// Set the number of handshake attempts.
    #[must_use]
    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts;
        self
    }

    /// Session dialect for this configuration.
    pub fn dialect(&self) -> Dialect {
        family_dialect(self.family, self.echo)
            .with_reply_timeout(self.reply_timeout)
            .with_idle_timeout(self.idle_timeout)
            .with_retry_budget(self.retry_budget)
            .with_reset_pulse(self.reset_pulse)
    }
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self::new(ChipFamily::default())
    }
}

fn family_dialect(family: ChipFamily, echo: bool) -> Dialect {
    match family {
        ChipFamily::Jennic => Dialect::binary(),
        ChipFamily::Pacemate => Dialect::line(echo),
    }
}
