//! Port abstraction for the byte transport under the boot loader protocol.
//!
//! The protocol engine never configures the serial line itself. It only needs
//! a duplex byte stream with a bounded "wait until data is available" primitive
//! and the two modem control lines used to reset a mote into its boot ROM.
//!
//! ```text
//! +---------------------------+
//! |  Composed operations      |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |  Session (codec + reader) |
//! +-------------+-------------+
//!               |
//! +-------------v-------------+
//! |  Port trait               |
//! +------+-------------+------+
//!        |             |
//! +------v-----+ +-----v--------+
//! | NativePort | | ScriptedPort |
//! | serialport | | (tests)      |
//! +------------+ +--------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use moteboot::port::Port;
//! use std::time::Duration;
//!
//! fn example<P: Port>(port: &mut P) -> moteboot::Result<()> {
//!     port.write_all_bytes(b"?\r\n")?;
//!     port.wait_data_available(Duration::from_millis(2000))?;
//!     while let Some(byte) = port.read_byte()? {
//!         println!("{byte:02X}");
//!         if port.bytes_available()? == 0 {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(any(test, feature = "testing"))]
pub mod script;

use {
    crate::error::Result,
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Line settings used to open a boot loader port (always 8N1, no flow control).
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port_name: String,
    /// Boot loader baud rate.
    pub baud_rate: u32,
    /// Upper bound of one blocking `read`. Reply deadlines are enforced by
    /// [`Port::wait_data_available`], so this stays short.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Settings for `port_name` at `baud_rate`.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout: Duration::from_millis(50),
        }
    }

    /// Override the blocking read bound.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// An enumerated serial device and, for USB bridges, its descriptors.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Device path.
    pub name: String,
    /// USB vendor id of the bridge.
    pub vid: Option<u16>,
    /// USB product id of the bridge.
    pub pid: Option<u16>,
    /// USB manufacturer string.
    pub manufacturer: Option<String>,
    /// USB product string, e.g. `FT232R USB UART`.
    pub product: Option<String>,
    /// USB serial number; tells several kits apart.
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// A port known only by its device path.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }
}

/// Byte transport consumed by the protocol engine.
///
/// `Write` covers `write`/`flush`. Reads go through [`Port::read_byte`] so
/// the reply readers can tell "no byte yet" from "end of stream".
pub trait Port: Read + Write + Send {
    /// Number of bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Block until at least one byte is available.
    ///
    /// Fails with [`crate::Error::Timeout`] when nothing arrives within `timeout`.
    fn wait_data_available(&mut self, timeout: Duration) -> Result<()>;

    /// Switch the line to `baud_rate`.
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()>;

    /// Current line speed.
    fn baud_rate(&self) -> u32;

    /// Drop pending input and output. Used to resynchronise after a failed
    /// handshake.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Device path, for diagnostics.
    fn name(&self) -> &str;

    /// Drive DTR. Held during reset to select the boot ROM.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Drive RTS. Pulsed to reset the mote.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Release the device. Later I/O fails.
    fn close(&mut self) -> Result<()>;

    /// Read one byte; `None` marks the end of the stream.
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write one encoded request and flush it onto the wire.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Enumeration of the serial ports present on the host.
pub trait PortEnumerator {
    /// All serial ports, USB bridges with their descriptors.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
#[cfg(any(test, feature = "testing"))]
pub use script::ScriptedPort;
