//! # moteboot
//!
//! A boot loader protocol engine for wireless sensor motes.
//!
//! This crate talks to the serial boot loaders of two mote families:
//!
//! - **Jennic JN51xx**: binary frames with a length prefix and an 8-bit
//!   checksum
//! - **Pacemate (NXP LPC2136)**: the line oriented ISP with uuencoded data
//!   lines and optional command echo
//!
//! Both dialects run over the same [`protocol::Session`], which borrows a
//! [`Port`] for one request/reply round trip at a time. Composed flows such as
//! erase, program or MAC readout are [`Operation`]s that report progress and
//! honour cancellation through a [`Monitor`].
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: serialization of chip and port descriptions
//! - `testing`: `ScriptedPort`, an in-memory port that answers
//!   writes with scripted replies
//!
//! ## Example
//!
//! ```rust,no_run
//! use moteboot::{CancelToken, ChipConfig, ChipFamily, Monitor};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let config = ChipConfig::new(ChipFamily::Jennic);
//!         let mut flasher = ChipFamily::Jennic.create_flasher(&config, "/dev/ttyUSB0")?;
//!         flasher.connect()?;
//!
//!         let mut monitor = Monitor::new(CancelToken::new())
//!             .with_progress(|p| println!("{:.0}%", p * 100.0));
//!         let image = std::fs::read("firmware.bin")?;
//!         flasher.program(0, &image, &mut monitor)?;
//!
//!         let mut monitor = Monitor::new(CancelToken::new());
//!         println!("MAC: {}", flasher.read_mac_address(&mut monitor)?);
//!         flasher.reset()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod operation;
pub mod port;
pub mod protocol;
pub mod target;

#[cfg(any(test, feature = "testing"))]
pub use port::ScriptedPort;
#[cfg(feature = "native")]
pub use {
    device::auto_detect_port,
    port::{NativePort, NativePortEnumerator},
};
pub use {
    device::{DetectedPort, DeviceKind, detect_ports, format_port_list, select_port},
    error::{Error, Result},
    operation::{CancelToken, Monitor, Operation, OperationState, ProgramMode},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Dialect, ExchangeState, Session},
    target::{Capability, ChipConfig, ChipFamily, ChipType, FlashType, Flasher, MacAddress},
};

/// Route `log` output of a test through the test harness.
#[cfg(test)]
pub(crate) fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
