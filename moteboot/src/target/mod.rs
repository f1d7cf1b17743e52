//! Device families and the [`Flasher`] facade.
//!
//! Each family module provides a session wrapper with its command set, the
//! composed operations built on it, and a flasher that owns the port and
//! runs those operations inside a program mode bracket.

pub mod chip;
pub mod jennic;
pub mod pacemate;

pub use chip::{Capability, ChipConfig, ChipFamily, ChipType, FlashType, MacAddress};

use crate::{
    error::{Error, Result},
    operation::Monitor,
};

/// Flash operations common to all families.
///
/// Operations a family lacks return [`Error::Unsupported`]; use
/// [`ChipFamily::capabilities`] to check up front.
pub trait Flasher {
    /// Chip family of this flasher.
    fn family(&self) -> ChipFamily;

    /// Reset into the boot loader, handshake and reset back.
    fn connect(&mut self) -> Result<()>;

    /// Erase one sector, or the whole flash when `sector` is `None`.
    fn erase_flash(&mut self, _sector: Option<u8>, _monitor: &mut Monitor<'_>) -> Result<()> {
        Err(Error::Unsupported(Capability::EraseFlash))
    }

    /// Program `data` at `address`.
    fn write_flash(&mut self, _address: u32, _data: &[u8], _monitor: &mut Monitor<'_>) -> Result<()> {
        Err(Error::Unsupported(Capability::WriteFlash))
    }

    /// Erase the flash and program a complete image at `address`.
    fn program(&mut self, _address: u32, _image: &[u8], _monitor: &mut Monitor<'_>) -> Result<()> {
        Err(Error::Unsupported(Capability::WriteFlash))
    }

    /// Read `len` bytes at `address`.
    fn read_flash(&mut self, _address: u32, _len: usize, _monitor: &mut Monitor<'_>) -> Result<Vec<u8>> {
        Err(Error::Unsupported(Capability::ReadFlash))
    }

    /// Read the factory MAC address.
    fn read_mac_address(&mut self, _monitor: &mut Monitor<'_>) -> Result<MacAddress> {
        Err(Error::Unsupported(Capability::ReadMacAddress))
    }

    /// Identify the chip.
    fn chip_type(&mut self, _monitor: &mut Monitor<'_>) -> Result<ChipType> {
        Err(Error::Unsupported(Capability::GetChipType))
    }

    /// Write the image CRC block. `Ok(false)` means a phase failed.
    fn write_crc(&mut self, _crc: u16, _monitor: &mut Monitor<'_>) -> Result<bool> {
        Err(Error::Unsupported(Capability::WriteCrc))
    }

    /// Reset the device into its application.
    fn reset(&mut self) -> Result<()> {
        Err(Error::Unsupported(Capability::Reset))
    }

    /// Close the port. The flasher cannot be used afterwards.
    fn close(&mut self);
}
