//! Jennic boot loader command set.

use {
    crate::{
        error::{Error, Result},
        operation::ProgramControl,
        port::Port,
        protocol::{Dialect, Message, Reply, Session},
        target::{ChipType, FlashType},
    },
    byteorder::{BigEndian, ByteOrder},
    log::{debug, error, trace},
    std::ops::{Deref, DerefMut},
};

/// RAM address of the chip identification register.
pub const CHIP_ID_ADDRESS: u32 = 0x1000_00FC;

/// Largest data block of one read or program request.
pub const MAX_BLOCK: usize = 128;

/// Session speaking the Jennic binary dialect.
pub struct JennicSession<'a, P: Port + ?Sized> {
    inner: Session<'a, P>,
}

impl<'a, P: Port + ?Sized> JennicSession<'a, P> {
    /// Create a session with the default binary dialect.
    pub fn new(port: &'a mut P) -> Self {
        Self::with_dialect(port, Dialect::binary())
    }

    /// Create a session with a custom dialect.
    pub fn with_dialect(port: &'a mut P, dialect: Dialect) -> Self {
        Self {
            inner: Session::new(port, dialect),
        }
    }

    /// One connection attempt; see [`Session::handshake`].
    pub fn wait_for_connection(&mut self) -> bool {
        self.inner.handshake()
    }

    /// Read the external flash identifier.
    pub fn flash_type(&mut self) -> Result<FlashType> {
        let reply = self.inner.transact(&Message::flash_type_read())?;
        if reply.status() != 0 {
            error!(
                "Failed to read flash type: status should be 0x00, yet it is {:#04x}",
                reply.status()
            );
            return Err(Error::FlashTypeReadFailed {
                status: reply.status(),
            });
        }

        let flash = match reply.data() {
            [manufacturer, device, ..] => FlashType::from_ids(*manufacturer, *device),
            _ => FlashType::Unknown,
        };
        debug!("Flash is {flash}");
        Ok(flash)
    }

    /// Clear the flash status register so the device accepts erase requests.
    pub fn enable_flash_erase(&mut self) -> Result<()> {
        let reply = self.inner.transact(&Message::status_register_write(0))?;
        check_erase_status(&reply, "write status register")
    }

    /// Erase one sector.
    pub fn erase_sector(&mut self, sector: u8) -> Result<()> {
        debug!("Erasing sector {sector}");
        let reply = self.inner.transact(&Message::sector_erase(sector))?;
        check_erase_status(&reply, "erase flash sector")
    }

    /// Erase the whole flash.
    pub fn erase_all(&mut self) -> Result<()> {
        debug!("Erasing flash");
        let reply = self.inner.transact(&Message::flash_erase())?;
        check_erase_status(&reply, "erase flash")
    }

    /// Tell the boot loader which flash device is fitted.
    ///
    /// Skipped for chips that detect the flash themselves. An unrecognized
    /// flash is configured with the default code.
    pub fn configure_flash(&mut self, chip: ChipType) -> Result<Option<FlashType>> {
        if !chip.needs_flash_configuration() {
            trace!("{chip} needs no flash configuration");
            return Ok(None);
        }

        let flash = self.flash_type()?;
        let reply = self
            .inner
            .transact(&Message::flash_configure(flash.configure_code()))?;
        if reply.status() != 0 {
            error!(
                "Failed to configure flash ROM: status should be 0x00, yet it is {:#04x}",
                reply.status()
            );
            return Err(Error::FlashConfigurationFailed {
                status: reply.status(),
            });
        }
        Ok(Some(flash))
    }

    /// Read up to [`MAX_BLOCK`] bytes of flash.
    pub fn read_flash(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        let len = block_len(len)?;
        let reply = self.inner.transact(&Message::flash_read(address, len))?;
        Ok(reply.into_data())
    }

    /// Program up to [`MAX_BLOCK`] bytes of flash.
    pub fn write_flash(&mut self, address: u32, data: &[u8]) -> Result<()> {
        block_len(data.len())?;
        let reply = self.inner.transact(&Message::flash_program(address, data))?;
        if reply.status() != 0 {
            error!(
                "Failed to write to flash: status should be 0x00, yet it is {:#04x}",
                reply.status()
            );
            return Err(Error::FlashProgramFailed {
                address,
                status: reply.status(),
            });
        }
        Ok(())
    }

    /// Read up to [`MAX_BLOCK`] bytes of RAM.
    pub fn read_ram(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        let len = block_len(len)?;
        let reply = self.inner.transact(&Message::ram_read(address, len))?;
        Ok(reply.into_data())
    }

    /// Identify the chip from its identification register.
    pub fn chip_type(&mut self) -> Result<ChipType> {
        let id = self.read_ram(CHIP_ID_ADDRESS, 4)?;
        if id.len() < 4 {
            return Err(Error::MalformedFrame(format!(
                "chip id reply carries {} bytes",
                id.len()
            )));
        }
        let id = BigEndian::read_u32(&id);
        let chip = ChipType::from_jennic_id(id);
        debug!("Chip id {id:#010x}: {chip}");
        Ok(chip)
    }
}

fn check_erase_status(reply: &Reply, what: &str) -> Result<()> {
    if reply.status() != 0 {
        error!("Failed to {what}: status {:#04x}", reply.status());
        return Err(Error::FlashEraseFailed {
            status: reply.status(),
        });
    }
    Ok(())
}

#[allow(clippy::cast_possible_truncation)] // bounded by MAX_BLOCK
fn block_len(len: usize) -> Result<u16> {
    if len == 0 || len > MAX_BLOCK {
        return Err(Error::InvalidArgument(format!(
            "block length {len} outside 1..={MAX_BLOCK}"
        )));
    }
    Ok(len as u16)
}

impl<'a, P: Port + ?Sized> Deref for JennicSession<'a, P> {
    type Target = Session<'a, P>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<P: Port + ?Sized> DerefMut for JennicSession<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<P: Port + ?Sized> ProgramControl for JennicSession<'_, P> {
    fn enter_program_mode(&mut self, attempts: u32) -> Result<()> {
        self.inner.enter_program_mode(attempts)
    }

    fn leave_program_mode(&mut self) -> Result<()> {
        self.inner.leave_program_mode()
    }
}
