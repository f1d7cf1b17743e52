//! Composed LPC2136 operations.

use {
    crate::{
        error::{Error, Result},
        operation::{CancelToken, Monitor, Operation, fraction},
        port::Port,
        protocol::uuencode,
        target::pacemate::session::{
            BLOCK_SIZE, CRC_BLOCK_ADDRESS, LAST_SECTOR, MAX_READ, PacemateSession, RAM_ADDRESS,
            sector_of,
        },
    },
    log::{debug, info, trace},
};

#[allow(clippy::cast_possible_truncation)]
const BLOCK_LEN: u32 = BLOCK_SIZE as u32;

/// Erase one sector or the whole flash.
#[derive(Debug, Clone, Copy, Default)]
pub struct EraseFlash {
    sector: Option<u8>,
}

impl EraseFlash {
    /// Erase sectors 0 to 14.
    pub fn all() -> Self {
        Self { sector: None }
    }

    /// Erase a single sector.
    pub fn sector(sector: u8) -> Self {
        Self {
            sector: Some(sector),
        }
    }
}

impl<P: Port + ?Sized> Operation<PacemateSession<'_, P>> for EraseFlash {
    type Output = ();

    fn execute(&mut self, session: &mut PacemateSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<()> {
        let (start, end) = match self.sector {
            Some(sector) if sector > LAST_SECTOR => {
                return Err(Error::InvalidArgument(format!(
                    "sector {sector} beyond last sector {LAST_SECTOR}"
                )));
            }
            Some(sector) => (sector, sector),
            None => (0, LAST_SECTOR),
        };

        session.configure_flash(start, end)?;
        monitor.progress(0.5);
        monitor.checkpoint()?;
        session.erase_flash(start, end)?;
        monitor.progress(1.0);
        Ok(())
    }
}

/// Send one RAM block as data lines and return their checksum.
///
/// Each line carries up to 45 bytes. The last line is zero padded to a
/// multiple of three but announces only its real length.
fn send_data_lines<P: Port + ?Sized>(session: &mut PacemateSession<'_, P>, block: &[u8]) -> Result<u32> {
    let mut checksum = 0u32;
    for chunk in block.chunks(uuencode::LINE_SIZE) {
        let mut line = chunk.to_vec();
        line.resize(chunk.len().div_ceil(3) * 3, 0);
        checksum = checksum.wrapping_add(uuencode::checksum(&line));
        trace!("Sending data line of {} bytes", chunk.len());
        let encoded = uuencode::encode_line(&line, chunk.len())?;
        session.send_data_line(&encoded)?;
    }
    Ok(checksum)
}

/// Program flash through the RAM buffer, one 256-byte block at a time.
///
/// The address must be block aligned. The last block is padded with `0xFF`.
#[derive(Debug, Clone)]
pub struct WriteFlash<'d> {
    address: u32,
    data: &'d [u8],
}

impl<'d> WriteFlash<'d> {
    /// Program `data` at `address`.
    pub fn new(address: u32, data: &'d [u8]) -> Self {
        Self { address, data }
    }
}

impl<P: Port + ?Sized> Operation<PacemateSession<'_, P>> for WriteFlash<'_> {
    type Output = ();

    fn execute(&mut self, session: &mut PacemateSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<()> {
        if self.address % BLOCK_LEN != 0 {
            return Err(Error::InvalidArgument(format!(
                "address {:#x} is not {BLOCK_SIZE}-byte aligned",
                self.address
            )));
        }

        let blocks = self.data.len().div_ceil(BLOCK_SIZE);
        let mut address = self.address;
        for (i, chunk) in self.data.chunks(BLOCK_SIZE).enumerate() {
            monitor.checkpoint()?;
            let sector = sector_of(address)?;
            let mut block = chunk.to_vec();
            block.resize(BLOCK_SIZE, 0xFF);

            debug!("Writing block {} of {blocks} at {address:#x}", i + 1);
            session.write_to_ram(RAM_ADDRESS, BLOCK_LEN)?;
            let checksum = send_data_lines(session, &block)?;
            session.send_checksum(checksum)?;
            session.configure_flash(sector, sector)?;
            session.copy_ram_to_flash(address, RAM_ADDRESS, BLOCK_LEN)?;

            address += BLOCK_LEN;
            monitor.progress(fraction(i + 1, blocks));
        }
        Ok(())
    }
}

/// Read a flash range in chunks of [`MAX_READ`] bytes.
#[derive(Debug, Clone, Copy)]
pub struct ReadFlash {
    address: u32,
    len: usize,
}

impl ReadFlash {
    /// Read `len` bytes at `address`.
    pub fn new(address: u32, len: usize) -> Self {
        Self { address, len }
    }
}

impl<P: Port + ?Sized> Operation<PacemateSession<'_, P>> for ReadFlash {
    type Output = Vec<u8>;

    fn execute(&mut self, session: &mut PacemateSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<Vec<u8>> {
        if self.address % 4 != 0 {
            return Err(Error::InvalidArgument(format!(
                "read address {:#x} is not word aligned",
                self.address
            )));
        }

        let mut data = Vec::with_capacity(self.len.next_multiple_of(4));
        let mut address = self.address;

        while data.len() < self.len {
            monitor.checkpoint()?;
            let chunk = (self.len - data.len()).next_multiple_of(4).min(MAX_READ);
            data.extend(session.read_memory(address, chunk)?);
            #[allow(clippy::cast_possible_truncation)] // bounded by MAX_READ
            let step = chunk as u32;
            address = address.wrapping_add(step);
            monitor.progress(fraction(data.len().min(self.len), self.len));
        }
        data.truncate(self.len);
        Ok(data)
    }
}

/// Erase the flash and program a complete image.
#[derive(Debug, Clone)]
pub struct ProgramImage<'d> {
    address: u32,
    image: &'d [u8],
}

impl<'d> ProgramImage<'d> {
    /// Program `image` at `address`.
    pub fn new(address: u32, image: &'d [u8]) -> Self {
        Self { address, image }
    }
}

impl<P: Port + ?Sized> Operation<PacemateSession<'_, P>> for ProgramImage<'_> {
    type Output = ();

    fn execute(&mut self, session: &mut PacemateSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<()> {
        monitor.scoped(0.0, 0.1, |m| EraseFlash::all().execute(session, m))?;
        monitor.checkpoint()?;
        monitor.scoped(0.1, 1.0, |m| {
            WriteFlash::new(self.address, self.image).execute(session, m)
        })?;
        info!("Programmed {} bytes", self.image.len());
        Ok(())
    }
}

/// Write the image CRC into the last 256 bytes of flash.
///
/// The block is `0xFF` except for the CRC, big endian, in its last two
/// bytes. Every failure is logged and reported as `false`.
pub fn write_crc_to_flash<P: Port + ?Sized>(session: &mut PacemateSession<'_, P>, crc: u16) -> bool {
    let mut monitor = Monitor::new(CancelToken::new());
    matches!(WriteCrc::new(crc).execute(session, &mut monitor), Ok(true))
}

fn crc_block(crc: u16) -> [u8; BLOCK_SIZE] {
    let mut block = [0xFFu8; BLOCK_SIZE];
    block[BLOCK_SIZE - 2..].copy_from_slice(&crc.to_be_bytes());
    block
}

fn write_crc_block<P: Port + ?Sized>(
    session: &mut PacemateSession<'_, P>,
    block: &[u8],
    monitor: &mut Monitor<'_>,
) -> std::result::Result<(), (&'static str, Error)> {
    let during = |phase: &'static str| move |e: Error| (phase, e);

    session
        .configure_flash(LAST_SECTOR, LAST_SECTOR)
        .map_err(during("configure flash"))?;
    monitor.checkpoint().map_err(during("erase flash"))?;
    session
        .erase_flash(LAST_SECTOR, LAST_SECTOR)
        .map_err(during("erase flash"))?;
    monitor.progress(0.25);

    monitor.checkpoint().map_err(during("write to RAM"))?;
    session
        .write_to_ram(RAM_ADDRESS, BLOCK_LEN)
        .map_err(during("write to RAM"))?;
    monitor.checkpoint().map_err(during("send CRC block"))?;
    let checksum = send_data_lines(session, block).map_err(during("send CRC block"))?;
    monitor.checkpoint().map_err(during("send CRC block"))?;
    session.send_checksum(checksum).map_err(during("send CRC block"))?;
    monitor.progress(0.75);

    monitor.checkpoint().map_err(during("copy RAM to flash"))?;
    session
        .configure_flash(LAST_SECTOR, LAST_SECTOR)
        .map_err(during("copy RAM to flash"))?;
    monitor.checkpoint().map_err(during("copy RAM to flash"))?;
    session
        .copy_ram_to_flash(CRC_BLOCK_ADDRESS, RAM_ADDRESS, BLOCK_LEN)
        .map_err(during("copy RAM to flash"))
}

/// Write the image CRC block as an operation.
///
/// Device failures end in `Ok(false)` like [`write_crc_to_flash`]. A cancel
/// request stops before the next command and ends in [`Error::Canceled`].
#[derive(Debug, Clone, Copy)]
pub struct WriteCrc {
    crc: u16,
}

impl WriteCrc {
    /// Write `crc`.
    pub fn new(crc: u16) -> Self {
        Self { crc }
    }
}

impl<P: Port + ?Sized> Operation<PacemateSession<'_, P>> for WriteCrc {
    type Output = bool;

    fn execute(&mut self, session: &mut PacemateSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<bool> {
        trace!("CRC = {:#06x}", self.crc);
        match write_crc_block(session, &crc_block(self.crc), monitor) {
            Ok(()) => Ok(true),
            Err((_, Error::Canceled)) => Err(Error::Canceled),
            Err((phase, e)) => {
                debug!("Error during {phase}: {e}");
                Ok(false)
            }
        }
    }
}
