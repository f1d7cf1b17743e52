//! LPC2136 ISP command set.

use {
    crate::{
        error::{Error, Result},
        operation::ProgramControl,
        port::Port,
        protocol::{
            Dialect, Message, Session,
            line::{self, ReplyShape},
            uuencode,
        },
    },
    log::{debug, trace, warn},
    std::ops::{Deref, DerefMut},
};

/// RAM buffer used for flash programming.
pub const RAM_ADDRESS: u32 = 0x4000_0200;

/// Highest sector of the LPC2136.
pub const LAST_SECTOR: u8 = 14;

/// Flash address of the image CRC block, inside [`LAST_SECTOR`].
pub const CRC_BLOCK_ADDRESS: u32 = 0x3_FF00;

/// Bytes copied from RAM to flash in one step.
pub const BLOCK_SIZE: usize = 256;

/// Largest read request, a multiple of four that fits one data line.
pub const MAX_READ: usize = 44;

const SMALL_SECTOR_SIZE: u32 = 0x1000;
const SMALL_SECTORS: u32 = 8;
const LARGE_SECTOR_SIZE: u32 = 0x8000;
const FLASH_SIZE: u32 = SMALL_SECTOR_SIZE * SMALL_SECTORS + LARGE_SECTOR_SIZE * 7;

/// Sector holding `address`.
///
/// Sectors 0 to 7 are 4 KiB, sectors 8 to 14 are 32 KiB.
pub fn sector_of(address: u32) -> Result<u8> {
    let sector = match address {
        a if a >= FLASH_SIZE => {
            return Err(Error::InvalidArgument(format!(
                "address {address:#x} beyond flash end {FLASH_SIZE:#x}"
            )));
        }
        a if a < SMALL_SECTOR_SIZE * SMALL_SECTORS => a / SMALL_SECTOR_SIZE,
        a => SMALL_SECTORS + (a - SMALL_SECTOR_SIZE * SMALL_SECTORS) / LARGE_SECTOR_SIZE,
    };
    u8::try_from(sector).map_err(|_| Error::InvalidArgument(format!("sector {sector}")))
}

/// Session speaking the LPC2136 ISP line dialect.
pub struct PacemateSession<'a, P: Port + ?Sized> {
    inner: Session<'a, P>,
}

impl<'a, P: Port + ?Sized> PacemateSession<'a, P> {
    /// Create a session with echo enabled.
    pub fn new(port: &'a mut P) -> Self {
        Self::with_dialect(port, Dialect::line(true))
    }

    /// Create a session with a custom dialect.
    pub fn with_dialect(port: &'a mut P, dialect: Dialect) -> Self {
        Self {
            inner: Session::new(port, dialect),
        }
    }

    fn echo(&self) -> bool {
        self.inner.dialect().echo
    }

    fn command(&mut self, message: &Message) -> Result<String> {
        self.inner.send_command(message)?;
        self.inner.await_success()
    }

    /// One autobaud attempt; see [`Session::handshake`].
    pub fn autobaud(&mut self) -> bool {
        self.inner.handshake()
    }

    /// Check that the boot loader answers commands.
    ///
    /// Pending input is dropped when it does not.
    pub fn wait_for_boot_loader(&mut self) -> Result<()> {
        match self.read_part_id() {
            Ok(_) => {
                debug!("Device connection established");
                Ok(())
            }
            Err(e) => {
                warn!("Error while waiting for connection: {e}");
                if let Err(clear) = self.inner.clear() {
                    warn!("Failed to clear port buffers: {clear}");
                }
                Err(e)
            }
        }
    }

    /// Read the part identification number.
    pub fn read_part_id(&mut self) -> Result<String> {
        let id = self.command(&Message::read_part_id())?;
        trace!("Part id {id}");
        Ok(id)
    }

    /// Unlock write and erase commands.
    pub fn enable_flash_erase(&mut self) -> Result<()> {
        debug!("Enabling flash erase");
        self.command(&Message::unlock()).map(drop)
    }

    /// Unlock and prepare sectors `start..=end`.
    ///
    /// Returns the data line of the prepare reply, usually empty.
    pub fn configure_flash(&mut self, start: u8, end: u8) -> Result<String> {
        debug!("Configuring flash from {start} to {end}");
        self.enable_flash_erase()?;
        self.command(&Message::prepare_sectors(start, end))
    }

    /// Erase sectors `start..=end`. They must be prepared.
    pub fn erase_flash(&mut self, start: u8, end: u8) -> Result<()> {
        debug!("Erasing sectors {start} to {end}");
        self.command(&Message::erase_sectors(start, end))?;
        // Some boot loader revisions send a second status line.
        match self.inner.await_success() {
            Ok(_) => Ok(()),
            Err(e) if e.is_timeout() => {
                trace!("One line erase response");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Announce `len` bytes of data lines for RAM at `address`.
    pub fn write_to_ram(&mut self, address: u32, len: u32) -> Result<()> {
        self.command(&Message::write_to_ram(address, len)).map(drop)
    }

    /// Send one uuencoded data line and consume its echo.
    pub fn send_data_line(&mut self, encoded: &[u8]) -> Result<()> {
        self.inner.send_command(&Message::data_line(encoded))?;
        self.inner.await_lines(ReplyShape::DataEcho).map(drop)
    }

    /// Send the checksum of the data lines since the last checksum.
    ///
    /// Fails with [`Error::InvalidChecksum`] unless the device accepts it.
    pub fn send_checksum(&mut self, checksum: u32) -> Result<()> {
        self.inner.send_command(&Message::write_crc(checksum))?;
        let reply = self.inner.await_lines(ReplyShape::CrcAck)?;
        line::parse_crc_ack(&reply, self.echo())
    }

    /// Copy `len` bytes from RAM at `ram` into prepared flash at `flash`.
    pub fn copy_ram_to_flash(&mut self, flash: u32, ram: u32, len: u32) -> Result<()> {
        debug!("Copying {len} bytes from RAM {ram:#x} to flash {flash:#x}");
        self.command(&Message::copy_ram_to_flash(flash, ram, len)).map(drop)
    }

    /// Read up to [`uuencode::LINE_SIZE`] bytes of memory.
    ///
    /// The line checksum is verified and acknowledged.
    pub fn read_memory(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        if len == 0 || len > uuencode::LINE_SIZE || len % 4 != 0 {
            return Err(Error::InvalidArgument(format!(
                "read length {len} must be a multiple of 4 up to {}",
                uuencode::LINE_SIZE
            )));
        }

        #[allow(clippy::cast_possible_truncation)] // len <= LINE_SIZE
        let message = Message::read_memory(address, len as u32);
        self.inner.send_command(&message)?;
        let reply = self.inner.await_lines(ReplyShape::ReadData)?;
        let data_reply = line::parse_read_data(&reply, self.echo())?;

        let data = uuencode::decode_line(data_reply.line.as_bytes())?;
        let actual = uuencode::checksum(&data);
        if actual != data_reply.checksum || data.len() != len {
            return Err(Error::InvalidChecksum {
                detail: format!(
                    "read of {len} bytes at {address:#x}: checksum {actual}, device sent {}",
                    data_reply.checksum
                ),
                raw: reply,
            });
        }

        self.inner.send_command(&Message::data_ok())?;
        self.inner.await_lines(ReplyShape::DataEcho)?;
        Ok(data)
    }
}

impl<'a, P: Port + ?Sized> Deref for PacemateSession<'a, P> {
    type Target = Session<'a, P>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<P: Port + ?Sized> DerefMut for PacemateSession<'_, P> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl<P: Port + ?Sized> ProgramControl for PacemateSession<'_, P> {
    fn enter_program_mode(&mut self, attempts: u32) -> Result<()> {
        self.inner.enter_program_mode(attempts)
    }

    fn leave_program_mode(&mut self) -> Result<()> {
        self.inner.leave_program_mode()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::port::ScriptedPort};

    #[test]
    fn test_sector_of() {
        assert_eq!(sector_of(0).unwrap(), 0);
        assert_eq!(sector_of(0x7FFF).unwrap(), 7);
        assert_eq!(sector_of(0x8000).unwrap(), 8);
        assert_eq!(sector_of(CRC_BLOCK_ADDRESS).unwrap(), LAST_SECTOR);
        assert!(sector_of(0x4_0000).is_err());
    }

    #[test]
    fn test_configure_flash_with_echo() {
        let mut port = ScriptedPort::new()
            .reply(b"U 23130\r\n0\r\n")
            .reply(b"P 0 14\r\n0\r\n");
        let mut session = PacemateSession::new(&mut port);

        assert_eq!(session.configure_flash(0, 14).unwrap(), "");
        assert_eq!(port.written_text(), vec!["U 23130\r\n", "P 0 14\r\n"]);
        assert_eq!(port.wait_count(), 2);
    }

    #[test]
    fn test_configure_flash_rejected() {
        let mut port = ScriptedPort::new()
            .reply(b"U 23130\r\n0\r\n")
            .reply(b"P 0 15\r\n7\r\n");
        let mut session = PacemateSession::new(&mut port);

        // An error status carries no data line, so the reply never completes.
        let err = session.configure_flash(0, 15).unwrap_err();
        assert!(matches!(err, Error::Timeout { ref partial, .. } if partial == b"P 0 15\r\n7\r\n"));
    }

    #[test]
    fn test_unlock_rejected_without_echo() {
        let mut port = ScriptedPort::new().reply(b"1\r\nbusy\r\n");
        let mut session = PacemateSession::with_dialect(&mut port, Dialect::line(false));
        assert!(matches!(
            session.enable_flash_erase(),
            Err(Error::UnexpectedReply { .. })
        ));
    }

    #[test]
    fn test_short_error_status_without_echo() {
        let mut port = ScriptedPort::new().reply(b"\r\n1\r\n");
        let mut session = PacemateSession::with_dialect(&mut port, Dialect::line(false));
        assert!(matches!(
            session.enable_flash_erase(),
            Err(Error::UnexpectedReply { ref reply, .. }) if reply == "\r\n1\r\n"
        ));
        // Both lines arrived at once, no idle waits.
        assert_eq!(port.wait_count(), 1);
    }

    #[test]
    fn test_read_part_id_without_echo() {
        let mut port = ScriptedPort::new().reply(b"0\r\n196387\r\n");
        let mut session = PacemateSession::with_dialect(&mut port, Dialect::line(false));
        assert_eq!(session.read_part_id().unwrap(), "196387");
    }

    #[test]
    fn test_wait_for_boot_loader_clears_on_failure() {
        let mut port = ScriptedPort::new();
        let mut session = PacemateSession::new(&mut port);
        assert!(session.wait_for_boot_loader().unwrap_err().is_timeout());
        assert_eq!(port.clear_count(), 1);
    }

    #[test]
    fn test_erase_flash_tolerates_single_status() {
        let mut port = ScriptedPort::new().reply(b"E 0 14\r\n0\r\n");
        let mut session = PacemateSession::new(&mut port);
        session.erase_flash(0, 14).unwrap();
    }

    #[test]
    fn test_erase_flash_second_status_consumed() {
        let mut port = ScriptedPort::new().reply_chunks(vec![
            b"E 0 14\r\n0\r\n".to_vec(),
            b"0\r\n".to_vec(),
        ]);
        let mut session = PacemateSession::new(&mut port);
        session.erase_flash(0, 14).unwrap();
        assert_eq!(port.bytes_available().unwrap(), 0);
    }

    #[test]
    fn test_send_checksum() {
        let mut port = ScriptedPort::new().reply(b"1234\r\nOK\r\n");
        let mut session = PacemateSession::new(&mut port);
        session.send_checksum(1234).unwrap();

        let mut port = ScriptedPort::new().reply(b"1234\r\nRESEND\r\n");
        let mut session = PacemateSession::new(&mut port);
        assert!(matches!(
            session.send_checksum(1234),
            Err(Error::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_send_data_line_without_echo_reads_nothing() {
        let mut port = ScriptedPort::new();
        let mut session = PacemateSession::with_dialect(&mut port, Dialect::line(false));
        session.send_data_line(b"#0V%T").unwrap();
        assert_eq!(port.written_text(), vec!["#0V%T\r\n"]);
        assert_eq!(port.wait_count(), 0);
    }

    #[test]
    fn test_read_memory() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let encoded = uuencode::encode_line(&data, 4).unwrap();
        let mut reply = b"R 0 4\r\n0\r\n".to_vec();
        reply.extend_from_slice(&encoded);
        reply.extend_from_slice(format!("\r\n{}\r\n", uuencode::checksum(&data)).as_bytes());

        let mut port = ScriptedPort::new().reply(reply).reply(b"OK\r\n");
        let mut session = PacemateSession::new(&mut port);

        assert_eq!(session.read_memory(0, 4).unwrap(), data);
        assert_eq!(port.written_text(), vec!["R 0 4\r\n", "OK\r\n"]);
    }

    #[test]
    fn test_read_memory_checksum_mismatch() {
        let data = [1, 2, 3, 4];
        let encoded = uuencode::encode_line(&data, 4).unwrap();
        let mut reply = b"0\r\n".to_vec();
        reply.extend_from_slice(&encoded);
        reply.extend_from_slice(b"\r\n11\r\n");

        let mut port = ScriptedPort::new().reply(reply);
        let mut session = PacemateSession::with_dialect(&mut port, Dialect::line(false));

        assert!(matches!(
            session.read_memory(0, 4),
            Err(Error::InvalidChecksum { .. })
        ));
        // No acknowledgement for a corrupted line.
        assert_eq!(port.written().len(), 1);
    }

    #[test]
    fn test_read_memory_length_checked() {
        let mut port = ScriptedPort::new();
        let mut session = PacemateSession::new(&mut port);
        assert!(session.read_memory(0, 6).is_err());
        assert!(session.read_memory(0, 48).is_err());
        assert!(port.written().is_empty());
    }
}
