//! Boot loader requests and replies.
//!
//! ## Binary requests
//!
//! ```text
//! +------+----------------------+
//! | Tag  | Arguments            |
//! +------+----------------------+
//! | 1    | little-endian fields |
//! +------+----------------------+
//! ```
//!
//! Addresses are `u32` and lengths `u16`. The reply to a request carries the
//! request tag plus one in its first payload byte, followed by a status byte
//! (zero on success) and optional data.
//!
//! ## Line requests
//!
//! Plain ASCII commands of the LPC2136 ISP (`"U 23130"`, `"P 0 14"`, ...).
//! CR LF is appended by [`crate::protocol::line::encode`].

use byteorder::{LittleEndian, WriteBytesExt};

/// Kind of a boot loader message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Binary: read flash.
    FlashRead,
    /// Binary: program flash.
    FlashProgram,
    /// Binary: erase the whole flash.
    FlashErase,
    /// Binary: write the flash status register (enables erase).
    StatusRegisterWrite,
    /// Binary: erase one sector.
    SectorErase,
    /// Binary: select the flash device.
    FlashConfigure,
    /// Binary: read the flash device identifier.
    FlashTypeRead,
    /// Binary: read RAM.
    RamRead,
    /// Line: unlock flash commands.
    Unlock,
    /// Line: prepare sectors for write.
    PrepareSectors,
    /// Line: erase sectors.
    EraseSectors,
    /// Line: write to RAM.
    WriteToRam,
    /// Line: copy RAM to flash.
    CopyRamToFlash,
    /// Line: read memory.
    ReadMemory,
    /// Line: checksum of the preceding data lines.
    WriteCrc,
    /// Line: read part identification.
    ReadPartId,
    /// Line: first autobaud step (`?`).
    AutoBaud,
    /// Line: second autobaud step (`Synchronized`).
    AutoBaud2,
    /// Line: third autobaud step (crystal frequency).
    AutoBaud3,
    /// Line: one uuencoded data line, or a data acknowledgement.
    DataLine,
}

impl MessageKind {
    /// Request tag of a binary message, `None` for line messages.
    pub const fn request_tag(self) -> Option<u8> {
        match self {
            Self::FlashErase => Some(0x07),
            Self::FlashProgram => Some(0x09),
            Self::FlashRead => Some(0x0B),
            Self::SectorErase => Some(0x0D),
            Self::StatusRegisterWrite => Some(0x0F),
            Self::RamRead => Some(0x1F),
            Self::FlashTypeRead => Some(0x25),
            Self::FlashConfigure => Some(0x2C),
            _ => None,
        }
    }

    /// Expected reply tag of a binary message.
    pub const fn response_tag(self) -> Option<u8> {
        match self.request_tag() {
            Some(tag) => Some(tag + 1),
            None => None,
        }
    }
}

/// An immutable boot loader request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    bytes: Vec<u8>,
}

impl Message {
    fn new(kind: MessageKind, bytes: Vec<u8>) -> Self {
        Self { kind, bytes }
    }

    fn binary(kind: MessageKind, args: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(1 + args.len());
        // Only binary kinds reach this constructor.
        bytes.push(kind.request_tag().unwrap_or_default());
        bytes.extend_from_slice(args);
        Self::new(kind, bytes)
    }

    fn text(kind: MessageKind, text: String) -> Self {
        Self::new(kind, text.into_bytes())
    }

    /// Kind of the message.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Payload bytes (without framing).
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    // ---- Binary dialect ----

    /// Read `len` bytes of flash at `address`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn flash_read(address: u32, len: u16) -> Self {
        let mut args = Vec::with_capacity(6);
        args.write_u32::<LittleEndian>(address).unwrap();
        args.write_u16::<LittleEndian>(len).unwrap();
        Self::binary(MessageKind::FlashRead, &args)
    }

    /// Program `data` at `address`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn flash_program(address: u32, data: &[u8]) -> Self {
        let mut args = Vec::with_capacity(4 + data.len());
        args.write_u32::<LittleEndian>(address).unwrap();
        args.extend_from_slice(data);
        Self::binary(MessageKind::FlashProgram, &args)
    }

    /// Erase the whole flash.
    pub fn flash_erase() -> Self {
        Self::binary(MessageKind::FlashErase, &[])
    }

    /// Write the flash status register.
    pub fn status_register_write(value: u8) -> Self {
        Self::binary(MessageKind::StatusRegisterWrite, &[value])
    }

    /// Erase one flash sector.
    pub fn sector_erase(sector: u8) -> Self {
        Self::binary(MessageKind::SectorErase, &[sector])
    }

    /// Select the flash device by its configure code.
    pub fn flash_configure(code: u8) -> Self {
        Self::binary(MessageKind::FlashConfigure, &[code, 0, 0, 0, 0])
    }

    /// Read the flash manufacturer and device identifier.
    pub fn flash_type_read() -> Self {
        Self::binary(MessageKind::FlashTypeRead, &[])
    }

    /// Read `len` bytes of RAM at `address`.
    #[allow(clippy::unwrap_used)] // Writing to Vec<u8> cannot fail
    pub fn ram_read(address: u32, len: u16) -> Self {
        let mut args = Vec::with_capacity(6);
        args.write_u32::<LittleEndian>(address).unwrap();
        args.write_u16::<LittleEndian>(len).unwrap();
        Self::binary(MessageKind::RamRead, &args)
    }

    // ---- Line dialect ----

    /// Unlock flash write and erase commands.
    pub fn unlock() -> Self {
        Self::text(MessageKind::Unlock, "U 23130".into())
    }

    /// Prepare sectors `start..=end` for a write or erase.
    pub fn prepare_sectors(start: u8, end: u8) -> Self {
        Self::text(MessageKind::PrepareSectors, format!("P {start} {end}"))
    }

    /// Erase sectors `start..=end`.
    pub fn erase_sectors(start: u8, end: u8) -> Self {
        Self::text(MessageKind::EraseSectors, format!("E {start} {end}"))
    }

    /// Announce `len` bytes of data for RAM at `address`.
    pub fn write_to_ram(address: u32, len: u32) -> Self {
        Self::text(MessageKind::WriteToRam, format!("W {address} {len}"))
    }

    /// Copy `len` bytes from RAM at `ram` to flash at `flash`.
    pub fn copy_ram_to_flash(flash: u32, ram: u32, len: u32) -> Self {
        Self::text(MessageKind::CopyRamToFlash, format!("C {flash} {ram} {len}"))
    }

    /// Read `len` bytes of memory at `address`.
    pub fn read_memory(address: u32, len: u32) -> Self {
        Self::text(MessageKind::ReadMemory, format!("R {address} {len}"))
    }

    /// Checksum over the data lines sent since the last checksum.
    pub fn write_crc(checksum: u32) -> Self {
        Self::text(MessageKind::WriteCrc, checksum.to_string())
    }

    /// Read the part identification number.
    pub fn read_part_id() -> Self {
        Self::text(MessageKind::ReadPartId, "J".into())
    }

    /// First autobaud step.
    pub fn auto_baud() -> Self {
        Self::text(MessageKind::AutoBaud, "?".into())
    }

    /// Second autobaud step.
    pub fn auto_baud2() -> Self {
        Self::text(MessageKind::AutoBaud2, "Synchronized".into())
    }

    /// Third autobaud step, announcing the crystal frequency in kHz.
    pub fn auto_baud3() -> Self {
        Self::text(MessageKind::AutoBaud3, "12000".into())
    }

    /// One encoded data line.
    pub fn data_line(line: &[u8]) -> Self {
        Self::new(MessageKind::DataLine, line.to_vec())
    }

    /// Acknowledge a verified data reply.
    pub fn data_ok() -> Self {
        Self::text(MessageKind::DataLine, "OK".into())
    }
}

/// A validated binary reply.
///
/// `payload[0]` is the response tag, `payload[1]` the status byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    payload: Vec<u8>,
}

impl Reply {
    pub(crate) fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Response tag.
    pub fn tag(&self) -> u8 {
        self.payload.first().copied().unwrap_or_default()
    }

    /// Status byte, `0xFF` when the reply carries none.
    pub fn status(&self) -> u8 {
        self.payload.get(1).copied().unwrap_or(0xFF)
    }

    /// Data following the tag and status bytes.
    pub fn data(&self) -> &[u8] {
        self.payload.get(2..).unwrap_or_default()
    }

    /// Complete payload including the tag.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the reply, returning the data after tag and status.
    pub fn into_data(mut self) -> Vec<u8> {
        if self.payload.len() <= 2 {
            Vec::new()
        } else {
            self.payload.split_off(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_read_layout() {
        let msg = Message::flash_read(0x24, 0x20);
        assert_eq!(msg.kind(), MessageKind::FlashRead);
        assert_eq!(msg.bytes(), &[0x0B, 0x24, 0x00, 0x00, 0x00, 0x20, 0x00]);
    }

    #[test]
    fn test_flash_program_layout() {
        let msg = Message::flash_program(0x0001_0203, &[0xAA, 0xBB]);
        assert_eq!(msg.bytes(), &[0x09, 0x03, 0x02, 0x01, 0x00, 0xAA, 0xBB]);
    }

    #[test]
    fn test_response_tags() {
        assert_eq!(MessageKind::FlashErase.response_tag(), Some(0x08));
        assert_eq!(MessageKind::SectorErase.response_tag(), Some(0x0E));
        assert_eq!(MessageKind::StatusRegisterWrite.response_tag(), Some(0x10));
        assert_eq!(MessageKind::Unlock.response_tag(), None);
    }

    #[test]
    fn test_line_messages() {
        assert_eq!(Message::unlock().bytes(), b"U 23130");
        assert_eq!(Message::prepare_sectors(14, 14).bytes(), b"P 14 14");
        assert_eq!(Message::erase_sectors(0, 14).bytes(), b"E 0 14");
        assert_eq!(
            Message::write_to_ram(0x4000_0200, 256).bytes(),
            b"W 1073742336 256"
        );
        assert_eq!(
            Message::copy_ram_to_flash(0x3FF00, 0x4000_0200, 256).bytes(),
            b"C 261888 1073742336 256"
        );
        assert_eq!(Message::write_crc(1234).bytes(), b"1234");
    }

    #[test]
    fn test_reply_accessors() {
        let reply = Reply::new(vec![0x0C, 0x00, 1, 2, 3]);
        assert_eq!(reply.tag(), 0x0C);
        assert_eq!(reply.status(), 0);
        assert_eq!(reply.data(), &[1, 2, 3]);
        assert_eq!(reply.into_data(), vec![1, 2, 3]);

        let short = Reply::new(vec![0x08]);
        assert_eq!(short.status(), 0xFF);
        assert!(short.data().is_empty());
    }
}
