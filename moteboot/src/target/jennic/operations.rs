//! Composed Jennic operations.

use {
    crate::{
        error::{Error, Result},
        operation::{Monitor, Operation, fraction},
        port::Port,
        protocol::{Message, MessageKind},
        target::{
            ChipType, FlashType, MacAddress,
            jennic::session::{JennicSession, MAX_BLOCK},
        },
    },
    log::{debug, info},
};

/// Erase one sector or the whole flash.
///
/// Progress: 0.25 once the status register write is sent, 0.5 once it was
/// accepted, 1.0 after the erase.
#[derive(Debug, Clone, Copy, Default)]
pub struct EraseFlash {
    sector: Option<u8>,
}

impl EraseFlash {
    /// Erase the whole flash.
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

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for EraseFlash {
    type Output = ();

    fn execute(&mut self, session: &mut JennicSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<()> {
        session.send_command(&Message::status_register_write(0))?;
        monitor.progress(0.25);
        let reply = session.await_reply(MessageKind::StatusRegisterWrite)?;
        if reply.status() != 0 {
            return Err(Error::FlashEraseFailed {
                status: reply.status(),
            });
        }

        monitor.checkpoint()?;
        monitor.progress(0.5);

        let (message, kind) = match self.sector {
            Some(sector) => (Message::sector_erase(sector), MessageKind::SectorErase),
            None => (Message::flash_erase(), MessageKind::FlashErase),
        };
        session.send_command(&message)?;
        let reply = session.await_reply(kind)?;
        if reply.status() != 0 {
            return Err(Error::FlashEraseFailed {
                status: reply.status(),
            });
        }

        monitor.progress(1.0);
        Ok(())
    }
}

/// Configure the external flash for the given chip.
#[derive(Debug, Clone, Copy)]
pub struct ConfigureFlash {
    chip: ChipType,
}

impl ConfigureFlash {
    /// Configure flash of `chip`.
    pub fn new(chip: ChipType) -> Self {
        Self { chip }
    }
}

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for ConfigureFlash {
    type Output = Option<FlashType>;

    fn execute(
        &mut self,
        session: &mut JennicSession<'_, P>,
        monitor: &mut Monitor<'_>,
    ) -> Result<Option<FlashType>> {
        let flash = session.configure_flash(self.chip)?;
        monitor.progress(1.0);
        Ok(flash)
    }
}

/// Read a flash range in blocks of [`MAX_BLOCK`] bytes.
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

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for ReadFlash {
    type Output = Vec<u8>;

    fn execute(&mut self, session: &mut JennicSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.len);
        let mut address = self.address;

        while data.len() < self.len {
            monitor.checkpoint()?;
            let chunk = (self.len - data.len()).min(MAX_BLOCK);
            let block = session.read_flash(address, chunk)?;
            if block.len() != chunk {
                return Err(Error::MalformedFrame(format!(
                    "read of {chunk} bytes at {address:#x} returned {}",
                    block.len()
                )));
            }
            data.extend_from_slice(&block);
            #[allow(clippy::cast_possible_truncation)] // bounded by MAX_BLOCK
            let step = chunk as u32;
            address = address.wrapping_add(step);
            monitor.progress(fraction(data.len(), self.len));
        }
        Ok(data)
    }
}

/// Program a flash range in blocks of [`MAX_BLOCK`] bytes.
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

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for WriteFlash<'_> {
    type Output = ();

    fn execute(&mut self, session: &mut JennicSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<()> {
        let mut written = 0usize;
        for block in self.data.chunks(MAX_BLOCK) {
            monitor.checkpoint()?;
            let address = self
                .address
                .checked_add(u32::try_from(written).map_err(|_| too_large(self.data.len()))?)
                .ok_or_else(|| too_large(self.data.len()))?;
            session.write_flash(address, block)?;
            written += block.len();
            monitor.progress(fraction(written, self.data.len()));
        }
        Ok(())
    }
}

/// Identify the chip.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetChipType;

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for GetChipType {
    type Output = ChipType;

    fn execute(&mut self, session: &mut JennicSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<ChipType> {
        let chip = session.chip_type()?;
        monitor.progress(1.0);
        Ok(chip)
    }
}

/// Read the factory MAC address.
///
/// The chip type decides where the address lives in flash.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadMacAddress;

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for ReadMacAddress {
    type Output = MacAddress;

    fn execute(&mut self, session: &mut JennicSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<MacAddress> {
        let chip = monitor.scoped(0.0, 0.5, |m| GetChipType.execute(session, m))?;
        monitor.checkpoint()?;

        let offset = chip.mac_in_flash_start();
        debug!("Reading MAC address of {chip} at {offset:#x}");
        let bytes = monitor.scoped(0.5, 1.0, |m| ReadFlash::new(offset, 8).execute(session, m))?;
        MacAddress::from_slice(&bytes)
    }
}

/// Configure, erase and program a complete image.
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

impl<P: Port + ?Sized> Operation<JennicSession<'_, P>> for ProgramImage<'_> {
    type Output = ();

    fn execute(&mut self, session: &mut JennicSession<'_, P>, monitor: &mut Monitor<'_>) -> Result<()> {
        let chip = monitor.scoped(0.0, 0.05, |m| GetChipType.execute(session, m))?;
        monitor.checkpoint()?;
        monitor.scoped(0.05, 0.1, |m| ConfigureFlash::new(chip).execute(session, m))?;
        monitor.checkpoint()?;
        monitor.scoped(0.1, 0.3, |m| EraseFlash::all().execute(session, m))?;
        monitor.checkpoint()?;
        monitor.scoped(0.3, 1.0, |m| {
            WriteFlash::new(self.address, self.image).execute(session, m)
        })?;
        info!("Programmed {} bytes on {chip}", self.image.len());
        Ok(())
    }
}

fn too_large(len: usize) -> Error {
    Error::InvalidArgument(format!("{len} bytes exceed the address space"))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            operation::{CancelToken, OperationState, ProgramMode},
            port::{ScriptedPort, script::ControlEvent},
            protocol::Dialect,
            target::jennic::session::tests::reply,
        },
        std::{cell::RefCell, rc::Rc, time::Duration},
    };

    fn handshake_reply() -> Vec<u8> {
        reply(0x0C, 0, &[0xFF; 0x20])
    }

    fn dialect() -> Dialect {
        Dialect::binary().with_reset_pulse(Duration::ZERO)
    }

    fn recorder() -> (Rc<RefCell<Vec<f32>>>, impl FnMut(f32)) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = {
            let seen = Rc::clone(&seen);
            move |p| seen.borrow_mut().push(p)
        };
        (seen, sink)
    }

    #[test]
    fn test_erase_flash_progress() {
        let mut port = ScriptedPort::new()
            .reply(reply(0x10, 0, &[]))
            .reply(reply(0x0E, 0, &[]));
        let (seen, sink) = recorder();
        let mut monitor = Monitor::new(CancelToken::new()).with_progress(sink);
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        monitor.run(&mut EraseFlash::sector(3), &mut session).unwrap();

        assert_eq!(*seen.borrow(), vec![0.25, 0.5, 1.0]);
        assert_eq!(monitor.state(), OperationState::Success);
        assert_eq!(port.written()[1][1..], [0x0D, 0x03, 0x13]);
    }

    #[test]
    fn test_erase_flash_rejected_sector_erase() {
        let mut port = ScriptedPort::new()
            .reply(reply(0x10, 0, &[]))
            .reply(reply(0x0E, 0x01, &[]))
            .reply(reply(0x0E, 0, &[]));
        let (seen, sink) = recorder();
        let mut monitor = Monitor::new(CancelToken::new()).with_progress(sink);
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let err = monitor.run(&mut EraseFlash::sector(0), &mut session).unwrap_err();

        assert!(matches!(err, Error::FlashEraseFailed { status: 0x01 }));
        assert_eq!(*seen.borrow(), vec![0.25, 0.5]);
        assert_eq!(monitor.state(), OperationState::Failed);
        assert_eq!(port.written().len(), 2);
        assert_eq!(port.remaining_replies(), 1);
    }

    #[test]
    fn test_erase_flash_rejected_status_register_write() {
        let mut port = ScriptedPort::new().reply(reply(0x10, 0x05, &[]));
        let mut monitor = Monitor::new(CancelToken::new());
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let err = monitor.run(&mut EraseFlash::all(), &mut session).unwrap_err();
        assert!(matches!(err, Error::FlashEraseFailed { status: 0x05 }));
        assert_eq!(port.written().len(), 1);
    }

    #[test]
    fn test_erase_flash_canceled_after_enable_still_leaves_program_mode() {
        let mut port = ScriptedPort::new()
            .reply(handshake_reply())
            .reply(reply(0x10, 0, &[]))
            .reply(reply(0x0E, 0, &[]));
        let token = CancelToken::new();
        let cancel = token.clone();
        let mut monitor = Monitor::new(token).with_progress(move |p| {
            if p >= 0.25 {
                cancel.cancel();
            }
        });
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let mut op = ProgramMode::new(EraseFlash::sector(1), 3);
        let err = monitor.run(&mut op, &mut session).unwrap_err();

        assert!(matches!(err, Error::Canceled));
        assert_eq!(monitor.state(), OperationState::Canceled);
        // Handshake and status register write only; the sector erase is never sent.
        assert_eq!(port.written().len(), 2);
        assert_eq!(port.written()[1][1], 0x0F);
        assert_eq!(
            port.control_events().last(),
            Some(&ControlEvent::Rts(false))
        );
        assert_eq!(port.control_events().len(), 7);
    }

    #[test]
    fn test_read_flash_in_blocks() {
        let first: Vec<u8> = (0..128u8).collect();
        let second: Vec<u8> = (0..22u8).collect();
        let mut port = ScriptedPort::new()
            .reply(reply(0x0C, 0, &first))
            .reply(reply(0x0C, 0, &second));
        let mut monitor = Monitor::new(CancelToken::new());
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let data = monitor.run(&mut ReadFlash::new(0x1000, 150), &mut session).unwrap();

        assert_eq!(data.len(), 150);
        assert_eq!(data[128..], second[..]);
        // Second request starts at 0x1000 + 128, length 22.
        assert_eq!(port.written()[1][1..8], [0x0B, 0x80, 0x10, 0, 0, 22, 0]);
    }

    #[test]
    fn test_read_flash_empty_range() {
        let (seen, sink) = recorder();
        let mut port = ScriptedPort::new();
        let mut monitor = Monitor::new(CancelToken::new()).with_progress(sink);
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let data = monitor.run(&mut ReadFlash::new(0x1000, 0), &mut session).unwrap();

        assert!(data.is_empty());
        assert_eq!(*seen.borrow(), vec![1.0]);
        assert_eq!(monitor.state(), OperationState::Success);
        assert!(port.written().is_empty());
    }

    #[test]
    fn test_write_flash_in_blocks() {
        let image = vec![0x5Au8; 200];
        let mut port = ScriptedPort::new()
            .reply(reply(0x0A, 0, &[]))
            .reply(reply(0x0A, 0, &[]));
        let (seen, sink) = recorder();
        let mut monitor = Monitor::new(CancelToken::new()).with_progress(sink);
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        monitor.run(&mut WriteFlash::new(0, &image), &mut session).unwrap();

        assert_eq!(*seen.borrow(), vec![0.64, 1.0]);
        assert_eq!(port.written()[0][0], 1 + 4 + 128 + 1);
        assert_eq!(port.written()[1][0], 1 + 4 + 72 + 1);
    }

    #[test]
    fn test_write_flash_failure_stops() {
        let image = vec![0u8; 300];
        let mut port = ScriptedPort::new()
            .reply(reply(0x0A, 0, &[]))
            .reply(reply(0x0A, 0x03, &[]));
        let mut monitor = Monitor::new(CancelToken::new());
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let err = monitor.run(&mut WriteFlash::new(0x100, &image), &mut session).unwrap_err();
        assert!(matches!(
            err,
            Error::FlashProgramFailed {
                address: 0x180,
                status: 0x03
            }
        ));
        assert_eq!(port.written().len(), 2);
    }

    #[test]
    fn test_read_mac_address() {
        let mac = [0x00, 0x15, 0x8D, 0x00, 0x00, 0x00, 0x12, 0x34];
        let mut port = ScriptedPort::new()
            .reply(reply(0x20, 0, &[0x10, 0x00, 0x86, 0x86]))
            .reply(reply(0x0C, 0, &mac));
        let (seen, sink) = recorder();
        let mut monitor = Monitor::new(CancelToken::new()).with_progress(sink);
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let address = monitor.run(&mut ReadMacAddress, &mut session).unwrap();

        assert_eq!(address.bytes(), &mac);
        assert_eq!(*seen.borrow(), vec![0.5, 1.0]);
        // JN5121 keeps the MAC at 0x24.
        assert_eq!(port.written()[1][2], 0x24);
    }

    #[test]
    fn test_read_mac_address_propagates_timeout() {
        let mut port = ScriptedPort::new().reply(reply(0x20, 0, &[0x10, 0x40, 0x86, 0x86]));
        let mut monitor = Monitor::new(CancelToken::new());
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        let err = monitor.run(&mut ReadMacAddress, &mut session).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(monitor.state(), OperationState::Failed);
    }

    #[test]
    fn test_program_image_sequence() {
        let image = vec![0xA5u8; 10];
        let mut port = ScriptedPort::new()
            .reply(reply(0x20, 0, &[0x10, 0x40, 0x86, 0x86]))
            .reply(reply(0x26, 0, &[0xBF, 0x49]))
            .reply(reply(0x2D, 0, &[]))
            .reply(reply(0x10, 0, &[]))
            .reply(reply(0x08, 0, &[]))
            .reply(reply(0x0A, 0, &[]));
        let mut monitor = Monitor::new(CancelToken::new());
        let mut session = JennicSession::with_dialect(&mut port, dialect());

        monitor.run(&mut ProgramImage::new(0, &image), &mut session).unwrap();

        let tags: Vec<u8> = port.written().iter().map(|f| f[1]).collect();
        assert_eq!(tags, vec![0x1F, 0x25, 0x2C, 0x0F, 0x07, 0x09]);
    }
}
