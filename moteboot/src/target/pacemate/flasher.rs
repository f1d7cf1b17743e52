//! Pacemate flasher.

use {
    crate::{
        error::Result,
        operation::{Monitor, Operation, ProgramMode},
        port::Port,
        target::{
            ChipConfig, ChipFamily, Flasher,
            pacemate::{
                operations::{EraseFlash, ProgramImage, ReadFlash, WriteCrc, WriteFlash},
                session::PacemateSession,
            },
        },
    },
    log::{info, warn},
};

/// Flasher for Pacemate (LPC2136) devices.
pub struct PacemateFlasher<P: Port> {
    port: P,
    config: ChipConfig,
}

impl<P: Port> PacemateFlasher<P> {
    /// Create a flasher on an opened port.
    pub fn new(port: P, config: ChipConfig) -> Self {
        Self { port, config }
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Consume the flasher and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    fn session(&mut self) -> PacemateSession<'_, P> {
        PacemateSession::with_dialect(&mut self.port, self.config.dialect())
    }

    fn run<O, T>(&mut self, op: O, monitor: &mut Monitor<'_>) -> Result<T>
    where
        O: for<'p> Operation<PacemateSession<'p, P>, Output = T>,
    {
        let attempts = self.config.connect_attempts;
        let mut session = self.session();
        monitor.run(&mut ProgramMode::new(op, attempts), &mut session)
    }
}

impl<P: Port> Flasher for PacemateFlasher<P> {
    fn family(&self) -> ChipFamily {
        ChipFamily::Pacemate
    }

    fn connect(&mut self) -> Result<()> {
        info!("Connecting to LPC2136 boot loader on {}", self.port.name());
        let attempts = self.config.connect_attempts;
        let mut session = self.session();
        session.enter_program_mode(attempts)?;
        let result = session.wait_for_boot_loader();
        let left = session.leave_program_mode();
        if let (Err(_), Err(leave)) = (&result, &left) {
            warn!("Failed to leave program mode: {leave}");
        }
        result.and(left)
    }

    fn erase_flash(&mut self, sector: Option<u8>, monitor: &mut Monitor<'_>) -> Result<()> {
        let op = sector.map_or_else(EraseFlash::all, EraseFlash::sector);
        self.run(op, monitor)
    }

    fn write_flash(&mut self, address: u32, data: &[u8], monitor: &mut Monitor<'_>) -> Result<()> {
        self.run(WriteFlash::new(address, data), monitor)
    }

    fn program(&mut self, address: u32, image: &[u8], monitor: &mut Monitor<'_>) -> Result<()> {
        self.run(ProgramImage::new(address, image), monitor)
    }

    fn read_flash(&mut self, address: u32, len: usize, monitor: &mut Monitor<'_>) -> Result<Vec<u8>> {
        self.run(ReadFlash::new(address, len), monitor)
    }

    fn write_crc(&mut self, crc: u16, monitor: &mut Monitor<'_>) -> Result<bool> {
        self.run(WriteCrc::new(crc), monitor)
    }

    fn reset(&mut self) -> Result<()> {
        self.session().leave_program_mode()
    }

    fn close(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Failed to close {}: {e}", self.port.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            error::Error,
            operation::CancelToken,
            port::{ScriptedPort, script::ControlEvent},
            target::Capability,
        },
        std::time::Duration,
    };

    fn flasher(port: ScriptedPort) -> PacemateFlasher<ScriptedPort> {
        crate::init_test_logger();
        let config = ChipConfig::new(ChipFamily::Pacemate)
            .with_reset_pulse(Duration::ZERO)
            .with_connect_attempts(1);
        PacemateFlasher::new(port, config)
    }

    fn synchronized(port: ScriptedPort) -> ScriptedPort {
        port.reply(b"Synchronized\r\n")
            .reply(b"Synchronized\r\n")
            .reply(b"Synchronized\r\nOK\r\n")
    }

    #[test]
    fn test_connect_reads_part_id() {
        let port = synchronized(ScriptedPort::new()).reply(b"J\r\n0\r\n196387\r\n");
        let mut flasher = flasher(port);

        flasher.connect().unwrap();

        assert_eq!(
            flasher.port().written_text(),
            vec!["?\r\n", "Synchronized\r\n", "12000\r\n", "J\r\n"]
        );
        assert_eq!(
            flasher.port().control_events().last(),
            Some(&ControlEvent::Rts(false))
        );
    }

    #[test]
    fn test_connect_reports_boot_loader_error_over_reset_error() {
        let port = synchronized(ScriptedPort::new()).fail_control_after(4);
        let mut flasher = flasher(port);

        let err = flasher.connect().unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");
        assert_eq!(flasher.port().written_text().last().map(String::as_str), Some("J\r\n"));
        assert_eq!(flasher.port().control_events().len(), 4);
    }

    #[test]
    fn test_connect_reports_reset_error() {
        let port = synchronized(ScriptedPort::new())
            .reply(b"J\r\n0\r\n196387\r\n")
            .fail_control_after(4);
        let mut flasher = flasher(port);
        assert!(matches!(flasher.connect(), Err(Error::Io(_))));
    }

    #[test]
    fn test_erase_all_in_program_mode() {
        let port = synchronized(ScriptedPort::new())
            .reply(b"U 23130\r\n0\r\n")
            .reply(b"P 0 14\r\n0\r\n")
            .reply(b"E 0 14\r\n0\r\n");
        let mut flasher = flasher(port);
        let mut monitor = Monitor::new(CancelToken::new());

        flasher.erase_flash(None, &mut monitor).unwrap();
        assert_eq!(flasher.port().written().len(), 6);
        assert_eq!(flasher.port().control_events().len(), 7);
    }

    #[test]
    fn test_write_crc_without_boot_loader() {
        let mut flasher = flasher(ScriptedPort::new());
        let mut monitor = Monitor::new(CancelToken::new());
        assert!(matches!(
            flasher.write_crc(0x1234, &mut monitor),
            Err(Error::HandshakeFailed(_))
        ));
    }

    #[test]
    fn test_write_crc_canceled_before_copy_leaves_program_mode() {
        let mut port = synchronized(ScriptedPort::new())
            .reply(b"U 23130\r\n0\r\n")
            .reply(b"P 14 14\r\n0\r\n")
            .reply(b"E 14 14\r\n0\r\n")
            .reply(b"W 1073742336 256\r\n0\r\n");
        for _ in 0..6 {
            port = port.reply(b"line\r\n");
        }
        let port = port.reply(b"64840\r\nOK\r\n");
        let mut flasher = flasher(port);

        let token = CancelToken::new();
        let cancel = token.clone();
        let mut monitor = Monitor::new(token).with_progress(move |p| {
            if p >= 0.75 {
                cancel.cancel();
            }
        });

        assert!(matches!(
            flasher.write_crc(0x1234, &mut monitor),
            Err(Error::Canceled)
        ));
        let text = flasher.port().written_text();
        assert_eq!(text.last().map(String::as_str), Some("64840\r\n"));
        assert!(text.iter().all(|line| !line.starts_with("C ")));
        assert_eq!(
            flasher.port().control_events()[4..],
            [
                ControlEvent::Dtr(false),
                ControlEvent::Rts(true),
                ControlEvent::Rts(false)
            ]
        );
    }

    #[test]
    fn test_mac_address_is_unsupported() {
        let mut flasher = flasher(ScriptedPort::new());
        let mut monitor = Monitor::new(CancelToken::new());
        assert!(matches!(
            flasher.read_mac_address(&mut monitor),
            Err(Error::Unsupported(Capability::ReadMacAddress))
        ));
        assert!(flasher.port().control_events().is_empty());
    }
}
