//! Jennic flasher.

use {
    crate::{
        error::Result,
        operation::{Monitor, Operation, ProgramMode},
        port::Port,
        target::{
            ChipConfig, ChipFamily, ChipType, Flasher, MacAddress,
            jennic::{
                operations::{
                    EraseFlash, GetChipType, ProgramImage, ReadFlash, ReadMacAddress, WriteFlash,
                },
                session::JennicSession,
            },
        },
    },
    log::{info, warn},
};

/// Flasher for Jennic JN51xx devices.
///
/// Owns the port. Every operation resets the device into its boot loader
/// first and back into the application afterwards.
pub struct JennicFlasher<P: Port> {
    port: P,
    config: ChipConfig,
}

impl<P: Port> JennicFlasher<P> {
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

    fn run<O, T>(&mut self, op: O, monitor: &mut Monitor<'_>) -> Result<T>
    where
        O: for<'p> Operation<JennicSession<'p, P>, Output = T>,
    {
        let mut session = JennicSession::with_dialect(&mut self.port, self.config.dialect());
        let mut op = ProgramMode::new(op, self.config.connect_attempts);
        monitor.run(&mut op, &mut session)
    }
}

impl<P: Port> Flasher for JennicFlasher<P> {
    fn family(&self) -> ChipFamily {
        ChipFamily::Jennic
    }

    fn connect(&mut self) -> Result<()> {
        info!("Connecting to Jennic boot loader on {}", self.port.name());
        let mut session = JennicSession::with_dialect(&mut self.port, self.config.dialect());
        session.enter_program_mode(self.config.connect_attempts)?;
        session.leave_program_mode()
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

    fn read_mac_address(&mut self, monitor: &mut Monitor<'_>) -> Result<MacAddress> {
        self.run(ReadMacAddress, monitor)
    }

    fn chip_type(&mut self, monitor: &mut Monitor<'_>) -> Result<ChipType> {
        self.run(GetChipType, monitor)
    }

    fn reset(&mut self) -> Result<()> {
        let mut session = JennicSession::with_dialect(&mut self.port, self.config.dialect());
        session.leave_program_mode()
    }

    fn close(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Failed to close {}: {e}", self.port.name());
        }
    }
}
