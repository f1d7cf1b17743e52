//! Jennic JN51xx boot loader.
//!
//! The JN51xx ROM speaks a length-prefixed binary protocol with a one byte
//! checksum. Flash lives on an external SPI device which, except on the
//! JN5121, must be identified and configured before it can be erased.

pub mod flasher;
pub mod operations;
pub mod session;

pub use {
    flasher::JennicFlasher,
    operations::{
        ConfigureFlash, EraseFlash, GetChipType, ProgramImage, ReadFlash, ReadMacAddress,
        WriteFlash,
    },
    session::{CHIP_ID_ADDRESS, JennicSession, MAX_BLOCK},
};
