//! Pacemate sensor boards with an NXP LPC2136.
//!
//! The LPC2136 boot ROM speaks the ASCII ISP protocol: one command per CR LF
//! terminated line, decimal status codes and uuencoded data. Flash is
//! programmed by filling a RAM buffer and copying it into prepared sectors.

pub mod flasher;
pub mod operations;
pub mod session;

pub use {
    flasher::PacemateFlasher,
    operations::{EraseFlash, ProgramImage, ReadFlash, WriteCrc, WriteFlash, write_crc_to_flash},
    session::{
        BLOCK_SIZE, CRC_BLOCK_ADDRESS, LAST_SECTOR, MAX_READ, PacemateSession, RAM_ADDRESS,
        sector_of,
    },
};
