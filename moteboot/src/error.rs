//! Error types for moteboot.

use crate::protocol::hex_string;
use crate::target::Capability;
use std::io;
use thiserror::Error;

/// Result type for moteboot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for moteboot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (stream closed, port gone).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No (or incomplete) data within the allotted wait.
    #[error("Timeout: {context}{}", partial_suffix(.partial))]
    Timeout {
        /// What the reader was waiting for.
        context: String,
        /// Bytes received before the wait expired.
        partial: Vec<u8>,
    },

    /// Frame integrity failure, or a CRC acknowledgement other than `OK`.
    #[error("Invalid checksum: {detail} (raw: {})", hex_string(.raw))]
    InvalidChecksum {
        /// Received versus calculated values, or the rejected reply.
        detail: String,
        /// The raw frame or reply.
        raw: Vec<u8>,
    },

    /// A binary reply carried a different response type than expected.
    #[error("Unexpected response: expected type {expected:#04x}, got {actual:#04x} (raw: {})", hex_string(.raw))]
    UnexpectedResponse {
        /// Expected response type tag.
        expected: u8,
        /// Received response type tag.
        actual: u8,
        /// Payload of the rejected reply.
        raw: Vec<u8>,
    },

    /// A line dialect reply did not match the expected text.
    #[error("Unexpected reply: expected {expected}, got {reply:?}")]
    UnexpectedReply {
        /// Description of the expected reply.
        expected: &'static str,
        /// Raw reply text.
        reply: String,
    },

    /// A frame whose structure is inconsistent (e.g. zero length byte).
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The device reported a non-zero status for an erase command.
    #[error("Flash erase failed: device status {status:#04x}")]
    FlashEraseFailed {
        /// Status byte reported by the device.
        status: u8,
    },

    /// The device reported a non-zero status for a flash configure command.
    #[error("Flash configuration failed: device status {status:#04x}")]
    FlashConfigurationFailed {
        /// Status byte reported by the device.
        status: u8,
    },

    /// The device could not report its flash type.
    #[error("Flash type read failed: device status {status:#04x}")]
    FlashTypeReadFailed {
        /// Status byte reported by the device.
        status: u8,
    },

    /// The device reported a non-zero status for a program command.
    #[error("Flash program failed at {address:#010x}: device status {status:#04x}")]
    FlashProgramFailed {
        /// Start address of the rejected chunk.
        address: u32,
        /// Status byte reported by the device.
        status: u8,
    },

    /// Handshake with the boot loader failed.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// The device family does not provide the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(Capability),

    /// Invalid address, length or other argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation was canceled between two protocol steps.
    #[error("Operation canceled")]
    Canceled,

    /// Device not found.
    #[error("Device not found")]
    DeviceNotFound,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a timeout error without partial data.
    pub fn timeout(context: impl Into<String>) -> Self {
        Self::Timeout {
            context: context.into(),
            partial: Vec::new(),
        }
    }

    /// Whether this is a timeout the caller may retry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

fn partial_suffix(partial: &[u8]) -> String {
    if partial.is_empty() {
        String::new()
    } else {
        format!(" (partial: \"{}\")", partial.escape_ascii())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_includes_partial_data() {
        let err = Error::Timeout {
            context: "incomplete reply".into(),
            partial: b"P 14 14\r\n".to_vec(),
        };
        assert_eq!(
            err.to_string(),
            "Timeout: incomplete reply (partial: \"P 14 14\\r\\n\")"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_unexpected_response_reports_both_tags() {
        let err = Error::UnexpectedResponse {
            expected: 0x08,
            actual: 0x0C,
            raw: vec![0x0C, 0x00],
        };
        let msg = err.to_string();
        assert!(msg.contains("0x08"), "{msg}");
        assert!(msg.contains("0x0c"), "{msg}");
        assert!(!err.is_timeout());
    }
}
