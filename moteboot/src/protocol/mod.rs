//! Boot loader wire protocols.
//!
//! Two dialects share one session type:
//!
//! - [`binary`]: length-prefixed frames with a trailing 8-bit checksum (Jennic).
//! - [`line`]: CR LF terminated ASCII commands with optional echo (LPC2136 ISP,
//!   used by the Pacemate), with data lines in [`uuencode`] form.
//!
//! [`session::Session`] combines a [`dialect::Dialect`] with a borrowed
//! [`crate::port::Port`] and performs one request/reply round trip per call.

pub mod binary;
pub mod dialect;
pub mod line;
pub mod message;
pub mod session;
pub mod uuencode;

pub use dialect::{ChecksumKind, Dialect, FrameStyle};
pub use message::{Message, MessageKind, Reply};
pub use session::{ExchangeState, Session};

/// Format bytes as space separated upper-case hex for diagnostics.
pub(crate) fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[]), "");
        assert_eq!(hex_string(&[0x0B, 0x24, 0x00]), "0B 24 00");
    }
}
