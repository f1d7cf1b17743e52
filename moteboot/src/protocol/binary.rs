//! Length-prefixed binary frames (Jennic boot loader).
//!
//! ```text
//! +--------+----------------+----------+
//! | Length |    Payload     | Checksum |
//! +--------+----------------+----------+
//! | 1 byte |  Length - 1    | 1 byte   |
//! +--------+----------------+----------+
//! ```
//!
//! `Length` counts the payload plus the checksum byte. The checksum covers
//! the length byte and the payload.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::{ChecksumKind, Dialect, Reply, hex_string},
    },
    log::trace,
};

/// Largest payload a single length byte can describe.
pub const MAX_PAYLOAD: usize = 254;

/// Checksum over `bytes` (length byte followed by the payload).
pub fn checksum(bytes: &[u8], kind: ChecksumKind) -> u8 {
    match kind {
        ChecksumKind::Sum => bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)),
        ChecksumKind::Xor => bytes.iter().fold(0u8, |acc, b| acc ^ b),
    }
}

/// Encode `payload` into a frame.
pub fn encode(payload: &[u8], kind: ChecksumKind) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::InvalidArgument(format!(
            "payload of {} bytes exceeds {MAX_PAYLOAD}",
            payload.len()
        )));
    }

    let mut frame = Vec::with_capacity(payload.len() + 2);
    #[allow(clippy::cast_possible_truncation)] // bounded by MAX_PAYLOAD
    frame.push(payload.len() as u8 + 1);
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame, kind));
    Ok(frame)
}

/// Decode and validate a complete frame.
///
/// The checksum is checked before the structure so that any single corrupted
/// byte, the length byte included, surfaces as [`Error::InvalidChecksum`].
pub fn decode(frame: &[u8], expected_tag: u8, kind: ChecksumKind) -> Result<Reply> {
    let Some((&received, body)) = frame.split_last() else {
        return Err(Error::MalformedFrame("empty frame".into()));
    };
    if body.is_empty() {
        return Err(Error::MalformedFrame(format!(
            "frame too short: {}",
            hex_string(frame)
        )));
    }

    let calculated = checksum(body, kind);
    if received != calculated {
        return Err(Error::InvalidChecksum {
            detail: format!("received {received:#04x}, calculated {calculated:#04x}"),
            raw: frame.to_vec(),
        });
    }

    let length = usize::from(body[0]);
    if length != frame.len() - 1 || length < 2 {
        return Err(Error::MalformedFrame(format!(
            "length byte {length} does not match frame {}",
            hex_string(frame)
        )));
    }

    let payload = &body[1..];
    if payload[0] != expected_tag {
        return Err(Error::UnexpectedResponse {
            expected: expected_tag,
            actual: payload[0],
            raw: payload.to_vec(),
        });
    }

    Ok(Reply::new(payload.to_vec()))
}

/// Read exactly one frame from `port` and validate it.
///
/// Every byte is awaited for at most `dialect.reply_timeout`.
pub fn read_reply<P: Port + ?Sized>(
    port: &mut P,
    expected_tag: u8,
    dialect: &Dialect,
) -> Result<Reply> {
    port.wait_data_available(dialect.reply_timeout)?;

    let length = next_byte(port)?;
    if length == 0 {
        return Err(Error::MalformedFrame("zero length byte".into()));
    }

    let mut frame = Vec::with_capacity(usize::from(length) + 1);
    frame.push(length);

    // Payload (length - 1 bytes) and the checksum byte.
    for _ in 0..length {
        if let Err(e) = port.wait_data_available(dialect.reply_timeout) {
            return Err(match e {
                Error::Timeout { .. } => Error::Timeout {
                    context: format!(
                        "incomplete reply, {} of {} bytes",
                        frame.len(),
                        usize::from(length) + 1
                    ),
                    partial: frame,
                },
                other => other,
            });
        }
        frame.push(next_byte(port)?);
    }

    trace!("<- {}", hex_string(&frame));
    decode(&frame, expected_tag, dialect.checksum)
}

fn next_byte<P: Port + ?Sized>(port: &mut P) -> Result<u8> {
    port.read_byte()?.ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "stream closed inside a reply",
        ))
    })
}

#[cfg(test)]
mod tests {
    use {super::*, crate::port::ScriptedPort};

    fn frame(payload: &[u8]) -> Vec<u8> {
        encode(payload, ChecksumKind::Sum).unwrap()
    }

    #[test]
    fn test_encode_layout() {
        let encoded = frame(&[0x07]);
        assert_eq!(encoded, vec![0x02, 0x07, 0x09]);

        let encoded = encode(&[0x0F, 0x00], ChecksumKind::Sum).unwrap();
        assert_eq!(encoded, vec![0x03, 0x0F, 0x00, 0x12]);
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xFF, 0x02], ChecksumKind::Sum), 0x01);
        assert_eq!(checksum(&[0xFF, 0x0F], ChecksumKind::Xor), 0xF0);
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let err = encode(&[0u8; 255], ChecksumKind::Sum).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(encode(&[0u8; MAX_PAYLOAD], ChecksumKind::Sum).is_ok());
    }

    #[test]
    fn test_decode_returns_payload() {
        let payloads: [&[u8]; 3] = [&[0x08, 0x00], &[0x0C, 0x00, 1, 2, 3], &[0x26, 0x00, 0xBF, 0x49]];
        for payload in payloads {
            let reply = decode(&frame(payload), payload[0], ChecksumKind::Sum).unwrap();
            assert_eq!(reply.payload(), payload);
        }
    }

    #[test]
    fn test_any_single_byte_corruption_is_a_checksum_error() {
        let original = frame(&[0x0C, 0x00, 0x10, 0x20, 0x30]);
        for index in 0..original.len() {
            for flip in [0x01u8, 0x80, 0x5A] {
                let mut corrupted = original.clone();
                corrupted[index] ^= flip;
                let err = decode(&corrupted, 0x0C, ChecksumKind::Sum).unwrap_err();
                assert!(
                    matches!(err, Error::InvalidChecksum { .. }),
                    "byte {index} flip {flip:#04x}: {err}"
                );
            }
        }
    }

    #[test]
    fn test_tag_mismatch_reports_both_tags() {
        let err = decode(&frame(&[0x0C, 0x00]), 0x08, ChecksumKind::Sum).unwrap_err();
        match err {
            Error::UnexpectedResponse {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0x08);
                assert_eq!(actual, 0x0C);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_inconsistent_length() {
        // Checksum is valid but the length byte claims one byte too many.
        let mut bad = vec![0x04, 0x08, 0x00];
        bad.push(checksum(&bad, ChecksumKind::Sum));
        let err = decode(&bad, 0x08, ChecksumKind::Sum).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn test_read_reply_from_port() {
        let mut port = ScriptedPort::new().with_input(&frame(&[0x10, 0x00]));
        let reply = read_reply(&mut port, 0x10, &Dialect::binary()).unwrap();
        assert_eq!(reply.status(), 0);
    }

    #[test]
    fn test_read_reply_split_across_chunks() {
        let encoded = frame(&[0x0C, 0x00, 0xAA, 0xBB]);
        let mut port = ScriptedPort::new().with_input_chunks(vec![
            encoded[..1].to_vec(),
            encoded[1..3].to_vec(),
            encoded[3..].to_vec(),
        ]);
        let reply = read_reply(&mut port, 0x0C, &Dialect::binary()).unwrap();
        assert_eq!(reply.data(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_read_reply_silent_port_times_out() {
        let mut port = ScriptedPort::new();
        let err = read_reply(&mut port, 0x08, &Dialect::binary()).unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(port.wait_count(), 1);
    }

    #[test]
    fn test_read_reply_truncated_frame_keeps_partial_bytes() {
        let encoded = frame(&[0x0C, 0x00, 0xAA]);
        let mut port = ScriptedPort::new().with_input(&encoded[..3]);
        match read_reply(&mut port, 0x0C, &Dialect::binary()).unwrap_err() {
            Error::Timeout { partial, .. } => assert_eq!(partial, encoded[..3].to_vec()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
