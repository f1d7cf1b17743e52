//! UU-encoding of ISP data lines.
//!
//! A line starts with the length character `0x20 + n` followed by groups of
//! four characters, each carrying three bytes as 6-bit values offset by
//! `0x20`. Zero is sent as `` ` `` instead of a space.

use crate::error::{Error, Result};

/// Maximum number of data bytes in one line.
pub const LINE_SIZE: usize = 45;

fn encode_char(bits: u8) -> u8 {
    let bits = bits & 0x3F;
    if bits == 0 { b'`' } else { bits + 0x20 }
}

fn decode_char(ch: u8) -> u8 {
    ch.wrapping_sub(0x20) & 0x3F
}

/// Encode `data` as one line announcing `len` bytes.
///
/// `data` is zero padded to a multiple of three. `len` may be smaller than
/// `data.len()` when the caller already padded the block.
pub fn encode_line(data: &[u8], len: usize) -> Result<Vec<u8>> {
    if len > LINE_SIZE || len > data.len() {
        return Err(Error::InvalidArgument(format!(
            "line length {len} (data {} bytes, max {LINE_SIZE})",
            data.len()
        )));
    }

    let mut line = Vec::with_capacity(1 + data.len().div_ceil(3) * 4);
    #[allow(clippy::cast_possible_truncation)] // len <= LINE_SIZE
    line.push(encode_char(len as u8));

    for group in data.chunks(3) {
        let b0 = group[0];
        let b1 = group.get(1).copied().unwrap_or(0);
        let b2 = group.get(2).copied().unwrap_or(0);
        line.push(encode_char(b0 >> 2));
        line.push(encode_char((b0 << 4) | (b1 >> 4)));
        line.push(encode_char((b1 << 2) | (b2 >> 6)));
        line.push(encode_char(b2));
    }
    Ok(line)
}

/// Decode one line into its data bytes.
pub fn decode_line(line: &[u8]) -> Result<Vec<u8>> {
    let Some((&len_char, body)) = line.split_first() else {
        return Err(Error::MalformedFrame("empty uuencoded line".into()));
    };
    let len = usize::from(decode_char(len_char));
    let groups = len.div_ceil(3);
    if body.len() < groups * 4 {
        return Err(Error::MalformedFrame(format!(
            "uuencoded line announces {len} bytes but carries {} characters",
            body.len()
        )));
    }

    let mut data = Vec::with_capacity(groups * 3);
    for chunk in body[..groups * 4].chunks(4) {
        let c: Vec<u8> = chunk.iter().map(|&ch| decode_char(ch)).collect();
        data.push((c[0] << 2) | (c[1] >> 4));
        data.push((c[1] << 4) | (c[2] >> 2));
        data.push((c[2] << 6) | c[3]);
    }
    data.truncate(len);
    Ok(data)
}

/// Running checksum of the ISP: the plain sum of all bytes.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes.iter().map(|&b| u32::from(b)).sum()
}
