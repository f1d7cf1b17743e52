//! CR LF terminated ASCII frames (LPC2136 ISP).
//!
//! A reply has no length prefix. The reader therefore waits for a known
//! number of LF bytes and uses a tail heuristic plus a bounded number of idle
//! waits to decide whether a short reply is complete.
//!
//! ```text
//! echo on:   P 0 14<CR><LF>0<CR><LF>
//! echo off:  0<CR><LF>
//! ```

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::Dialect,
    },
    log::trace,
};

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Status line of a successful command.
pub const SUCCESS: &str = "0";

/// Acknowledgement of an accepted checksum.
pub const OK: &str = "OK";

/// Reply to the first two autobaud steps.
pub const SYNCHRONIZED: &[u8] = b"Synchronized\r\n";

/// Reply to the last autobaud step.
pub const SYNCHRONIZED_OK: &[u8] = b"Synchronized\r\nOK\r\n";

/// Tail of a success reply that carries no data line.
const SUCCESS_TAIL: &[u8] = b"\r\n0\r\n";

/// Encode a request line.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.extend_from_slice(payload);
    frame.extend_from_slice(CRLF);
    frame
}

/// Split a reply into lines, dropping trailing empty lines.
pub fn split_lines(reply: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(reply);
    let mut parts: Vec<String> = text.split("\r\n").map(str::to_owned).collect();
    while parts.last().is_some_and(String::is_empty) {
        parts.pop();
    }
    parts
}

/// Interpret a generic success reply.
///
/// Returns the data line following the `"0"` status line, or `""`.
pub fn parse_success(reply: &[u8], echo: bool) -> Result<String> {
    let parts = split_lines(reply);
    let status = usize::from(echo);
    if parts.get(status).is_some_and(|s| s == SUCCESS) {
        return Ok(parts.get(status + 1).cloned().unwrap_or_default());
    }
    Err(Error::UnexpectedReply {
        expected: "status line \"0\"",
        reply: String::from_utf8_lossy(reply).into_owned(),
    })
}

/// Interpret the acknowledgement of a checksum line.
pub fn parse_crc_ack(reply: &[u8], echo: bool) -> Result<()> {
    let parts = split_lines(reply);
    if parts.get(usize::from(echo)).is_some_and(|s| s == OK) {
        return Ok(());
    }
    Err(Error::InvalidChecksum {
        detail: "device asked to resend".into(),
        raw: reply.to_vec(),
    })
}

/// Data line and checksum of a memory read reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReply {
    /// UU-encoded data line.
    pub line: String,
    /// Checksum announced by the device.
    pub checksum: u32,
}

/// Interpret a memory read reply: status, data line and checksum line.
pub fn parse_read_data(reply: &[u8], echo: bool) -> Result<DataReply> {
    let parts = split_lines(reply);
    let status = usize::from(echo);
    let unexpected = || Error::UnexpectedReply {
        expected: "status \"0\", data line and checksum",
        reply: String::from_utf8_lossy(reply).into_owned(),
    };

    if parts.get(status).is_none_or(|s| s != SUCCESS) {
        return Err(unexpected());
    }
    let line = parts.get(status + 1).ok_or_else(unexpected)?;
    let checksum = parts
        .get(status + 2)
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(unexpected)?;

    Ok(DataReply {
        line: line.clone(),
        checksum,
    })
}

/// Shape of an expected reply, in lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Echo, status and optional data line.
    Success,
    /// `Synchronized`.
    Synchronized,
    /// `Synchronized` followed by `OK`.
    SynchronizedOk,
    /// Echo, status, data line and checksum line.
    ReadData,
    /// Echo and `OK`/`RESEND`.
    CrcAck,
    /// Echo of a data line.
    DataEcho,
}

impl ReplyShape {
    /// Number of LF terminated lines to wait for.
    pub fn lines(self, echo: bool) -> usize {
        let echo_line = usize::from(echo);
        match self {
            Self::Success => 2 + echo_line,
            Self::Synchronized => 1,
            Self::SynchronizedOk => 2,
            Self::ReadData => 3 + echo_line,
            Self::CrcAck => 1 + echo_line,
            Self::DataEcho => echo_line,
        }
    }
}

/// Bounded accumulator of one line reply.
pub struct LineReader<'a, P: Port + ?Sized> {
    port: &'a mut P,
    dialect: &'a Dialect,
}

impl<'a, P: Port + ?Sized> LineReader<'a, P> {
    /// Create a reader over `port`.
    pub fn new(port: &'a mut P, dialect: &'a Dialect) -> Self {
        Self { port, dialect }
    }

    /// Read until `lines` LF bytes arrived, the buffer is full, or a short
    /// success reply is detected.
    ///
    /// Fails with [`Error::Timeout`] when nothing arrives within the reply
    /// timeout, or when the reply stalls more often than the retry budget
    /// allows. The second case carries the bytes received so far.
    pub fn read(&mut self, lines: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.dialect.max_reply_len);
        if lines == 0 {
            return Ok(buf);
        }

        let mut seen = 0usize;
        let mut budget = self.dialect.retry_budget;
        self.port.wait_data_available(self.dialect.reply_timeout)?;

        while buf.len() < self.dialect.max_reply_len && seen < lines {
            if self.port.bytes_available()? > 0 {
                let Some(byte) = self.port.read_byte()? else {
                    return Err(Error::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "stream closed inside a reply",
                    )));
                };
                if byte == b'\n' {
                    seen += 1;
                }
                buf.push(byte);
                continue;
            }

            if buf.ends_with(SUCCESS_TAIL) {
                break;
            }

            if let Err(e) = self.port.wait_data_available(self.dialect.idle_timeout) {
                if !e.is_timeout() {
                    return Err(e);
                }
            }

            budget = budget.saturating_sub(1);
            if budget == 0 {
                return Err(Error::Timeout {
                    context: format!("incomplete reply, {seen} of {lines} lines"),
                    partial: buf,
                });
            }
        }

        trace!("<- {:?}", String::from_utf8_lossy(&buf));
        Ok(buf)
    }
}
