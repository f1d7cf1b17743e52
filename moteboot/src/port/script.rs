//! Scripted in-memory port.
//!
//! Every write releases the next scripted reply. A reply may be split into
//! chunks: the first chunk becomes readable at once, each further chunk is
//! released by one call to [`Port::wait_data_available`]. A wait with nothing
//! pending fails immediately with a timeout, so tests never sleep.

use {
    crate::{
        error::{Error, Result},
        port::Port,
    },
    std::{
        collections::VecDeque,
        io::{Read, Write},
        time::Duration,
    },
};

/// Modem control line change recorded by [`ScriptedPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// DTR set to the given level.
    Dtr(bool),
    /// RTS set to the given level.
    Rts(bool),
}

/// Port double that answers writes with scripted replies.
#[derive(Debug, Default)]
pub struct ScriptedPort {
    replies: VecDeque<Vec<Vec<u8>>>,
    pending: VecDeque<Vec<u8>>,
    input: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    control: Vec<ControlEvent>,
    waits: usize,
    clears: usize,
    baud_rate: u32,
    closed: bool,
    control_limit: Option<usize>,
}

impl ScriptedPort {
    /// Create a port with an empty script.
    pub fn new() -> Self {
        Self {
            baud_rate: 115200,
            ..Default::default()
        }
    }

    /// Queue a reply for the next write.
    #[must_use]
    pub fn reply(mut self, bytes: impl AsRef<[u8]>) -> Self {
        self.replies.push_back(vec![bytes.as_ref().to_vec()]);
        self
    }

    /// Queue a reply that arrives in several chunks.
    #[must_use]
    pub fn reply_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.replies.push_back(chunks);
        self
    }

    /// Queue no reply for the next write.
    #[must_use]
    pub fn silent(mut self) -> Self {
        self.replies.push_back(Vec::new());
        self
    }

    /// Fail every modem control change after the first `count`.
    #[must_use]
    pub fn fail_control_after(mut self, count: usize) -> Self {
        self.control_limit = Some(count);
        self
    }

    /// Make bytes readable before anything is written.
    #[must_use]
    pub fn with_input(mut self, bytes: &[u8]) -> Self {
        self.input.extend(bytes);
        self
    }

    /// Make chunks readable before anything is written, one per wait.
    #[must_use]
    pub fn with_input_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.release(chunks);
        self
    }

    /// Frames written so far, one entry per write call.
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// Written frames as lossy text.
    pub fn written_text(&self) -> Vec<String> {
        self.written
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Modem control changes so far.
    pub fn control_events(&self) -> &[ControlEvent] {
        &self.control
    }

    /// Number of `wait_data_available` calls.
    pub fn wait_count(&self) -> usize {
        self.waits
    }

    /// Number of `clear_buffers` calls.
    pub fn clear_count(&self) -> usize {
        self.clears
    }

    /// Scripted replies not yet consumed by a write.
    pub fn remaining_replies(&self) -> usize {
        self.replies.len()
    }

    fn release(&mut self, chunks: Vec<Vec<u8>>) {
        let mut chunks = chunks.into_iter();
        if let Some(first) = chunks.next() {
            self.input.extend(first);
        }
        self.pending.extend(chunks);
    }

    fn record(&mut self, event: ControlEvent) -> Result<()> {
        if self.control_limit.is_some_and(|limit| self.control.len() >= limit) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("cannot apply {event:?}"),
            )));
        }
        self.control.push(event);
        Ok(())
    }

    fn check_open(&self) -> std::io::Result<()> {
        if self.closed {
            Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            ))
        } else {
            Ok(())
        }
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.check_open()?;
        if self.input.is_empty() {
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.check_open()?;
        self.written.push(buf.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.release(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.check_open()
    }
}

impl Port for ScriptedPort {
    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.input.len())
    }

    fn wait_data_available(&mut self, timeout: Duration) -> Result<()> {
        self.waits += 1;
        if self.input.is_empty() {
            match self.pending.pop_front() {
                Some(chunk) => self.input.extend(chunk),
                None => {
                    return Err(Error::timeout(format!(
                        "no data within {} ms",
                        timeout.as_millis()
                    )));
                }
            }
        }
        Ok(())
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.clears += 1;
        self.input.clear();
        self.pending.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.record(ControlEvent::Dtr(level))
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.record(ControlEvent::Rts(level))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
