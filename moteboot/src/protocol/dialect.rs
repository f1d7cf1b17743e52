//! Dialect parameters of a boot loader session.

use std::time::Duration;

/// Default wait for the first byte of a binary reply and between its bytes.
pub const BINARY_REPLY_TIMEOUT: Duration = Duration::from_millis(2500);

/// Default wait for the first byte of a line reply.
pub const LINE_REPLY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Extra wait granted each time a line reply stalls.
pub const LINE_IDLE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Number of stalls tolerated before a line reply times out.
pub const LINE_RETRY_BUDGET: u32 = 5;

/// Size of the line reply buffer.
pub const MAX_LINE_REPLY: usize = 255;

/// How requests and replies are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStyle {
    /// `[length][payload][checksum]`.
    LengthPrefixed,
    /// ASCII text terminated by CR LF.
    Line,
}

/// Checksum of the binary dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumKind {
    /// 8-bit wrapping sum.
    #[default]
    Sum,
    /// 8-bit XOR.
    Xor,
}

/// Per-family framing, checksum, echo and timing rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Frame style.
    pub frame_style: FrameStyle,
    /// Checksum algorithm (binary frames only).
    pub checksum: ChecksumKind,
    /// Whether the device echoes each request line.
    pub echo: bool,
    /// Wait for the first reply byte (and, for binary frames, every byte).
    pub reply_timeout: Duration,
    /// Extra wait when a line reply stalls.
    pub idle_timeout: Duration,
    /// Stalls tolerated by the line reader.
    pub retry_budget: u32,
    /// Upper bound of a line reply.
    pub max_reply_len: usize,
    /// Duration of the DTR/RTS reset pulse.
    pub reset_pulse: Duration,
}

impl Dialect {
    /// Jennic binary dialect.
    pub fn binary() -> Self {
        Self {
            frame_style: FrameStyle::LengthPrefixed,
            checksum: ChecksumKind::Sum,
            echo: false,
            reply_timeout: BINARY_REPLY_TIMEOUT,
            idle_timeout: LINE_IDLE_TIMEOUT,
            retry_budget: LINE_RETRY_BUDGET,
            max_reply_len: MAX_LINE_REPLY,
            reset_pulse: Duration::from_millis(100),
        }
    }

    /// LPC2136 ISP line dialect.
    pub fn line(echo: bool) -> Self {
        Self {
            frame_style: FrameStyle::Line,
            checksum: ChecksumKind::Sum,
            echo,
            reply_timeout: LINE_REPLY_TIMEOUT,
            idle_timeout: LINE_IDLE_TIMEOUT,
            retry_budget: LINE_RETRY_BUDGET,
            max_reply_len: MAX_LINE_REPLY,
            reset_pulse: Duration::from_millis(100),
        }
    }

    /// Set the checksum algorithm.
    #[must_use]
    pub fn with_checksum(mut self, checksum: ChecksumKind) -> Self {
        self.checksum = checksum;
        self
    }

    /// Set the echo flag.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Set the reply timeout.
    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Set the stall timeout of the line reader.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the stall budget of the line reader.
    #[must_use]
    pub fn with_retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Set the reset pulse duration.
    #[must_use]
    pub fn with_reset_pulse(mut self, pulse: Duration) -> Self {
        self.reset_pulse = pulse;
        self
    }

    /// Worst case time a line reply may take before timing out.
    pub fn line_reply_bound(&self) -> Duration {
        self.reply_timeout + self.idle_timeout * self.retry_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let binary = Dialect::binary();
        assert_eq!(binary.frame_style, FrameStyle::LengthPrefixed);
        assert_eq!(binary.checksum, ChecksumKind::Sum);
        assert_eq!(binary.reply_timeout, Duration::from_millis(2500));

        let line = Dialect::line(true);
        assert_eq!(line.frame_style, FrameStyle::Line);
        assert!(line.echo);
        assert_eq!(line.reply_timeout, Duration::from_millis(2000));
        assert_eq!(line.retry_budget, 5);
        assert_eq!(line.max_reply_len, 255);
    }

    #[test]
    fn test_line_reply_bound() {
        let line = Dialect::line(false);
        assert_eq!(line.line_reply_bound(), Duration::from_millis(7000));
    }
}
