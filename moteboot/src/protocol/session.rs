//! Boot loader session: one request/reply round trip per call.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::{
            Dialect, FrameStyle, Message, MessageKind, Reply, binary, hex_string,
            line::{self, LineReader, ReplyShape},
        },
    },
    log::{debug, trace, warn},
    std::{fmt, thread},
};

/// Flash address read by the binary handshake.
const HANDSHAKE_ADDRESS: u32 = 0x24;

/// Read length used by the binary handshake.
const HANDSHAKE_LEN: u16 = 0x20;

/// Where the session is within one request/reply exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeState {
    /// No exchange in flight.
    #[default]
    Idle,
    /// Writing a request.
    Sending,
    /// Request written, reading the reply.
    AwaitingReply,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Sending => write!(f, "sending"),
            Self::AwaitingReply => write!(f, "awaiting reply"),
        }
    }
}

/// A session over a borrowed port.
///
/// The session owns its [`Dialect`] and holds the port exclusively for its
/// lifetime, so one connection cannot be driven by two callers at once.
pub struct Session<'a, P: Port + ?Sized> {
    port: &'a mut P,
    dialect: Dialect,
    state: ExchangeState,
}

impl<'a, P: Port + ?Sized> Session<'a, P> {
    /// Create a session.
    pub fn new(port: &'a mut P, dialect: Dialect) -> Self {
        Self {
            port,
            dialect,
            state: ExchangeState::Idle,
        }
    }

    /// Dialect parameters.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Current exchange state.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// The underlying port.
    pub fn port(&mut self) -> &mut P {
        &mut *self.port
    }

    /// Encode and write a request.
    pub fn send_command(&mut self, message: &Message) -> Result<()> {
        let frame = match self.dialect.frame_style {
            FrameStyle::LengthPrefixed => binary::encode(message.bytes(), self.dialect.checksum)?,
            FrameStyle::Line => line::encode(message.bytes()),
        };
        trace!("-> {:?} {}", message.kind(), hex_string(&frame));

        self.state = ExchangeState::Sending;
        let written = self.port.write_all_bytes(&frame);
        self.state = match written {
            Ok(()) => ExchangeState::AwaitingReply,
            Err(_) => ExchangeState::Idle,
        };
        written
    }

    /// Read the binary reply to a request of `kind`.
    pub fn await_reply(&mut self, kind: MessageKind) -> Result<Reply> {
        let tag = kind.response_tag().ok_or_else(|| {
            Error::InvalidArgument(format!("{kind:?} has no binary reply"))
        })?;
        let reply = binary::read_reply(&mut *self.port, tag, &self.dialect);
        self.state = ExchangeState::Idle;
        reply
    }

    /// Send a binary request and read its reply.
    pub fn transact(&mut self, message: &Message) -> Result<Reply> {
        self.send_command(message)?;
        self.await_reply(message.kind())
    }

    /// Read a line reply of the given shape.
    pub fn await_lines(&mut self, shape: ReplyShape) -> Result<Vec<u8>> {
        let lines = shape.lines(self.dialect.echo);
        let reply = LineReader::new(&mut *self.port, &self.dialect).read(lines);
        self.state = ExchangeState::Idle;
        reply
    }

    /// Read a generic success reply, returning its data line.
    pub fn await_success(&mut self) -> Result<String> {
        let reply = self.await_lines(ReplyShape::Success)?;
        line::parse_success(&reply, self.dialect.echo)
    }

    /// Drop pending input.
    pub fn clear(&mut self) -> Result<()> {
        self.port.clear_buffers()
    }

    /// One connection attempt.
    ///
    /// Never fails: errors are logged and reported as `false`. Callers loop.
    pub fn handshake(&mut self) -> bool {
        match self.dialect.frame_style {
            FrameStyle::LengthPrefixed => self.read_handshake(),
            FrameStyle::Line => self.autobaud(),
        }
    }

    fn read_handshake(&mut self) -> bool {
        let result = self.transact(&Message::flash_read(HANDSHAKE_ADDRESS, HANDSHAKE_LEN));
        match result {
            Ok(_) => {
                debug!("Device connection established");
                return true;
            }
            Err(e) if e.is_timeout() => debug!("Still waiting for a connection"),
            Err(e) => warn!("Error while waiting for connection: {e}"),
        }
        if let Err(e) = self.clear() {
            warn!("Failed to clear port buffers: {e}");
        }
        false
    }

    fn autobaud(&mut self) -> bool {
        match self.try_autobaud() {
            Ok(()) => {
                debug!("Autobaud complete");
                true
            }
            Err(e) if e.is_timeout() => {
                debug!("Still waiting for a connection");
                false
            }
            Err(e) => {
                warn!("Autobaud failed: {e}");
                false
            }
        }
    }

    fn try_autobaud(&mut self) -> Result<()> {
        for message in [Message::auto_baud(), Message::auto_baud2()] {
            self.send_command(&message)?;
            let reply = self.await_lines(ReplyShape::Synchronized)?;
            if reply != line::SYNCHRONIZED && reply != line::SYNCHRONIZED_OK {
                return Err(unexpected_sync("Synchronized", &reply));
            }
        }

        self.send_command(&Message::auto_baud3())?;
        let reply = self.await_lines(ReplyShape::SynchronizedOk)?;
        if reply != line::SYNCHRONIZED_OK {
            return Err(unexpected_sync("Synchronized and OK", &reply));
        }
        Ok(())
    }

    /// Reset the device into its boot ROM and connect.
    ///
    /// DTR drives the boot select line and RTS the reset line. The handshake
    /// is retried up to `attempts` times.
    pub fn enter_program_mode(&mut self, attempts: u32) -> Result<()> {
        debug!("Entering program mode on {}", self.port.name());
        self.port.set_dtr(true)?;
        self.port.set_rts(true)?;
        self.pause();
        self.port.set_rts(false)?;
        self.pause();
        self.port.set_dtr(false)?;
        self.clear()?;

        for attempt in 1..=attempts.max(1) {
            if self.handshake() {
                return Ok(());
            }
            debug!("Handshake attempt {attempt}/{attempts} failed");
        }
        Err(Error::HandshakeFailed(format!(
            "no boot loader reply on {} after {attempts} attempts",
            self.port.name()
        )))
    }

    /// Reset the device into its application.
    pub fn leave_program_mode(&mut self) -> Result<()> {
        debug!("Leaving program mode on {}", self.port.name());
        self.port.set_dtr(false)?;
        self.port.set_rts(true)?;
        self.pause();
        self.port.set_rts(false)?;
        Ok(())
    }

    fn pause(&self) {
        if !self.dialect.reset_pulse.is_zero() {
            thread::sleep(self.dialect.reset_pulse);
        }
    }
}

fn unexpected_sync(expected: &'static str, reply: &[u8]) -> Error {
    Error::UnexpectedReply {
        expected,
        reply: String::from_utf8_lossy(reply).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::port::{ScriptedPort, script::ControlEvent},
        std::time::Duration,
    };

    fn binary_frame(payload: &[u8]) -> Vec<u8> {
        binary::encode(payload, crate::protocol::ChecksumKind::Sum).unwrap()
    }

    fn handshake_reply() -> Vec<u8> {
        let mut payload = vec![0x0C, 0x00];
        payload.extend_from_slice(&[0xFF; 0x20]);
        binary_frame(&payload)
    }

    #[test]
    fn test_send_command_frames_per_dialect() {
        let mut port = ScriptedPort::new();
        let mut session = Session::new(&mut port, Dialect::binary());
        session.send_command(&Message::flash_erase()).unwrap();
        assert_eq!(session.state(), ExchangeState::AwaitingReply);

        let mut line_port = ScriptedPort::new();
        let mut session = Session::new(&mut line_port, Dialect::line(true));
        session.send_command(&Message::unlock()).unwrap();

        assert_eq!(port.written(), &[vec![0x02, 0x07, 0x09]]);
        assert_eq!(line_port.written_text(), vec!["U 23130\r\n"]);
    }

    #[test]
    fn test_transact_returns_to_idle() {
        let mut port = ScriptedPort::new().reply(binary_frame(&[0x08, 0x00]));
        let mut session = Session::new(&mut port, Dialect::binary());
        let reply = session.transact(&Message::flash_erase()).unwrap();
        assert_eq!(reply.status(), 0);
        assert_eq!(session.state(), ExchangeState::Idle);
    }

    #[test]
    fn test_await_reply_rejects_line_kinds() {
        let mut port = ScriptedPort::new();
        let mut session = Session::new(&mut port, Dialect::binary());
        assert!(matches!(
            session.await_reply(MessageKind::Unlock),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_binary_handshake_is_idempotent() {
        let mut port = ScriptedPort::new()
            .reply(handshake_reply())
            .reply(handshake_reply())
            .reply(handshake_reply());
        let mut session = Session::new(&mut port, Dialect::binary());
        for _ in 0..3 {
            assert!(session.handshake());
        }
        assert_eq!(port.clear_count(), 0);
        assert_eq!(port.written().len(), 3);
        assert_eq!(port.written()[0][1], 0x0B);
    }

    #[test]
    fn test_binary_handshake_silent_device_returns_false() {
        let mut port = ScriptedPort::new();
        let mut session = Session::new(&mut port, Dialect::binary());
        for _ in 0..3 {
            assert!(!session.handshake());
        }
        assert_eq!(port.clear_count(), 3);
    }

    #[test]
    fn test_binary_handshake_garbage_returns_false() {
        let mut port = ScriptedPort::new().reply([0x03, 0x0C, 0x00, 0x00]);
        let mut session = Session::new(&mut port, Dialect::binary());
        assert!(!session.handshake());
        assert_eq!(port.clear_count(), 1);
    }

    #[test]
    fn test_autobaud_succeeds() {
        let mut port = ScriptedPort::new()
            .reply(b"Synchronized\r\n")
            .reply(b"Synchronized\r\n")
            .reply(b"Synchronized\r\nOK\r\n");
        let mut session = Session::new(&mut port, Dialect::line(true));
        assert!(session.handshake());
        assert_eq!(
            port.written_text(),
            vec!["?\r\n", "Synchronized\r\n", "12000\r\n"]
        );
    }

    #[test]
    fn test_autobaud_without_ok_returns_false() {
        let mut port = ScriptedPort::new()
            .reply(b"Synchronized\r\n")
            .reply(b"Synchronized\r\n")
            .reply(b"Synchronized\r\n");
        let mut session = Session::new(&mut port, Dialect::line(true));
        assert!(!session.handshake());
    }

    #[test]
    fn test_autobaud_mismatch_stops_early() {
        let mut port = ScriptedPort::new().reply(b"?\r\n");
        let mut session = Session::new(&mut port, Dialect::line(true));
        assert!(!session.handshake());
        assert_eq!(port.written().len(), 1);
    }

    #[test]
    fn test_autobaud_silent_device_returns_false_repeatedly() {
        let mut port = ScriptedPort::new();
        let mut session = Session::new(&mut port, Dialect::line(false));
        assert!(!session.handshake());
        assert!(!session.handshake());
    }

    #[test]
    fn test_program_mode_bracket() {
        let mut port = ScriptedPort::new().silent().reply(handshake_reply());
        let dialect = Dialect::binary().with_reset_pulse(Duration::ZERO);
        let mut session = Session::new(&mut port, dialect);
        session.enter_program_mode(3).unwrap();
        session.leave_program_mode().unwrap();

        assert_eq!(port.written().len(), 2);
        assert_eq!(
            port.control_events(),
            &[
                ControlEvent::Dtr(true),
                ControlEvent::Rts(true),
                ControlEvent::Rts(false),
                ControlEvent::Dtr(false),
                ControlEvent::Dtr(false),
                ControlEvent::Rts(true),
                ControlEvent::Rts(false),
            ]
        );
    }

    #[test]
    fn test_program_mode_gives_up_after_attempts() {
        let mut port = ScriptedPort::new();
        let dialect = Dialect::binary().with_reset_pulse(Duration::ZERO);
        let mut session = Session::new(&mut port, dialect);
        let err = session.enter_program_mode(2).unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed(_)));
        assert_eq!(port.written().len(), 2);
    }
}
