//! Composed operations, progress reporting and cooperative cancellation.
//!
//! An [`Operation`] is a short sequence of session calls. It reports progress
//! through a [`Monitor`] and polls [`Monitor::checkpoint`] between protocol
//! steps, never during an I/O wait. Once a checkpoint observes a cancel
//! request the operation sends nothing further and returns
//! [`Error::Canceled`].
//!
//! ```rust,no_run
//! use moteboot::operation::{CancelToken, Monitor};
//! use moteboot::port::Port;
//! use moteboot::target::jennic::{EraseFlash, JennicSession};
//!
//! fn erase<P: Port>(port: &mut P, cancel: CancelToken) -> moteboot::Result<()> {
//!     let mut session = JennicSession::new(port);
//!     let mut monitor = Monitor::new(cancel).with_progress(|p| println!("{:.0}%", p * 100.0));
//!     monitor.run(&mut EraseFlash::all(), &mut session)
//! }
//! ```

use {
    crate::error::{Error, Result},
    log::{debug, warn},
    std::{
        fmt,
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
    },
};

/// Shared, externally settable cancel flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not canceled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle of one composed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    /// Not started.
    #[default]
    Idle,
    /// Exchanging commands with the device.
    Running,
    /// Completed.
    Success,
    /// Terminated by an error.
    Failed,
    /// Stopped at a checkpoint.
    Canceled,
}

impl OperationState {
    /// Whether the state is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

/// A multi-step flow over a session of type `S`.
pub trait Operation<S: ?Sized> {
    /// Result of a successful run.
    type Output;

    /// Run the steps. Progress fractions are relative to this operation.
    fn execute(&mut self, session: &mut S, monitor: &mut Monitor<'_>) -> Result<Self::Output>;
}

/// Progress sink and cancellation state of a running operation.
pub struct Monitor<'a> {
    sink: Option<Box<dyn FnMut(f32) + 'a>>,
    cancel: CancelToken,
    state: OperationState,
    last: Option<f32>,
    window: (f32, f32),
}

impl<'a> Monitor<'a> {
    /// Create a monitor without a progress sink.
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            sink: None,
            cancel,
            state: OperationState::Idle,
            last: None,
            window: (0.0, 1.0),
        }
    }

    /// Deliver progress to `sink`.
    #[must_use]
    pub fn with_progress(mut self, sink: impl FnMut(f32) + 'a) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Current state.
    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Whether cancellation was requested.
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Report progress in `[0, 1]` relative to the current operation.
    ///
    /// Values are clamped and mapped into the active window. Values that
    /// would move progress backwards are dropped, as is everything after a
    /// terminal state.
    pub fn progress(&mut self, fraction: f32) {
        if self.state.is_terminal() {
            return;
        }
        let (start, end) = self.window;
        let value = start + fraction.clamp(0.0, 1.0) * (end - start);
        if self.last.is_some_and(|last| value <= last) {
            return;
        }
        self.last = Some(value);
        if let Some(sink) = self.sink.as_mut() {
            sink(value);
        }
    }

    /// Cancellation point between two protocol steps.
    pub fn checkpoint(&mut self) -> Result<()> {
        if self.cancel.is_canceled() {
            debug!("Cancellation requested");
            self.state = OperationState::Canceled;
            return Err(Error::Canceled);
        }
        Ok(())
    }

    /// Run a nested step whose progress covers `start..end` of the current
    /// window.
    pub fn scoped<T>(
        &mut self,
        start: f32,
        end: f32,
        step: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let outer = self.window;
        let span = outer.1 - outer.0;
        self.window = (
            outer.0 + start.clamp(0.0, 1.0) * span,
            outer.0 + end.clamp(0.0, 1.0) * span,
        );
        let result = step(self);
        self.window = outer;
        result
    }

    /// Run `op` to a terminal state.
    ///
    /// Progress reaches 1.0 on success. [`Error::Canceled`] ends in
    /// [`OperationState::Canceled`], any other error in
    /// [`OperationState::Failed`].
    pub fn run<S: ?Sized, O: Operation<S>>(
        &mut self,
        op: &mut O,
        session: &mut S,
    ) -> Result<O::Output> {
        self.checkpoint()?;
        self.state = OperationState::Running;

        match op.execute(session, self) {
            Ok(output) => {
                self.progress(1.0);
                self.state = OperationState::Success;
                Ok(output)
            }
            Err(Error::Canceled) => {
                self.state = OperationState::Canceled;
                Err(Error::Canceled)
            }
            Err(e) => {
                self.state = OperationState::Failed;
                Err(e)
            }
        }
    }
}

/// `done` out of `total` as a progress fraction. An empty range is complete.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn fraction(done: usize, total: usize) -> f32 {
    if total == 0 { 1.0 } else { done as f32 / total as f32 }
}

/// Sessions that can reset a device into and out of its boot ROM.
pub trait ProgramControl {
    /// Reset into the boot loader and connect.
    fn enter_program_mode(&mut self, attempts: u32) -> Result<()>;

    /// Reset into the application.
    fn leave_program_mode(&mut self) -> Result<()>;
}

/// Runs an operation inside a program mode bracket.
///
/// The bracket is always closed, also after an error or a cancellation. An
/// error of the inner operation wins over one from leaving program mode.
pub struct ProgramMode<O> {
    inner: O,
    attempts: u32,
}

impl<O> ProgramMode<O> {
    /// Wrap `inner`, trying the handshake up to `attempts` times.
    pub fn new(inner: O, attempts: u32) -> Self {
        Self { inner, attempts }
    }
}

impl<S, O> Operation<S> for ProgramMode<O>
where
    S: ProgramControl + ?Sized,
    O: Operation<S>,
{
    type Output = O::Output;

    fn execute(&mut self, session: &mut S, monitor: &mut Monitor<'_>) -> Result<Self::Output> {
        session.enter_program_mode(self.attempts)?;

        let result = monitor
            .checkpoint()
            .and_then(|()| self.inner.execute(session, monitor));
        let left = session.leave_program_mode();

        match (result, left) {
            (Ok(output), Ok(())) => Ok(output),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(leave)) => {
                warn!("Failed to leave program mode: {leave}");
                Err(e)
            }
        }
    }
}
