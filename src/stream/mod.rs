//! Stream reader/writer seams and the conditional read engine.
//!
//! [`StreamReader`] is the surface higher layers program against: a buffer
//! of received-but-unconsumed bytes plus `wait_for`, which resolves once a
//! [`Condition`](crate::condition::Condition) over that buffer holds. How
//! the bytes arrive is fixed per reader at construction by [`StreamMode`]:
//! event-driven non-blocking, blocking with a per-read timeout, or
//! externally fed.

mod blocking;
mod reader;
mod writer;

pub use blocking::read_with_timeout;
pub use reader::TransportReader;
pub use writer::TransportWriter;

use crate::buffer::Buffer;
use crate::condition::Condition;
use crate::error::StreamError;
use crate::wait::{CompletionCallback, WaitFuture};
use std::any::Any;
use std::time::Duration;

/// How a reader acquires bytes. Fixed for the reader's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Event-driven: a one-shot transport hook feeds the reader.
    NonBlocking,
    /// Synchronous loop of bounded-timeout reads on the calling thread.
    Blocking,
    /// Purely passive: an external producer pushes bytes in.
    Feeder,
}

/// Reader configuration derived from the owning connection.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Acquisition mode.
    pub mode: StreamMode,
    /// Size of each raw-read buffer.
    pub buffer_size: usize,
    /// Budget for one blocking raw read.
    pub read_timeout: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: StreamMode::NonBlocking,
            buffer_size: 8192,
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl ReaderConfig {
    /// Config with the given mode and default sizing.
    #[must_use]
    pub fn new(mode: StreamMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Sets the raw-read buffer size.
    #[must_use]
    pub const fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Sets the per-read blocking budget.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Stream of received-but-unconsumed bytes with conditional waits.
pub trait StreamReader: Send {
    /// The reader's acquisition mode.
    fn mode(&self) -> StreamMode;

    /// Unconsumed byte count. Always a pure function of buffer state.
    fn available(&self) -> usize;

    /// Whether the stream has been closed.
    fn is_closed(&self) -> bool;

    /// Resolves once `condition` holds over the buffered data.
    ///
    /// At most one wait may be outstanding; a second request fails with
    /// [`StreamError::AlreadyWaiting`]. On an already-closed stream the
    /// returned future is immediately failed with
    /// [`StreamError::EndOfStream`]. If the condition already holds, the
    /// future resolves immediately with the available byte count and no
    /// I/O is performed.
    fn wait_for(
        &mut self,
        condition: Box<dyn Condition>,
        completion: Option<CompletionCallback>,
    ) -> WaitFuture;

    /// Externally feeds bytes into the accumulation buffer and re-checks
    /// any pending wait. Returns true only when a pending wait resolved as
    /// a result; feeding a reader with no wait outstanding returns false.
    fn push(&mut self, data: Buffer) -> bool;

    /// Takes the entire unconsumed accumulation, leaving the reader empty.
    fn drain(&mut self) -> Buffer;

    /// Copies unconsumed bytes into `dst`, consuming what was copied.
    fn read_into(&mut self, dst: &mut [u8]) -> usize;

    /// Closes the stream, failing any pending wait with end-of-stream.
    fn close(&mut self);

    /// Type-recovery escape hatch for wrapper readers.
    fn as_any(&self) -> &dyn Any;

    /// By-value counterpart of [`as_any`](Self::as_any).
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// Outbound counterpart of [`StreamReader`].
pub trait StreamWriter: Send {
    /// Writes all unconsumed bytes of `data` through the underlying sink.
    fn write(&mut self, data: &mut Buffer) -> Result<(), StreamError>;

    /// Flushes the underlying sink.
    fn flush(&mut self) -> Result<(), StreamError>;

    /// Type-recovery escape hatch for wrapper writers.
    fn as_any(&self) -> &dyn Any;

    /// By-value counterpart of [`as_any`](Self::as_any).
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}
