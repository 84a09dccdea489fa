//! Transport collaborator seam.
//!
//! The stream core does not own sockets or readiness multiplexing; it
//! consumes a narrow [`Transport`] interface. A `Transport` value is bound
//! to exactly one connection — identity travels separately as a
//! [`ConnectionId`] so the filter chain can key per-connection state.

pub mod mock;

use crate::buffer::Buffer;
use std::io;
use std::time::Duration;

/// Identity of the connection a transport is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Outcome of one non-blocking raw read.
#[derive(Debug)]
pub enum RawRead {
    /// `n > 0` bytes were written into the caller's buffer.
    Data(usize),
    /// No bytes available right now. Not an error.
    NoData,
    /// The peer closed the stream.
    Eof,
}

/// Event delivered to a registered read interceptor.
#[derive(Debug)]
pub enum ReadEvent {
    /// Newly received bytes. May be empty, which counts as "no data yet".
    Data(Buffer),
    /// The peer closed the stream.
    Closed,
    /// The dispatch mechanism failed before delivering data.
    Error(io::Error),
}

/// Interceptor verdict: `Incomplete` re-arms the hook for the next event,
/// `Completed` drops the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptAction {
    /// The wait resolved; no further events are wanted.
    Completed,
    /// More data is needed; keep the hook armed.
    Incomplete,
}

/// One-shot-per-registration read event hook.
///
/// Runs on whatever thread the transport's event dispatch uses and must not
/// block.
pub type ReadInterceptor = Box<dyn FnMut(ReadEvent) -> InterceptAction + Send>;

/// Narrow interface onto the underlying socket transport and its readiness
/// multiplexer.
pub trait Transport: Send + Sync {
    /// Non-blocking read into `buf`. Must not fail for "no data now".
    fn raw_read(&self, buf: &mut [u8]) -> io::Result<RawRead>;

    /// Registers a read interceptor invoked when new data lands, the peer
    /// closes, or dispatch fails. At most one interceptor is armed at a
    /// time; an `Err` here means nothing was registered.
    fn register_read_interceptor(&self, hook: ReadInterceptor) -> io::Result<()>;

    /// Blocking read with an explicit budget; suspends the calling thread.
    /// Returns `Ok(0)` on EOF and `ErrorKind::TimedOut` when the budget is
    /// exhausted.
    fn blocking_read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;

    /// Writes bytes to the peer, returning how many were accepted.
    fn raw_write(&self, buf: &[u8]) -> io::Result<usize>;
}
