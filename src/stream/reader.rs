//! Conditional stream reader over a transport.
//!
//! [`TransportReader`] owns the accumulation buffer for one connection and
//! resolves `wait_for` requests through one of three strategies fixed at
//! construction. All strategies share a single merge-then-re-check routine:
//! newly received bytes are appended in arrival order, then the pending
//! condition is evaluated — never speculatively.

use super::{blocking::read_with_timeout, ReaderConfig, StreamMode, StreamReader};
use crate::buffer::Buffer;
use crate::condition::Condition;
use crate::error::StreamError;
use crate::tracing_compat::{debug, trace};
use crate::transport::{InterceptAction, RawRead, ReadEvent, ReadInterceptor, Transport};
use crate::wait::{CompletionCallback, WaitCell, WaitFuture};
use parking_lot::Mutex;
use std::any::Any;
use std::io;
use std::sync::Arc;

/// The single outstanding wait: condition plus its resolution cell.
struct PendingWait {
    condition: Box<dyn Condition>,
    cell: Arc<WaitCell>,
}

struct ReaderState {
    accumulation: Buffer,
    pending: Option<PendingWait>,
    closed: bool,
}

/// State shared between the reader and the transport's dispatch hook.
struct ReaderShared {
    state: Mutex<ReaderState>,
}

impl ReaderShared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ReaderState {
                accumulation: Buffer::default(),
                pending: None,
                closed: false,
            }),
        })
    }

    /// Merge newly received bytes, then re-check the pending condition.
    /// Returns true if the wait resolved. The shared routine behind every
    /// acquisition strategy and the external feed path.
    fn receive(&self, bytes: &[u8]) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        if state.accumulation.position() > 0 {
            state.accumulation.compact();
        }
        state.accumulation.append(bytes);
        trace!(bytes = bytes.len(), "merged into accumulation");
        Self::evaluate(&mut state)
    }

    /// Condition re-check; runs only after an append, never speculatively.
    fn evaluate(state: &mut ReaderState) -> bool {
        let satisfied = state
            .pending
            .as_ref()
            .is_some_and(|wait| wait.condition.check(&state.accumulation));
        if satisfied {
            if let Some(wait) = state.pending.take() {
                let available = state.accumulation.remaining();
                debug!(available, "wait resolved");
                wait.cell.resolve(Ok(available));
            }
        }
        satisfied
    }

    fn fail_pending(&self, err: StreamError) {
        let pending = self.state.lock().pending.take();
        if let Some(wait) = pending {
            debug!(error = %err, "wait failed");
            wait.cell.resolve(Err(err));
        }
    }

    /// Close the stream with a terminal error, failing any pending wait.
    fn close_with(&self, err: StreamError) {
        let pending = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.take()
        };
        if let Some(wait) = pending {
            wait.cell.resolve(Err(err));
        }
    }

    fn has_pending(&self) -> bool {
        self.state.lock().pending.is_some()
    }
}

/// What one opportunistic raw read produced.
enum Polled {
    Bytes(Buffer),
    Empty,
    Eof,
}

/// Everything a strategy needs to move bytes toward the pending wait.
struct StrategyIo<'a> {
    transport: &'a Arc<dyn Transport>,
    shared: &'a Arc<ReaderShared>,
    config: &'a ReaderConfig,
}

impl StrategyIo<'_> {
    /// One non-blocking raw read into a fresh buffer. A zero-byte read
    /// discards the attempt's buffer and reports `Empty`.
    fn poll_raw(&self) -> io::Result<Polled> {
        let mut buffer = Buffer::with_capacity(self.config.buffer_size);
        match self.transport.raw_read(buffer.spare_mut())? {
            RawRead::Data(0) | RawRead::NoData => Ok(Polled::Empty),
            RawRead::Data(n) => {
                buffer.fill(n);
                buffer.trim();
                Ok(Polled::Bytes(buffer))
            }
            RawRead::Eof => Ok(Polled::Eof),
        }
    }
}

/// Resolution strategy selected once at reader construction.
trait WaitStrategy: Send + Sync {
    /// Called with the pending wait installed; drives it toward resolution
    /// (or returns immediately for passive strategies).
    fn engage(&self, io: &StrategyIo<'_>);
}

/// Event-driven resolution: drain what already arrived, then arm a one-shot
/// transport hook that merges and re-checks on every data event.
struct EventDriven;

impl WaitStrategy for EventDriven {
    fn engage(&self, io: &StrategyIo<'_>) {
        loop {
            if !io.shared.has_pending() {
                return;
            }
            match io.poll_raw() {
                Ok(Polled::Bytes(buffer)) => {
                    if io.shared.receive(buffer.as_slice()) {
                        return;
                    }
                }
                Ok(Polled::Empty) => break,
                Ok(Polled::Eof) => {
                    io.shared.close_with(StreamError::eof());
                    return;
                }
                Err(err) => {
                    io.shared.fail_pending(StreamError::Io(err));
                    return;
                }
            }
        }

        let shared = Arc::clone(io.shared);
        let hook: ReadInterceptor = Box::new(move |event| match event {
            ReadEvent::Data(buffer) => {
                if buffer.is_empty() {
                    // Zero bytes is "no data yet": drop the buffer, keep waiting.
                    return InterceptAction::Incomplete;
                }
                if shared.receive(buffer.as_slice()) {
                    InterceptAction::Completed
                } else {
                    InterceptAction::Incomplete
                }
            }
            ReadEvent::Closed => {
                shared.close_with(StreamError::eof());
                InterceptAction::Completed
            }
            ReadEvent::Error(err) => {
                shared.fail_pending(StreamError::Io(err));
                InterceptAction::Completed
            }
        });

        if let Err(err) = io.transport.register_read_interceptor(hook) {
            // Nothing was registered; the wait must not dangle.
            io.shared.fail_pending(StreamError::Io(err));
        }
    }
}

/// Synchronous resolution: bounded-timeout reads on the calling thread
/// until the condition holds or the stream terminates.
struct BlockingWithTimeout;

impl WaitStrategy for BlockingWithTimeout {
    fn engage(&self, io: &StrategyIo<'_>) {
        while io.shared.has_pending() {
            match read_with_timeout(
                io.transport.as_ref(),
                io.config.buffer_size,
                io.config.read_timeout,
            ) {
                Ok(buffer) => {
                    io.shared.receive(buffer.as_slice());
                }
                Err(err) => {
                    // Timeout and I/O failures terminate the stream here;
                    // the original cause stays reachable via source().
                    io.shared.close_with(err.into_terminal());
                    return;
                }
            }
        }
    }
}

/// Passive resolution: the wait sits installed until an external producer
/// pushes bytes in. Never polls, never blocks.
struct ExternallyFed;

impl WaitStrategy for ExternallyFed {
    fn engage(&self, _io: &StrategyIo<'_>) {}
}

/// Conditional stream reader bound to one connection's transport.
pub struct TransportReader {
    transport: Arc<dyn Transport>,
    shared: Arc<ReaderShared>,
    strategy: Box<dyn WaitStrategy>,
    config: ReaderConfig,
}

impl TransportReader {
    /// Creates a reader with the strategy implied by `config.mode`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: ReaderConfig) -> Self {
        let strategy: Box<dyn WaitStrategy> = match config.mode {
            StreamMode::NonBlocking => Box::new(EventDriven),
            StreamMode::Blocking => Box::new(BlockingWithTimeout),
            StreamMode::Feeder => Box::new(ExternallyFed),
        };
        Self {
            transport,
            shared: ReaderShared::new(),
            strategy,
            config,
        }
    }

    /// `wait_for` usable through a shared reference; see
    /// [`StreamReader::wait_for`].
    pub fn wait_for_ref(
        &self,
        condition: Box<dyn Condition>,
        completion: Option<CompletionCallback>,
    ) -> WaitFuture {
        {
            let mut state = self.shared.state.lock();
            if state.pending.is_some() {
                drop(state);
                debug!("second wait rejected");
                return WaitFuture::ready(Err(StreamError::AlreadyWaiting), completion);
            }
            if state.closed {
                drop(state);
                return WaitFuture::ready(Err(StreamError::eof()), completion);
            }
            if condition.check(&state.accumulation) {
                let available = state.accumulation.remaining();
                drop(state);
                trace!(available, "condition already satisfied");
                return WaitFuture::ready(Ok(available), completion);
            }
            let (future, cell) = WaitFuture::pending(completion);
            state.pending = Some(PendingWait { condition, cell });
            drop(state);
            self.strategy.engage(&StrategyIo {
                transport: &self.transport,
                shared: &self.shared,
                config: &self.config,
            });
            future
        }
    }

    /// See [`StreamReader::push`].
    pub fn push_ref(&self, data: &Buffer) -> bool {
        self.shared.receive(data.as_slice())
    }

    /// See [`StreamReader::available`].
    #[must_use]
    pub fn available_ref(&self) -> usize {
        self.shared.state.lock().accumulation.remaining()
    }

    /// See [`StreamReader::close`].
    pub fn close_ref(&self) {
        self.shared.close_with(StreamError::eof());
    }

    /// See [`StreamReader::is_closed`].
    #[must_use]
    pub fn is_closed_ref(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl StreamReader for TransportReader {
    fn mode(&self) -> StreamMode {
        self.config.mode
    }

    fn available(&self) -> usize {
        self.available_ref()
    }

    fn is_closed(&self) -> bool {
        self.is_closed_ref()
    }

    fn wait_for(
        &mut self,
        condition: Box<dyn Condition>,
        completion: Option<CompletionCallback>,
    ) -> WaitFuture {
        self.wait_for_ref(condition, completion)
    }

    fn push(&mut self, data: Buffer) -> bool {
        self.push_ref(&data)
    }

    fn drain(&mut self) -> Buffer {
        std::mem::take(&mut self.shared.state.lock().accumulation)
    }

    fn read_into(&mut self, dst: &mut [u8]) -> usize {
        self.shared.state.lock().accumulation.read_into(dst)
    }

    fn close(&mut self) {
        self.close_ref();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
