//! Wrapper reader/writer pair that transform records at the stream seam.
//!
//! [`TlsStreamReader`] sits in front of a parent [`StreamReader`]: it pulls
//! ciphertext out of the parent, feeds it through the engine, and exposes
//! only plaintext. Leftover partial records stay in the wrapper's ciphertext
//! buffer across pulls and are prepended to the next one. [`TlsStreamWriter`]
//! is the outbound mirror: plaintext in, encrypted records out through the
//! parent writer.

use super::engine::TlsEngine;
use crate::buffer::Buffer;
use crate::condition::{min_available, Condition};
use crate::error::StreamError;
use crate::stream::{StreamMode, StreamReader, StreamWriter};
use crate::tracing_compat::trace;
use crate::wait::{CompletionCallback, WaitCell, WaitFuture};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Shared handle to one connection's engine.
pub type EngineHandle = Arc<Mutex<Box<dyn TlsEngine>>>;

/// Outcome of waiting for more ciphertext from the parent stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiphertextWait {
    /// New ciphertext was pulled into the wrapper's buffer.
    More,
    /// The parent's wait is still pending; control must return to the
    /// dispatcher.
    Pending,
}

struct PendingWait {
    condition: Box<dyn Condition>,
    cell: Arc<WaitCell>,
}

/// Decrypt-on-read wrapper over a parent stream reader.
pub struct TlsStreamReader {
    parent: Box<dyn StreamReader>,
    engine: EngineHandle,
    ciphertext: Buffer,
    plaintext: Buffer,
    pending: Option<PendingWait>,
}

impl TlsStreamReader {
    /// Wraps `parent`, seeding the transform buffers with leftovers from a
    /// previous wrapping of the same connection.
    #[must_use]
    pub fn new(
        parent: Box<dyn StreamReader>,
        engine: EngineHandle,
        cipher_leftover: Buffer,
        plain_leftover: Buffer,
    ) -> Self {
        Self {
            parent,
            engine,
            ciphertext: cipher_leftover,
            plaintext: plain_leftover,
            pending: None,
        }
    }

    pub(crate) fn engine_handle(&self) -> EngineHandle {
        Arc::clone(&self.engine)
    }

    pub(crate) fn ciphertext_mut(&mut self) -> &mut Buffer {
        &mut self.ciphertext
    }

    /// Drains the parent's accumulation into the ciphertext buffer and, once
    /// the handshake is over, decrypts whole records into plaintext.
    ///
    /// Mid-handshake the ciphertext is left untouched for the coordinator.
    pub fn pull(&mut self) -> Result<(), StreamError> {
        let arrived = self.parent.drain();
        if !arrived.is_empty() {
            trace!(bytes = arrived.remaining(), "pulled ciphertext");
            self.ciphertext.append(arrived.as_slice());
        }
        self.decrypt()?;
        self.evaluate();
        Ok(())
    }

    fn decrypt(&mut self) -> Result<(), StreamError> {
        let mut engine = self.engine.lock();
        if engine.is_handshaking() {
            return Ok(());
        }
        engine.unwrap(&mut self.ciphertext, &mut self.plaintext)
    }

    /// Waits for at least one more ciphertext byte from the parent.
    ///
    /// With a blocking parent this suspends the calling thread; with an
    /// event-driven parent a still-unresolved wait yields
    /// [`CiphertextWait::Pending`] and the caller must return control to the
    /// dispatcher.
    pub fn await_ciphertext(&mut self) -> Result<CiphertextWait, StreamError> {
        if self.parent.available() > 0 {
            let arrived = self.parent.drain();
            self.ciphertext.append(arrived.as_slice());
            return Ok(CiphertextWait::More);
        }
        let future = self.parent.wait_for(min_available(1), None);
        if !future.is_done() {
            return Ok(CiphertextWait::Pending);
        }
        match future.try_take() {
            Some(Ok(_)) => {
                let arrived = self.parent.drain();
                self.ciphertext.append(arrived.as_slice());
                Ok(CiphertextWait::More)
            }
            Some(Err(err)) => Err(err),
            None => Err(StreamError::InvalidState("wait outcome already taken")),
        }
    }

    fn evaluate(&mut self) {
        let satisfied = self
            .pending
            .as_ref()
            .is_some_and(|wait| wait.condition.check(&self.plaintext));
        if satisfied {
            if let Some(wait) = self.pending.take() {
                wait.cell.resolve(Ok(self.plaintext.remaining()));
            }
        }
    }

    fn fail_pending(&mut self, err: StreamError) {
        if let Some(wait) = self.pending.take() {
            wait.cell.resolve(Err(err));
        }
    }

    /// Consumes buffered ciphertext toward the pending wait; blocking
    /// parents keep reading until resolution or failure.
    fn drive(&mut self) -> Result<(), StreamError> {
        loop {
            self.pull()?;
            if self.pending.is_none() {
                return Ok(());
            }
            if self.parent.mode() != StreamMode::Blocking {
                return Ok(());
            }
            match self.await_ciphertext()? {
                CiphertextWait::More => {}
                CiphertextWait::Pending => return Ok(()),
            }
        }
    }

    /// Dismantles the wrapper: parent reader plus ciphertext and plaintext
    /// leftovers, in that order. A wait still pending at this point is
    /// failed; waits do not survive detachment.
    #[must_use]
    pub fn detach(mut self) -> (Box<dyn StreamReader>, Buffer, Buffer) {
        self.fail_pending(StreamError::InvalidState("reader detached"));
        (self.parent, self.ciphertext, self.plaintext)
    }
}

impl StreamReader for TlsStreamReader {
    fn mode(&self) -> StreamMode {
        self.parent.mode()
    }

    fn available(&self) -> usize {
        self.plaintext.remaining()
    }

    fn is_closed(&self) -> bool {
        self.parent.is_closed()
    }

    fn wait_for(
        &mut self,
        condition: Box<dyn Condition>,
        completion: Option<CompletionCallback>,
    ) -> WaitFuture {
        if self.pending.is_some() {
            return WaitFuture::ready(Err(StreamError::AlreadyWaiting), completion);
        }
        if self.parent.is_closed() && self.plaintext.is_empty() {
            return WaitFuture::ready(Err(StreamError::eof()), completion);
        }
        if condition.check(&self.plaintext) {
            let available = self.plaintext.remaining();
            return WaitFuture::ready(Ok(available), completion);
        }
        let (future, cell) = WaitFuture::pending(completion);
        self.pending = Some(PendingWait { condition, cell });
        if let Err(err) = self.drive() {
            self.fail_pending(err);
        }
        future
    }

    /// Feeds ciphertext in from a layered producer, decrypting immediately
    /// once the handshake is over.
    fn push(&mut self, data: Buffer) -> bool {
        self.ciphertext.append(data.as_slice());
        if let Err(err) = self.decrypt() {
            self.fail_pending(err);
            return false;
        }
        let had_pending = self.pending.is_some();
        self.evaluate();
        had_pending && self.pending.is_none()
    }

    fn drain(&mut self) -> Buffer {
        std::mem::take(&mut self.plaintext)
    }

    fn read_into(&mut self, dst: &mut [u8]) -> usize {
        self.plaintext.read_into(dst)
    }

    fn close(&mut self) {
        self.fail_pending(StreamError::eof());
        self.parent.close();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// Encrypt-on-write wrapper over a parent stream writer.
pub struct TlsStreamWriter {
    parent: Box<dyn StreamWriter>,
    engine: EngineHandle,
}

impl TlsStreamWriter {
    /// Wraps `parent` with the connection's engine.
    #[must_use]
    pub fn new(parent: Box<dyn StreamWriter>, engine: EngineHandle) -> Self {
        Self { parent, engine }
    }

    /// Writes already-encrypted bytes (handshake records) straight through.
    pub fn write_raw(&mut self, data: &mut Buffer) -> Result<(), StreamError> {
        self.parent.write(data)
    }

    /// Returns the parent writer.
    #[must_use]
    pub fn detach(self) -> Box<dyn StreamWriter> {
        self.parent
    }
}

impl StreamWriter for TlsStreamWriter {
    fn write(&mut self, data: &mut Buffer) -> Result<(), StreamError> {
        let mut records = Buffer::default();
        self.engine.lock().wrap(data, &mut records)?;
        self.parent.write(&mut records)
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        self.parent.flush()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
