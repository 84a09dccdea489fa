//! Filter chain seam: per-event context and a minimal chain driver.
//!
//! The driver's one hard guarantee is symmetry: `post_read` runs, in reverse
//! order, for every filter whose `handle_read` ran — on success, stop, and
//! error paths alike. Filters that substitute the context's reader/writer
//! (the TLS transform does) rely on that unwind to restore the originals.

use crate::buffer::Buffer;
use crate::error::StreamError;
use crate::stream::{StreamReader, StreamWriter};
use crate::tracing_compat::{debug, trace};
use crate::transport::ConnectionId;
use std::sync::Arc;

/// Verdict of one filter step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Proceed to the next filter.
    Continue,
    /// Stop processing this event; the dispatcher will re-invoke on the
    /// next one.
    Stop,
    /// Jump to the filter at this index next. Each filter may be entered
    /// at most once per event; a cyclic jump fails the event.
    Invoke(usize),
}

/// Per-event mutable record carrying the active reader/writer pair and the
/// in-flight message.
///
/// Reader and writer live in `Option` slots so a filter can take them out,
/// wrap them, and put the wrappers (and later the originals) back.
pub struct FilterChainContext {
    connection: ConnectionId,
    reader: Option<Box<dyn StreamReader>>,
    writer: Option<Box<dyn StreamWriter>>,
    message: Option<Buffer>,
}

impl FilterChainContext {
    /// Context for one event on `connection`.
    #[must_use]
    pub fn new(
        connection: ConnectionId,
        reader: Box<dyn StreamReader>,
        writer: Box<dyn StreamWriter>,
    ) -> Self {
        Self {
            connection,
            reader: Some(reader),
            writer: Some(writer),
            message: None,
        }
    }

    /// The connection this event belongs to.
    #[must_use]
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Takes the active reader out of the context.
    pub fn take_reader(&mut self) -> Option<Box<dyn StreamReader>> {
        self.reader.take()
    }

    /// Installs `reader` as the active reader.
    pub fn set_reader(&mut self, reader: Box<dyn StreamReader>) {
        self.reader = Some(reader);
    }

    /// The active reader, if one is installed.
    pub fn reader_mut(&mut self) -> Option<&mut (dyn StreamReader + 'static)> {
        self.reader.as_deref_mut()
    }

    /// Takes the active writer out of the context.
    pub fn take_writer(&mut self) -> Option<Box<dyn StreamWriter>> {
        self.writer.take()
    }

    /// Installs `writer` as the active writer.
    pub fn set_writer(&mut self, writer: Box<dyn StreamWriter>) {
        self.writer = Some(writer);
    }

    /// The in-flight message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&Buffer> {
        self.message.as_ref()
    }

    /// Takes the in-flight message out of the context.
    pub fn take_message(&mut self) -> Option<Buffer> {
        self.message.take()
    }

    /// Sets the in-flight message.
    pub fn set_message(&mut self, message: Buffer) {
        self.message = Some(message);
    }
}

/// One stage of the I/O pipeline. All steps default to pass-through.
pub trait Filter: Send + Sync {
    /// Read-entry step.
    fn handle_read(&self, _ctx: &mut FilterChainContext) -> Result<NextAction, StreamError> {
        Ok(NextAction::Continue)
    }

    /// Read-exit step; runs for every filter whose `handle_read` ran,
    /// including on stop and error paths.
    fn post_read(&self, _ctx: &mut FilterChainContext) -> Result<(), StreamError> {
        Ok(())
    }

    /// Write step.
    fn handle_write(&self, _ctx: &mut FilterChainContext) -> Result<NextAction, StreamError> {
        Ok(NextAction::Continue)
    }

    /// Write-exit step, symmetric to [`post_read`](Self::post_read).
    fn post_write(&self, _ctx: &mut FilterChainContext) -> Result<(), StreamError> {
        Ok(())
    }

    /// Connection-close notification.
    fn post_close(&self, _ctx: &mut FilterChainContext) -> Result<(), StreamError> {
        Ok(())
    }
}

/// Ordered filter pipeline with a symmetric entry/exit driver.
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    /// Chain over the given filters, invoked in order on read events.
    #[must_use]
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Drives one read event through the chain.
    ///
    /// Every filter whose `handle_read` ran gets its `post_read` called in
    /// reverse order before this returns, regardless of how the entry pass
    /// ended. The first error wins; later unwind errors are logged and
    /// dropped.
    pub fn read_event(&self, ctx: &mut FilterChainContext) -> Result<NextAction, StreamError> {
        let mut entered: Vec<usize> = Vec::new();
        let mut verdict: Result<NextAction, StreamError> = Ok(NextAction::Continue);
        let mut index = 0;
        while index < self.filters.len() {
            entered.push(index);
            match self.filters[index].handle_read(ctx) {
                Ok(NextAction::Continue) => index += 1,
                Ok(NextAction::Stop) => {
                    trace!(index, "read event stopped");
                    verdict = Ok(NextAction::Stop);
                    break;
                }
                Ok(NextAction::Invoke(next)) => {
                    // Each filter runs at most once per event; a jump back
                    // into an entered filter would loop forever.
                    if entered.contains(&next) {
                        debug!(index, next, "cyclic invoke rejected");
                        verdict = Err(StreamError::InvalidState("cyclic filter invoke"));
                        break;
                    }
                    index = next;
                }
                Err(err) => {
                    debug!(index, error = %err, "read step failed");
                    verdict = Err(err);
                    break;
                }
            }
        }
        for &i in entered.iter().rev() {
            if let Err(err) = self.filters[i].post_read(ctx) {
                if verdict.is_ok() {
                    verdict = Err(err);
                } else {
                    debug!(index = i, error = %err, "unwind error dropped");
                }
            }
        }
        verdict
    }

    /// Drives one write event through the chain, with the same symmetric
    /// unwind as [`read_event`](Self::read_event).
    pub fn write_event(&self, ctx: &mut FilterChainContext) -> Result<NextAction, StreamError> {
        let mut entered: Vec<usize> = Vec::new();
        let mut verdict: Result<NextAction, StreamError> = Ok(NextAction::Continue);
        let mut index = 0;
        while index < self.filters.len() {
            entered.push(index);
            match self.filters[index].handle_write(ctx) {
                Ok(NextAction::Continue) => index += 1,
                Ok(NextAction::Stop) => {
                    verdict = Ok(NextAction::Stop);
                    break;
                }
                Ok(NextAction::Invoke(next)) => {
                    if entered.contains(&next) {
                        verdict = Err(StreamError::InvalidState("cyclic filter invoke"));
                        break;
                    }
                    index = next;
                }
                Err(err) => {
                    verdict = Err(err);
                    break;
                }
            }
        }
        for &i in entered.iter().rev() {
            if let Err(err) = self.filters[i].post_write(ctx) {
                if verdict.is_ok() {
                    verdict = Err(err);
                }
            }
        }
        verdict
    }

    /// Notifies every filter, in order, that the connection closed.
    /// All filters are notified even if one fails; the first error wins.
    pub fn close_event(&self, ctx: &mut FilterChainContext) -> Result<(), StreamError> {
        let mut verdict = Ok(());
        for filter in &self.filters {
            if let Err(err) = filter.post_close(ctx) {
                if verdict.is_ok() {
                    verdict = Err(err);
                }
            }
        }
        verdict
    }
}
