//! Plain write-through stream writer.

use super::StreamWriter;
use crate::buffer::Buffer;
use crate::error::{EofCause, StreamError};
use crate::tracing_compat::trace;
use crate::transport::Transport;
use std::any::Any;
use std::io;
use std::sync::Arc;

/// Writer that pushes buffers straight through the transport.
pub struct TransportWriter {
    transport: Arc<dyn Transport>,
}

impl TransportWriter {
    /// Creates a writer over the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl StreamWriter for TransportWriter {
    fn write(&mut self, data: &mut Buffer) -> Result<(), StreamError> {
        while !data.is_empty() {
            match self.transport.raw_write(data.as_slice()) {
                Ok(0) => return Err(StreamError::eof()),
                Ok(n) => {
                    trace!(bytes = n, "raw write");
                    data.consume(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(StreamError::eof_with(EofCause::Io(err))),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StreamError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}
