//! Handshake coordinator.
//!
//! Drives the engine's handshake over a wrapped reader/writer pair,
//! mode-appropriately: over a blocking parent the calling thread suspends
//! inside `await_ciphertext`; over an event-driven parent an unresolved wait
//! surfaces as [`HandshakeProgress::InProgress`] so the filter step can
//! yield and resume on the next event, with accumulated state intact.

use super::stream::{CiphertextWait, TlsStreamReader, TlsStreamWriter};
use crate::buffer::Buffer;
use crate::error::StreamError;
use crate::stream::StreamWriter;
use crate::tls::engine::HandshakeStatus;
use crate::tracing_compat::{debug, trace};

/// Where the handshake stands after one coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeProgress {
    /// More peer data is required; resume on the next read event.
    InProgress,
    /// The handshake completed; application records may flow.
    Established,
}

/// Drives handshake message exchange to completion or suspension.
pub struct Handshaker;

impl Handshaker {
    /// Steps the engine until it leaves the handshake phase, flushing
    /// outgoing handshake bytes after every step. Engine-reported failures
    /// propagate; they are never converted to a silent stop.
    pub fn drive(
        reader: &mut TlsStreamReader,
        writer: &mut TlsStreamWriter,
    ) -> Result<HandshakeProgress, StreamError> {
        let engine = reader.engine_handle();
        loop {
            let mut outgoing = Buffer::default();
            let status = engine
                .lock()
                .handshake_step(reader.ciphertext_mut(), &mut outgoing)?;
            if !outgoing.is_empty() {
                trace!(bytes = outgoing.remaining(), "handshake bytes out");
                writer.write_raw(&mut outgoing)?;
                writer.flush()?;
            }
            match status {
                HandshakeStatus::Complete => {
                    debug!("handshake established");
                    return Ok(HandshakeProgress::Established);
                }
                HandshakeStatus::NeedData => match reader.await_ciphertext()? {
                    CiphertextWait::More => {}
                    CiphertextWait::Pending => {
                        trace!("handshake suspended until next event");
                        return Ok(HandshakeProgress::InProgress);
                    }
                },
            }
        }
    }
}
