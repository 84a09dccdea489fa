//! Opaque TLS engine capability.
//!
//! The crypto itself lives in an external library; this layer only needs
//! record transform and handshake stepping over byte buffers.

use crate::buffer::Buffer;
use crate::error::StreamError;

/// Outcome of one handshake step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// The engine needs more peer bytes before it can progress.
    NeedData,
    /// The handshake finished; application records may now flow.
    Complete,
}

/// Per-connection TLS engine boundary.
///
/// Partial records are the engine's to handle: `unwrap` and
/// `handshake_step` consume only whole records from their input buffer and
/// leave trailing partial bytes unconsumed.
pub trait TlsEngine: Send {
    /// Whether the engine is still inside the handshake phase.
    fn is_handshaking(&self) -> bool;

    /// Consumes ciphertext records from `ciphertext`, appending decrypted
    /// bytes to `plaintext`.
    fn unwrap(&mut self, ciphertext: &mut Buffer, plaintext: &mut Buffer)
        -> Result<(), StreamError>;

    /// Consumes plaintext from `plaintext`, appending encrypted records to
    /// `ciphertext`.
    fn wrap(&mut self, plaintext: &mut Buffer, ciphertext: &mut Buffer)
        -> Result<(), StreamError>;

    /// Advances the handshake: consumes peer bytes from `incoming` and
    /// appends any bytes to send to `outgoing`.
    fn handshake_step(
        &mut self,
        incoming: &mut Buffer,
        outgoing: &mut Buffer,
    ) -> Result<HandshakeStatus, StreamError>;
}
