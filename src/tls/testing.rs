//! Reference engine for exercising the transform layer.
//!
//! Toy protocol: the handshake expects the greeting `HELLO\n` and answers
//! `WELCOME\n`. Application records are length-prefixed XOR-obfuscated
//! frames, small enough to force partial-record handling in tests.

use super::engine::{HandshakeStatus, TlsEngine};
use crate::buffer::Buffer;
use crate::error::StreamError;

const GREETING: &[u8] = b"HELLO\n";
const REPLY: &[u8] = b"WELCOME\n";
const MASK: u8 = 0x5A;

pub struct MockEngine {
    handshaking: bool,
}

impl MockEngine {
    pub fn new(handshaking: bool) -> Self {
        Self { handshaking }
    }

    /// Encodes plaintext the way `wrap` does, for building expectations.
    pub fn encode(plain: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(plain.len() + plain.len() / 255 + 1);
        for chunk in plain.chunks(255) {
            out.push(chunk.len() as u8);
            out.extend(chunk.iter().map(|b| b ^ MASK));
        }
        out
    }
}

impl TlsEngine for MockEngine {
    fn is_handshaking(&self) -> bool {
        self.handshaking
    }

    fn unwrap(
        &mut self,
        ciphertext: &mut Buffer,
        plaintext: &mut Buffer,
    ) -> Result<(), StreamError> {
        if self.handshaking {
            return Err(StreamError::Handshake(
                "application record during handshake".into(),
            ));
        }
        loop {
            let bytes = ciphertext.as_slice();
            if bytes.is_empty() {
                return Ok(());
            }
            let len = bytes[0] as usize;
            if bytes.len() < 1 + len {
                // Partial record stays buffered until the rest arrives.
                return Ok(());
            }
            let decoded: Vec<u8> = bytes[1..=len].iter().map(|b| b ^ MASK).collect();
            ciphertext.consume(1 + len);
            plaintext.append(&decoded);
        }
    }

    fn wrap(
        &mut self,
        plaintext: &mut Buffer,
        ciphertext: &mut Buffer,
    ) -> Result<(), StreamError> {
        while !plaintext.is_empty() {
            let chunk = plaintext.remaining().min(255);
            ciphertext.append(&[chunk as u8]);
            let encoded: Vec<u8> = plaintext.as_slice()[..chunk].iter().map(|b| b ^ MASK).collect();
            ciphertext.append(&encoded);
            plaintext.consume(chunk);
        }
        Ok(())
    }

    fn handshake_step(
        &mut self,
        incoming: &mut Buffer,
        outgoing: &mut Buffer,
    ) -> Result<HandshakeStatus, StreamError> {
        if !self.handshaking {
            return Ok(HandshakeStatus::Complete);
        }
        let bytes = incoming.as_slice();
        if bytes.len() >= GREETING.len() {
            if &bytes[..GREETING.len()] == GREETING {
                incoming.consume(GREETING.len());
                outgoing.append(REPLY);
                self.handshaking = false;
                return Ok(HandshakeStatus::Complete);
            }
            return Err(StreamError::Handshake("unexpected greeting".into()));
        }
        if !GREETING.starts_with(bytes) {
            return Err(StreamError::Handshake("unexpected greeting".into()));
        }
        Ok(HandshakeStatus::NeedData)
    }
}
