//! Production engine adapter over rustls.

use super::engine::{HandshakeStatus, TlsEngine};
use crate::buffer::Buffer;
use crate::error::StreamError;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, Connection, ServerConfig, ServerConnection};
use std::io::{Read, Write};
use std::sync::Arc;

/// [`TlsEngine`] backed by a rustls client or server connection.
pub struct RustlsEngine {
    conn: Connection,
}

impl RustlsEngine {
    /// Client-side engine for `server_name`.
    pub fn client(
        config: Arc<ClientConfig>,
        server_name: ServerName<'static>,
    ) -> Result<Self, StreamError> {
        let conn = ClientConnection::new(config, server_name)
            .map_err(|err| StreamError::Handshake(err.to_string()))?;
        Ok(Self {
            conn: Connection::Client(conn),
        })
    }

    /// Server-side engine.
    pub fn server(config: Arc<ServerConfig>) -> Result<Self, StreamError> {
        let conn = ServerConnection::new(config)
            .map_err(|err| StreamError::Handshake(err.to_string()))?;
        Ok(Self {
            conn: Connection::Server(conn),
        })
    }

    /// Feeds buffered ciphertext into the session and processes the new
    /// records. Partial trailing records stay in `ciphertext`.
    fn ingest(&mut self, ciphertext: &mut Buffer) -> Result<(), StreamError> {
        let mut slice = ciphertext.as_slice();
        let before = slice.len();
        while !slice.is_empty() {
            match self.conn.read_tls(&mut slice) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => return Err(StreamError::Io(err)),
            }
        }
        let consumed = before - slice.len();
        ciphertext.consume(consumed);
        self.conn
            .process_new_packets()
            .map_err(|err| StreamError::Handshake(err.to_string()))?;
        Ok(())
    }

    /// Drains pending outbound records into `out`.
    fn emit(&mut self, out: &mut Buffer) -> Result<(), StreamError> {
        let mut records = Vec::new();
        while self.conn.wants_write() {
            self.conn
                .write_tls(&mut records)
                .map_err(StreamError::Io)?;
        }
        if !records.is_empty() {
            out.append(&records);
        }
        Ok(())
    }
}

impl TlsEngine for RustlsEngine {
    fn is_handshaking(&self) -> bool {
        self.conn.is_handshaking()
    }

    fn unwrap(
        &mut self,
        ciphertext: &mut Buffer,
        plaintext: &mut Buffer,
    ) -> Result<(), StreamError> {
        self.ingest(ciphertext)?;
        let mut chunk = [0u8; 4096];
        loop {
            match self.conn.reader().read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => plaintext.append(&chunk[..n]),
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(StreamError::Io(err)),
            }
        }
    }

    fn wrap(
        &mut self,
        plaintext: &mut Buffer,
        ciphertext: &mut Buffer,
    ) -> Result<(), StreamError> {
        self.conn
            .writer()
            .write_all(plaintext.as_slice())
            .map_err(StreamError::Io)?;
        plaintext.consume(plaintext.remaining());
        self.emit(ciphertext)
    }

    fn handshake_step(
        &mut self,
        incoming: &mut Buffer,
        outgoing: &mut Buffer,
    ) -> Result<HandshakeStatus, StreamError> {
        self.ingest(incoming)?;
        self.emit(outgoing)?;
        if self.conn.is_handshaking() {
            Ok(HandshakeStatus::NeedData)
        } else {
            Ok(HandshakeStatus::Complete)
        }
    }
}
