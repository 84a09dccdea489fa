//! TLS transform filter.
//!
//! Swaps a decrypt-on-read / encrypt-on-write wrapper pair into the chain
//! context for the duration of one read event and restores the originals in
//! `post_read`. Per-connection engine and handshake phase live in a
//! side-table owned by this filter, created lazily on the first event and
//! removed on close.

use super::engine::TlsEngine;
use super::handshake::{HandshakeProgress, Handshaker};
use super::stream::{EngineHandle, TlsStreamReader, TlsStreamWriter};
use crate::buffer::Buffer;
use crate::error::StreamError;
use crate::filter::{Filter, FilterChainContext, NextAction};
use crate::stream::{StreamReader, StreamWriter};
use crate::tracing_compat::{debug, trace};
use crate::transport::ConnectionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Engine constructor invoked once per connection.
pub type EngineFactory = Box<dyn Fn() -> Box<dyn TlsEngine> + Send + Sync>;

/// Handshake phase recorded per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// No handshake step has run yet.
    NotStarted,
    /// The handshake started and has not completed.
    Handshaking,
    /// Application records flow.
    Established,
}

struct TlsSession {
    engine: EngineHandle,
    phase: HandshakePhase,
    cipher_leftover: Buffer,
    plain_leftover: Buffer,
}

/// Filter interposing TLS record transform into the pipeline.
pub struct TlsFilter {
    factory: EngineFactory,
    sessions: Mutex<HashMap<ConnectionId, TlsSession>>,
}

impl TlsFilter {
    /// Filter that creates one engine per connection via `factory`.
    #[must_use]
    pub fn new(factory: EngineFactory) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// The connection's engine, created on first use.
    fn engine_for(&self, connection: ConnectionId) -> EngineHandle {
        let mut sessions = self.sessions.lock();
        let session = sessions.entry(connection).or_insert_with(|| {
            debug!(%connection, "tls session created");
            TlsSession {
                engine: Arc::new(Mutex::new((self.factory)())),
                phase: HandshakePhase::NotStarted,
                cipher_leftover: Buffer::default(),
                plain_leftover: Buffer::default(),
            }
        });
        Arc::clone(&session.engine)
    }

    /// Takes the connection's transform leftovers for a fresh wrapping.
    fn take_leftovers(&self, connection: ConnectionId) -> (Buffer, Buffer) {
        let mut sessions = self.sessions.lock();
        sessions.get_mut(&connection).map_or_else(
            || (Buffer::default(), Buffer::default()),
            |session| {
                (
                    std::mem::take(&mut session.cipher_leftover),
                    std::mem::take(&mut session.plain_leftover),
                )
            },
        )
    }

    fn store_leftovers(&self, connection: ConnectionId, cipher: Buffer, plain: Buffer) {
        if let Some(session) = self.sessions.lock().get_mut(&connection) {
            session.cipher_leftover = cipher;
            session.plain_leftover = plain;
        }
    }

    fn set_phase(&self, connection: ConnectionId, phase: HandshakePhase) {
        if let Some(session) = self.sessions.lock().get_mut(&connection) {
            session.phase = phase;
        }
    }

    /// The connection's recorded handshake phase, if a session exists.
    #[must_use]
    pub fn phase(&self, connection: ConnectionId) -> Option<HandshakePhase> {
        self.sessions.lock().get(&connection).map(|s| s.phase)
    }

    /// Whether a session entry exists for `connection`.
    #[must_use]
    pub fn has_session(&self, connection: ConnectionId) -> bool {
        self.sessions.lock().contains_key(&connection)
    }

    /// Number of live session entries.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Wraps a standalone reader with the connection's engine, seeding it
    /// with any stored leftovers.
    #[must_use]
    pub fn wrap_reader(
        &self,
        connection: ConnectionId,
        parent: Box<dyn StreamReader>,
    ) -> TlsStreamReader {
        let engine = self.engine_for(connection);
        let (cipher, plain) = self.take_leftovers(connection);
        TlsStreamReader::new(parent, engine, cipher, plain)
    }

    /// Wraps a standalone writer with the connection's engine.
    #[must_use]
    pub fn wrap_writer(
        &self,
        connection: ConnectionId,
        parent: Box<dyn StreamWriter>,
    ) -> TlsStreamWriter {
        TlsStreamWriter::new(parent, self.engine_for(connection))
    }

    fn process_read(
        &self,
        connection: ConnectionId,
        reader: &mut TlsStreamReader,
        writer: &mut TlsStreamWriter,
    ) -> Result<NextAction, StreamError> {
        reader.pull()?;
        if reader.engine_handle().lock().is_handshaking() {
            self.set_phase(connection, HandshakePhase::Handshaking);
            match Handshaker::drive(reader, writer)? {
                HandshakeProgress::InProgress => {
                    trace!(%connection, "handshake incomplete, stopping event");
                    return Ok(NextAction::Stop);
                }
                HandshakeProgress::Established => {
                    self.set_phase(connection, HandshakePhase::Established);
                    // Application records may have arrived behind the final
                    // handshake bytes.
                    reader.pull()?;
                }
            }
        } else {
            self.set_phase(connection, HandshakePhase::Established);
        }
        if reader.available() == 0 {
            trace!(%connection, "no plaintext to deliver");
            return Ok(NextAction::Stop);
        }
        Ok(NextAction::Continue)
    }
}

impl Filter for TlsFilter {
    fn handle_read(&self, ctx: &mut FilterChainContext) -> Result<NextAction, StreamError> {
        let connection = ctx.connection();
        let Some(parent_reader) = ctx.take_reader() else {
            return Err(StreamError::InvalidState("no reader installed"));
        };
        let Some(parent_writer) = ctx.take_writer() else {
            ctx.set_reader(parent_reader);
            return Err(StreamError::InvalidState("no writer installed"));
        };
        if parent_reader.is_closed() && parent_reader.available() == 0 {
            ctx.set_reader(parent_reader);
            ctx.set_writer(parent_writer);
            return Err(StreamError::eof());
        }

        let mut reader = self.wrap_reader(connection, parent_reader);
        let mut writer = TlsStreamWriter::new(parent_writer, reader.engine_handle());
        let verdict = self.process_read(connection, &mut reader, &mut writer);
        // Install the wrappers even on failure so post_read restores the
        // originals on every exit path.
        ctx.set_reader(Box::new(reader));
        ctx.set_writer(Box::new(writer));
        verdict
    }

    fn post_read(&self, ctx: &mut FilterChainContext) -> Result<(), StreamError> {
        let connection = ctx.connection();
        if let Some(reader) = ctx.take_reader() {
            if reader.as_any().is::<TlsStreamReader>() {
                let wrapper = reader
                    .into_any()
                    .downcast::<TlsStreamReader>()
                    .map_err(|_| StreamError::InvalidState("reader downcast failed"))?;
                let (parent, cipher, plain) = wrapper.detach();
                self.store_leftovers(connection, cipher, plain);
                ctx.set_reader(parent);
            } else {
                ctx.set_reader(reader);
            }
        }
        if let Some(writer) = ctx.take_writer() {
            if writer.as_any().is::<TlsStreamWriter>() {
                let wrapper = writer
                    .into_any()
                    .downcast::<TlsStreamWriter>()
                    .map_err(|_| StreamError::InvalidState("writer downcast failed"))?;
                ctx.set_writer(wrapper.detach());
            } else {
                ctx.set_writer(writer);
            }
        }
        Ok(())
    }

    fn handle_write(&self, ctx: &mut FilterChainContext) -> Result<NextAction, StreamError> {
        // Only buffer messages are ours to transform.
        let Some(mut message) = ctx.take_message() else {
            return Ok(NextAction::Continue);
        };
        let connection = ctx.connection();
        let Some(parent_writer) = ctx.take_writer() else {
            ctx.set_message(message);
            return Err(StreamError::InvalidState("no writer installed"));
        };
        let mut writer = self.wrap_writer(connection, parent_writer);
        let verdict = writer
            .write(&mut message)
            .and_then(|()| writer.flush())
            .map(|()| NextAction::Continue);
        ctx.set_writer(writer.detach());
        // The message stays in the context for later filters; encryption
        // consumes its bytes but not the slot.
        ctx.set_message(message);
        verdict
    }

    fn post_close(&self, ctx: &mut FilterChainContext) -> Result<(), StreamError> {
        let connection = ctx.connection();
        if self.sessions.lock().remove(&connection).is_some() {
            debug!(%connection, "tls session removed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::MockEngine;
    use super::*;
    use crate::filter::FilterChain;
    use crate::stream::{ReaderConfig, StreamMode, TransportReader, TransportWriter};
    use crate::transport::mock::MockTransport;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    fn tls_filter() -> Arc<TlsFilter> {
        Arc::new(TlsFilter::new(Box::new(|| {
            Box::new(MockEngine::new(true)) as Box<dyn TlsEngine>
        })))
    }

    fn context(transport: &Arc<MockTransport>, connection: ConnectionId) -> FilterChainContext {
        FilterChainContext::new(
            connection,
            Box::new(TransportReader::new(
                transport.clone(),
                ReaderConfig::new(StreamMode::Feeder),
            )),
            Box::new(TransportWriter::new(transport.clone())),
        )
    }

    fn feed(ctx: &mut FilterChainContext, bytes: &[u8]) {
        let reader = ctx.reader_mut().expect("reader installed");
        reader.push(Buffer::from_slice(bytes));
    }

    #[test]
    fn end_to_end_handshake_then_plaintext_then_teardown() {
        init_test("end_to_end_handshake_then_plaintext_then_teardown");
        let transport = Arc::new(MockTransport::new());
        let connection = ConnectionId(7);
        let filter = tls_filter();
        let chain = FilterChain::new(vec![filter.clone() as Arc<dyn Filter>]);
        let mut ctx = context(&transport, connection);

        crate::test_section!("first event creates the session and stops");
        feed(&mut ctx, b"HEL");
        let action = chain.read_event(&mut ctx).expect("first event");
        crate::assert_with_log!(action == NextAction::Stop, "stop", NextAction::Stop, action);
        crate::assert_with_log!(filter.session_count() == 1, "one session", 1, filter.session_count());
        let phase = filter.phase(connection);
        crate::assert_with_log!(
            phase == Some(HandshakePhase::Handshaking),
            "handshaking",
            Some(HandshakePhase::Handshaking),
            phase
        );

        crate::test_section!("handshake completes and the reply is flushed");
        feed(&mut ctx, b"LO\n");
        let action = chain.read_event(&mut ctx).expect("second event");
        // Handshake done but no application plaintext yet.
        crate::assert_with_log!(action == NextAction::Stop, "stop", NextAction::Stop, action);
        let phase = filter.phase(connection);
        crate::assert_with_log!(
            phase == Some(HandshakePhase::Established),
            "established",
            Some(HandshakePhase::Established),
            phase
        );
        crate::assert_with_log!(
            transport.written() == b"WELCOME\n",
            "reply",
            b"WELCOME\n",
            transport.written()
        );

        crate::test_section!("application records decrypt to plaintext");
        feed(&mut ctx, &MockEngine::encode(b"ping"));
        let action = chain.read_event(&mut ctx).expect("app event");
        crate::assert_with_log!(
            action == NextAction::Continue,
            "continue",
            NextAction::Continue,
            action
        );
        // The wrapper was restored away; plaintext leftovers live in the
        // session until the next wrapping.
        let next = chain_plaintext(&filter, connection, &mut ctx);
        crate::assert_with_log!(next.as_slice() == b"ping", "plaintext", b"ping", next.as_slice());

        crate::test_section!("close removes the session");
        chain.close_event(&mut ctx).expect("close");
        crate::assert_with_log!(!filter.has_session(connection), "removed", false, filter.has_session(connection));
        crate::assert_with_log!(filter.session_count() == 0, "empty table", 0, filter.session_count());
        crate::test_complete!("end_to_end_handshake_then_plaintext_then_teardown");
    }

    // Plaintext decrypted during an event is parked as a session leftover
    // after post_read; re-wrap to observe it the way a downstream filter
    // sees it mid-event.
    fn chain_plaintext(
        filter: &TlsFilter,
        connection: ConnectionId,
        ctx: &mut FilterChainContext,
    ) -> Buffer {
        let parent = ctx.take_reader().expect("reader installed");
        let mut wrapper = filter.wrap_reader(connection, parent);
        let plain = wrapper.drain();
        let (parent, cipher, plain_rest) = wrapper.detach();
        filter.store_leftovers(connection, cipher, plain_rest);
        ctx.set_reader(parent);
        plain
    }

    #[test]
    fn wrappers_are_restored_on_every_exit_path() {
        init_test("wrappers_are_restored_on_every_exit_path");
        let transport = Arc::new(MockTransport::new());
        let connection = ConnectionId(3);
        let filter = tls_filter();
        let chain = FilterChain::new(vec![filter.clone() as Arc<dyn Filter>]);
        let mut ctx = context(&transport, connection);

        crate::test_section!("stop path");
        let action = chain.read_event(&mut ctx).expect("event");
        crate::assert_with_log!(action == NextAction::Stop, "stop", NextAction::Stop, action);
        let restored = ctx
            .reader_mut()
            .map(|r| r.as_any().is::<TransportReader>())
            .unwrap_or(false);
        crate::assert_with_log!(restored, "original reader back", true, restored);

        crate::test_section!("error path");
        feed(&mut ctx, b"BOGUS\n");
        let result = chain.read_event(&mut ctx);
        crate::assert_with_log!(result.is_err(), "failed", true, result.is_err());
        let restored = ctx
            .reader_mut()
            .map(|r| r.as_any().is::<TransportReader>())
            .unwrap_or(false);
        crate::assert_with_log!(restored, "original reader back after error", true, restored);
        crate::test_complete!("wrappers_are_restored_on_every_exit_path");
    }

    #[test]
    fn write_encrypts_buffer_messages_and_passes_others_through() {
        init_test("write_encrypts_buffer_messages_and_passes_others_through");
        let transport = Arc::new(MockTransport::new());
        let connection = ConnectionId(9);
        let filter = tls_filter();
        // Skip the handshake for the write path.
        filter.sessions.lock().insert(
            connection,
            TlsSession {
                engine: Arc::new(Mutex::new(
                    Box::new(MockEngine::new(false)) as Box<dyn TlsEngine>
                )),
                phase: HandshakePhase::Established,
                cipher_leftover: Buffer::default(),
                plain_leftover: Buffer::default(),
            },
        );
        let chain = FilterChain::new(vec![filter.clone() as Arc<dyn Filter>]);
        let mut ctx = context(&transport, connection);

        crate::test_section!("no message passes through untouched");
        let action = chain.write_event(&mut ctx).expect("write event");
        crate::assert_with_log!(
            action == NextAction::Continue,
            "continue",
            NextAction::Continue,
            action
        );
        crate::assert_with_log!(transport.written().is_empty(), "nothing written", true, transport.written().is_empty());

        crate::test_section!("buffer message is encrypted and flushed");
        ctx.set_message(Buffer::from_slice(b"pong"));
        chain.write_event(&mut ctx).expect("write event");
        let expected = MockEngine::encode(b"pong");
        crate::assert_with_log!(transport.written() == expected, "records", expected, transport.written());

        crate::test_section!("message slot survives for later filters");
        let slot_kept = ctx.message().is_some();
        crate::assert_with_log!(slot_kept, "message restored", true, slot_kept);
        let consumed = ctx.message().is_some_and(Buffer::is_empty);
        crate::assert_with_log!(consumed, "bytes consumed by encryption", true, consumed);
        crate::test_complete!("write_encrypts_buffer_messages_and_passes_others_through");
    }

    #[test]
    fn closed_stream_read_fails_synchronously() {
        init_test("closed_stream_read_fails_synchronously");
        let transport = Arc::new(MockTransport::new());
        let filter = tls_filter();
        let chain = FilterChain::new(vec![filter as Arc<dyn Filter>]);
        let mut ctx = context(&transport, ConnectionId(4));
        if let Some(reader) = ctx.reader_mut() {
            reader.close();
        }
        let result = chain.read_event(&mut ctx);
        let eof = matches!(result, Err(StreamError::EndOfStream(_)));
        crate::assert_with_log!(eof, "eof", true, eof);
        crate::test_complete!("closed_stream_read_fails_synchronously");
    }
}
