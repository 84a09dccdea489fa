//! Blocking fallback read: one raw read bounded by an explicit timeout.

use crate::buffer::Buffer;
use crate::error::{EofCause, StreamError};
use crate::tracing_compat::trace;
use crate::transport::Transport;
use std::io;
use std::time::Duration;

/// Performs a single blocking raw read with an explicit budget.
///
/// On success the returned buffer is trimmed to exactly the bytes received.
/// On timeout the partially filled buffer is disposed and
/// [`StreamError::Timeout`] is raised — at this layer a timeout is treated
/// as equivalent to stream termination, but the classification is kept
/// distinct so callers that care (the handshake coordinator) can tell the
/// causes apart. Any other I/O failure likewise disposes the buffer and
/// terminates the stream.
pub fn read_with_timeout(
    transport: &dyn Transport,
    size: usize,
    timeout: Duration,
) -> Result<Buffer, StreamError> {
    let mut buffer = Buffer::with_capacity(size);
    match transport.blocking_read(buffer.spare_mut(), timeout) {
        Ok(0) => Err(StreamError::eof()),
        Ok(n) => {
            buffer.fill(n);
            buffer.trim();
            trace!(bytes = n, "blocking read");
            Ok(buffer)
        }
        Err(err) if err.kind() == io::ErrorKind::TimedOut => Err(StreamError::Timeout(timeout)),
        Err(err) => Err(StreamError::eof_with(EofCause::Io(err))),
    }
    // `buffer` is dropped before any error propagates.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockTransport, ScriptedBlocking};
    use std::time::Instant;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn success_trims_to_received_bytes() {
        init_test("success_trims_to_received_bytes");
        let transport = MockTransport::new();
        transport.script_blocking(ScriptedBlocking::Data(b"abc".to_vec()));
        let buffer = read_with_timeout(&transport, 64, Duration::from_millis(10))
            .expect("scripted read");
        crate::assert_with_log!(buffer.as_slice() == b"abc", "content", b"abc", buffer.as_slice());
        crate::assert_with_log!(buffer.capacity() == 3, "trimmed", 3, buffer.capacity());
        crate::test_complete!("success_trims_to_received_bytes");
    }

    #[test]
    fn timeout_is_surfaced_distinctly() {
        init_test("timeout_is_surfaced_distinctly");
        let transport = MockTransport::new();
        let budget = Duration::from_millis(50);
        let start = Instant::now();
        let err = read_with_timeout(&transport, 64, budget).expect_err("must time out");
        let elapsed = start.elapsed();
        let timed_out = matches!(err, StreamError::Timeout(d) if d == budget);
        crate::assert_with_log!(timed_out, "timeout error", true, timed_out);
        let bounded = elapsed >= budget && elapsed < Duration::from_millis(150);
        crate::assert_with_log!(bounded, "bounded margin", true, bounded);
        crate::test_complete!("timeout_is_surfaced_distinctly");
    }

    #[test]
    fn eof_and_io_failures_terminate() {
        init_test("eof_and_io_failures_terminate");
        let transport = MockTransport::new();
        transport.script_blocking(ScriptedBlocking::Eof);
        transport.script_blocking(ScriptedBlocking::Fail(io::ErrorKind::ConnectionReset));

        let eof = read_with_timeout(&transport, 64, Duration::from_millis(10));
        let is_eof = matches!(eof, Err(StreamError::EndOfStream(None)));
        crate::assert_with_log!(is_eof, "eof", true, is_eof);

        let reset = read_with_timeout(&transport, 64, Duration::from_millis(10));
        let has_cause = matches!(reset, Err(StreamError::EndOfStream(Some(_))));
        crate::assert_with_log!(has_cause, "cause preserved", true, has_cause);
        crate::test_complete!("eof_and_io_failures_terminate");
    }
}
