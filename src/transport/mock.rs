//! Deterministic transport simulator for testing.
//!
//! In-memory, scripted stand-in for a real socket transport: raw reads pop
//! from a script queue, blocking reads follow their own script (optionally
//! consuming real wall-clock time to exercise timeout budgets), and read
//! events are fired manually at the registered interceptor. Counters expose
//! how much I/O the code under test actually issued.

use super::{InterceptAction, RawRead, ReadEvent, ReadInterceptor, Transport};
use crate::buffer::Buffer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::time::Duration;

/// One scripted outcome for `raw_read`.
#[derive(Debug)]
pub enum ScriptedRead {
    /// Deliver these bytes.
    Data(Vec<u8>),
    /// Report "no data now".
    NoData,
    /// Report end of stream.
    Eof,
}

/// One scripted outcome for `blocking_read`.
#[derive(Debug)]
pub enum ScriptedBlocking {
    /// Deliver these bytes immediately.
    Data(Vec<u8>),
    /// Sleep for the full budget, then report a timeout.
    Timeout,
    /// Report end of stream.
    Eof,
    /// Fail with this error kind.
    Fail(io::ErrorKind),
}

#[derive(Default)]
struct MockState {
    raw_script: VecDeque<ScriptedRead>,
    blocking_script: VecDeque<ScriptedBlocking>,
    interceptor: Option<ReadInterceptor>,
    raw_reads: usize,
    blocking_reads: usize,
    registrations: usize,
    reject_registration: bool,
    written: Vec<u8>,
}

/// Scripted in-memory transport bound to one simulated connection.
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Creates a transport with empty scripts. Raw reads report `NoData`,
    /// blocking reads time out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw-read outcome.
    pub fn script_raw(&self, entry: ScriptedRead) {
        self.state.lock().raw_script.push_back(entry);
    }

    /// Queues a blocking-read outcome.
    pub fn script_blocking(&self, entry: ScriptedBlocking) {
        self.state.lock().blocking_script.push_back(entry);
    }

    /// Makes the next `register_read_interceptor` call fail.
    pub fn reject_next_registration(&self) {
        self.state.lock().reject_registration = true;
    }

    /// Fires a data event at the armed interceptor. Panics in the test if
    /// nothing is armed.
    pub fn fire_data(&self, bytes: &[u8]) -> InterceptAction {
        self.fire(ReadEvent::Data(Buffer::from_slice(bytes)))
    }

    /// Fires a close event at the armed interceptor.
    pub fn fire_closed(&self) -> InterceptAction {
        self.fire(ReadEvent::Closed)
    }

    /// Fires a dispatch error at the armed interceptor.
    pub fn fire_error(&self, err: io::Error) -> InterceptAction {
        self.fire(ReadEvent::Error(err))
    }

    fn fire(&self, event: ReadEvent) -> InterceptAction {
        // Run the hook outside the lock; it re-enters the reader.
        let mut hook = self
            .state
            .lock()
            .interceptor
            .take()
            .expect("no interceptor armed");
        let action = hook(event);
        if action == InterceptAction::Incomplete {
            self.state.lock().interceptor = Some(hook);
        }
        action
    }

    /// Number of `raw_read` calls issued so far.
    #[must_use]
    pub fn raw_reads(&self) -> usize {
        self.state.lock().raw_reads
    }

    /// Number of `blocking_read` calls issued so far.
    #[must_use]
    pub fn blocking_reads(&self) -> usize {
        self.state.lock().blocking_reads
    }

    /// Number of interceptor registrations accepted so far.
    #[must_use]
    pub fn registrations(&self) -> usize {
        self.state.lock().registrations
    }

    /// Whether an interceptor is currently armed.
    #[must_use]
    pub fn has_interceptor(&self) -> bool {
        self.state.lock().interceptor.is_some()
    }

    /// Everything written through `raw_write`, in order.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }
}

impl Transport for MockTransport {
    fn raw_read(&self, buf: &mut [u8]) -> io::Result<RawRead> {
        let mut state = self.state.lock();
        state.raw_reads += 1;
        match state.raw_script.pop_front() {
            Some(ScriptedRead::Data(bytes)) => {
                assert!(bytes.len() <= buf.len(), "scripted read larger than buffer");
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(RawRead::Data(bytes.len()))
            }
            Some(ScriptedRead::NoData) | None => Ok(RawRead::NoData),
            Some(ScriptedRead::Eof) => Ok(RawRead::Eof),
        }
    }

    fn register_read_interceptor(&self, hook: ReadInterceptor) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.reject_registration {
            state.reject_registration = false;
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "dispatch unavailable",
            ));
        }
        assert!(state.interceptor.is_none(), "interceptor already armed");
        state.interceptor = Some(hook);
        state.registrations += 1;
        Ok(())
    }

    fn blocking_read(&self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        let entry = {
            let mut state = self.state.lock();
            state.blocking_reads += 1;
            state.blocking_script.pop_front()
        };
        match entry {
            Some(ScriptedBlocking::Data(bytes)) => {
                assert!(bytes.len() <= buf.len(), "scripted read larger than buffer");
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            Some(ScriptedBlocking::Timeout) | None => {
                std::thread::sleep(timeout);
                Err(io::Error::new(io::ErrorKind::TimedOut, "read budget spent"))
            }
            Some(ScriptedBlocking::Eof) => Ok(0),
            Some(ScriptedBlocking::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
        }
    }

    fn raw_write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }
}
