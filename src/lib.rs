//! Streamgate: conditional non-blocking stream reading with a TLS
//! transform layer.
//!
//! # Overview
//!
//! Streamgate is the I/O core of a transport framework: higher-level
//! protocol logic asks a stream reader to resolve once "enough data has
//! arrived" — an arbitrary predicate over buffered bytes — without managing
//! socket readiness, threads, or buffer lifecycles itself. Three acquisition
//! modes are fixed per reader at construction: event-driven non-blocking,
//! blocking with a per-read timeout, and externally fed. On top of the
//! reader sits a filter pipeline and a TLS transform filter that interposes
//! record encryption/decryption and a resumable handshake.
//!
//! # Core Guarantees
//!
//! - **One wait at a time**: a second `wait_for` while one is outstanding
//!   fails with a typed error, never queues and never panics
//! - **Set-once resolution**: a wait resolves exactly once, and its
//!   completion callback fires exactly once, on success and failure alike
//! - **Ordered accumulation**: bytes append in raw-read return order and
//!   conditions are re-checked only after an append
//! - **Symmetric filter unwind**: every filter whose read-entry step ran
//!   gets its read-exit step, on success, stop, and error paths
//!
//! # Module Structure
//!
//! - [`buffer`]: owned byte region with position/limit cursors
//! - [`condition`]: predicates over buffered data
//! - [`wait`]: the pending wait and its set-once future
//! - [`transport`]: the transport collaborator seam and its test simulator
//! - [`stream`]: conditional reader, blocking fallback, and writer
//! - [`filter`]: filter chain context and driver
//! - [`tls`]: engine seam, wrapper streams, handshake coordinator, filter
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod condition;
pub mod error;
pub mod filter;
pub mod stream;
pub mod tls;
pub mod tracing_compat;
pub mod transport;
pub mod wait;

#[cfg(test)]
pub mod test_utils;

pub use buffer::Buffer;
pub use condition::{min_available, Condition, MinAvailable};
pub use error::{EofCause, StreamError};
pub use filter::{Filter, FilterChain, FilterChainContext, NextAction};
pub use stream::{
    read_with_timeout, ReaderConfig, StreamMode, StreamReader, StreamWriter, TransportReader,
    TransportWriter,
};
pub use tls::{
    HandshakePhase, HandshakeProgress, HandshakeStatus, Handshaker, TlsEngine, TlsFilter,
    TlsStreamReader, TlsStreamWriter,
};
pub use transport::{ConnectionId, InterceptAction, RawRead, ReadEvent, ReadInterceptor, Transport};
pub use wait::{CompletionCallback, WaitCell, WaitFuture, WaitOutcome};
