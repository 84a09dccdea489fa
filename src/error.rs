//! Error types for the stream core and the TLS transform layer.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by stream readers, writers, and the TLS filter.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream is closed or closing. Terminal: any pending or future
    /// wait on the stream fails with this error.
    ///
    /// When the closure was triggered by a timeout or an I/O failure on the
    /// blocking read path, the underlying cause is preserved and reachable
    /// through [`std::error::Error::source`].
    #[error("end of stream")]
    EndOfStream(#[source] Option<EofCause>),

    /// A bounded blocking read exhausted its budget.
    ///
    /// Surfaced distinctly by the blocking fallback reader; the reader layer
    /// folds it into [`StreamError::EndOfStream`] with the cause retained.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// A wait was requested while a previous one is still unresolved.
    /// At most one pending wait is allowed per stream.
    #[error("a wait is already registered on this stream")]
    AlreadyWaiting,

    /// The TLS engine reported a handshake failure.
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    /// A component was driven outside its contract.
    #[error("invalid stream state: {0}")]
    InvalidState(&'static str),

    /// Raw I/O failure outside the blocking fallback path.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Underlying cause carried by an [`StreamError::EndOfStream`].
#[derive(Debug, Error)]
pub enum EofCause {
    /// The blocking read budget was exhausted.
    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    /// The raw read failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl StreamError {
    /// Plain end-of-stream with no further context.
    #[must_use]
    pub const fn eof() -> Self {
        Self::EndOfStream(None)
    }

    /// End-of-stream preserving the failure that triggered it.
    #[must_use]
    pub const fn eof_with(cause: EofCause) -> Self {
        Self::EndOfStream(Some(cause))
    }

    /// Whether this error terminates the stream.
    #[must_use]
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream(_))
    }

    /// Fold a blocking-path failure into end-of-stream, keeping the cause.
    ///
    /// Timeouts and I/O failures on the blocking read loop are treated as
    /// stream termination; the original classification stays reachable via
    /// `source()`.
    #[must_use]
    pub fn into_terminal(self) -> Self {
        match self {
            Self::Timeout(budget) => Self::eof_with(EofCause::Timeout(budget)),
            Self::Io(err) => Self::eof_with(EofCause::Io(err)),
            other => other,
        }
    }
}
