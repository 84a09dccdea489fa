//! TLS transform layer: engine seam, wrapper streams, handshake
//! coordinator, and the pipeline filter tying them together.

mod engine;
mod filter;
mod handshake;
mod stream;

#[cfg(feature = "tls")]
mod rustls;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{HandshakeStatus, TlsEngine};
pub use filter::{EngineFactory, HandshakePhase, TlsFilter};
pub use handshake::{HandshakeProgress, Handshaker};
pub use stream::{CiphertextWait, EngineHandle, TlsStreamReader, TlsStreamWriter};

#[cfg(feature = "tls")]
pub use self::rustls::RustlsEngine;
