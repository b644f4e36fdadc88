//! Buffered sender for Splunk TCP data inputs.
//!
//! This module defines `SplunkTcpSender`, which turns a host-supplied
//! [`Chunk`](crate::event::Chunk) into newline-delimited payloads and writes
//! them to a persistent TCP or TLS connection. The connection is opened
//! lazily, reused while healthy, and discarded after any failure so the next
//! send starts from a fresh dial. Retry scheduling belongs to the host.

mod config;
mod encoder;
mod health;
mod sender;
mod transmitter;
mod transport;
mod trust;


pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_KEY, DEFAULT_HOST, DEFAULT_WARN_INTERVAL,
    DEFAULT_WRITE_TIMEOUT, Endpoint, SplunkTcpConfig, TlsSettings,
};
pub use encoder::{
    BatchEncoder, EncodedBatch, EncodingError, EncodingErrorKind, EncodingFailurePolicy,
};
pub use health::{HealthSnapshot, TimeProvider};
pub use sender::{SendError, SendReport, SplunkTcpSender};
pub use transmitter::{TransmissionCause, TransmissionError};
pub use transport::{ConnectionError, ConnectionState};
pub use trust::{
    ClientIdentity, FileTrustMaterial, InMemoryTrustMaterial, Passphrase, TrustMaterialError,
    TrustMaterialProvider,
};
