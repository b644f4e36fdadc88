//! Ships structured log events to a Splunk TCP data input.
//!
//! The host groups events into a [`Chunk`] and hands it to
//! [`SplunkTcpSender::send`]. Each record's payload field becomes one line on
//! a persistent TCP or TLS connection. A failed send leaves nothing counted as
//! delivered; the host decides when to try again.
//!
//! ```no_run
//! use splunk_tcp_rs::{Chunk, Record, SplunkTcpSenderBuilder};
//!
//! let sender = SplunkTcpSenderBuilder::new()
//!     .with_host("127.0.0.1")
//!     .with_port(8089)
//!     .build()?;
//! let chunk = Chunk::new().with_event(
//!     1_700_000_000,
//!     Record::new().with_field("event", r#"{"a":1}"#),
//! );
//! sender.send(&chunk)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod builder;
pub mod event;
pub mod settings;
pub mod splunk_tcp;

pub use builder::{ConfigurationError, SplunkTcpSenderBuilder};
pub use event::{Chunk, Event, Record};
pub use settings::SenderSettings;
pub use splunk_tcp::{
    ConnectionError, ConnectionState, EncodingError, EncodingFailurePolicy, HealthSnapshot,
    InMemoryTrustMaterial, SendError, SendReport, SplunkTcpConfig, SplunkTcpSender,
    TransmissionError, TrustMaterialProvider,
};
