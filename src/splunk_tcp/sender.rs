//! Public sender type exported by the crate.

use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::{builder::ConfigurationError, event::Chunk};

use super::{
    config::SplunkTcpConfig,
    encoder::{BatchEncoder, EncodingError, EncodingFailurePolicy},
    health::{ConnectionHealth, HealthSnapshot},
    transmitter::{TransmissionError, Transmitter},
    transport::{ConnectionManager, ConnectionState},
};

#[cfg(any(test, feature = "test-util"))]
use super::health::TimeProvider;

/// Outcome of a successful [`SplunkTcpSender::send`].
#[derive(Debug, Default)]
pub struct SendReport {
    /// Lines handed to the socket.
    pub delivered: usize,
    /// Bytes handed to the socket, delimiters included.
    pub bytes: usize,
    /// Records left out of the batch because they could not be encoded.
    pub rejected: Vec<EncodingError>,
}

/// Errors returned to the host from a send.
#[derive(Debug, Error)]
pub enum SendError {
    /// The chunk could not be delivered; re-send it later.
    #[error(transparent)]
    Transmission(#[from] TransmissionError),
    /// Records failed to encode under [`EncodingFailurePolicy::RejectChunk`].
    #[error("{} record(s) could not be encoded; chunk not sent", .0.len())]
    Encoding(Vec<EncodingError>),
}

/// Forwards chunks of events to a Splunk TCP data input.
pub struct SplunkTcpSender {
    config: SplunkTcpConfig,
    encoder: BatchEncoder,
    transmitter: Mutex<Transmitter>,
    health: ConnectionHealth,
}

impl SplunkTcpSender {
    /// Construct a sender, rejecting configuration that fails
    /// [`SplunkTcpConfig::validate`].
    ///
    /// No connection is opened until the first non-empty chunk is sent.
    pub fn new(config: SplunkTcpConfig) -> Result<Self, ConfigurationError> {
        let health = ConnectionHealth::new(config.endpoint.to_string(), config.warn_interval);
        Self::with_health(config, health)
    }

    /// Construct a sender whose failure warnings use the supplied clock.
    #[cfg(any(test, feature = "test-util"))]
    pub fn with_time_provider(
        config: SplunkTcpConfig,
        time_provider: TimeProvider,
    ) -> Result<Self, ConfigurationError> {
        let health = ConnectionHealth::with_time_provider(
            config.endpoint.to_string(),
            config.warn_interval,
            time_provider,
        );
        Self::with_health(config, health)
    }

    fn with_health(
        config: SplunkTcpConfig,
        health: ConnectionHealth,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let connection = ConnectionManager::new(&config)?;
        Ok(Self {
            encoder: BatchEncoder::new(config.event_key.clone()),
            transmitter: Mutex::new(Transmitter::new(connection)),
            health,
            config,
        })
    }

    /// Encode `chunk` and write it to the indexer.
    ///
    /// Sends through one sender are serialised, so chunks reach the socket in
    /// call order. On error nothing from this chunk counts as delivered and
    /// the host should re-send it.
    pub fn send(&self, chunk: &Chunk) -> Result<SendReport, SendError> {
        let mut batch = self.encoder.encode(chunk);
        let rejected = batch.take_rejected();
        if !rejected.is_empty() {
            match self.config.encoding_policy {
                EncodingFailurePolicy::RejectChunk => {
                    warn!(
                        "splunk_tcp: rejecting chunk of {} record(s); {} failed to encode, first: {}",
                        chunk.len(),
                        rejected.len(),
                        rejected[0]
                    );
                    return Err(SendError::Encoding(rejected));
                }
                EncodingFailurePolicy::SkipInvalid => {
                    warn!(
                        "splunk_tcp: skipping {} of {} record(s), first: {}",
                        rejected.len(),
                        chunk.len(),
                        rejected[0]
                    );
                }
            }
        }
        if batch.is_empty() {
            debug!("splunk_tcp: nothing to send");
            return Ok(SendReport {
                rejected,
                ..SendReport::default()
            });
        }

        let result = self.transmitter.lock().transmit(&batch);
        match result {
            Ok(()) => {
                self.health.record_success();
                Ok(SendReport {
                    delivered: batch.records(),
                    bytes: batch.as_bytes().len(),
                    rejected,
                })
            }
            Err(err) => {
                self.health.record_failure(&err);
                Err(err.into())
            }
        }
    }

    /// Close the connection; the next send reconnects.
    pub fn close(&self) {
        self.transmitter.lock().close();
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transmitter.lock().connection_state()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    pub fn config(&self) -> &SplunkTcpConfig {
        &self.config
    }
}

impl Drop for SplunkTcpSender {
    fn drop(&mut self) {
        self.transmitter.get_mut().close();
    }
}

impl std::fmt::Debug for SplunkTcpSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplunkTcpSender")
            .field("endpoint", &self.config.endpoint)
            .field("tls", &self.config.uses_tls())
            .field("event_key", &self.config.event_key)
            .finish()
    }
}
