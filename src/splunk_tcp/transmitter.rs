//! Writes encoded batches to the indexer connection.
//!
//! A transmission either hands every byte of the batch to the socket or
//! fails as a whole. There is no retry here; the host re-sends the chunk.

use std::io;

use log::debug;
use thiserror::Error;

use super::{
    encoder::EncodedBatch,
    transport::{ConnectionError, ConnectionManager, ConnectionState},
};

/// Step at which a transmission failed.
#[derive(Debug, Error)]
pub enum TransmissionCause {
    #[error(transparent)]
    Connect(#[from] ConnectionError),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// Whole-chunk transmission failure. Nothing from the attempt counts as delivered.
#[derive(Debug, Error)]
#[error("failed to transmit {attempted} record(s): {cause}")]
pub struct TransmissionError {
    attempted: usize,
    #[source]
    cause: TransmissionCause,
}

impl TransmissionError {
    pub fn new(attempted: usize, cause: TransmissionCause) -> Self {
        Self { attempted, cause }
    }

    /// Records that were part of the failed attempt.
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    /// Records delivered by the failed attempt; always zero.
    pub fn delivered(&self) -> usize {
        0
    }

    pub fn cause(&self) -> &TransmissionCause {
        &self.cause
    }

    /// Whether the failure happened while dialling or handshaking.
    pub fn is_connection_error(&self) -> bool {
        matches!(self.cause, TransmissionCause::Connect(_))
    }
}

/// Sequentially transmits batches over one managed connection.
#[derive(Debug)]
pub struct Transmitter {
    connection: ConnectionManager,
}

impl Transmitter {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Deliver `batch`, connecting first if needed.
    pub fn transmit(&mut self, batch: &EncodedBatch) -> Result<(), TransmissionError> {
        if batch.is_empty() {
            return Ok(());
        }
        let attempted = batch.records();
        self.connection
            .ensure_connected()
            .map_err(|err| TransmissionError::new(attempted, err.into()))?;
        self.connection
            .write_all(batch.as_bytes())
            .map_err(|err| TransmissionError::new(attempted, TransmissionCause::Write(err)))?;
        debug!(
            "splunk_tcp: wrote {attempted} record(s), {} bytes to {}",
            batch.as_bytes().len(),
            self.connection.endpoint()
        );
        Ok(())
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn close(&mut self) {
        self.connection.close();
    }
}
