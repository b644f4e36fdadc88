//! Line-delimited batch encoding.
//!
//! Each event contributes the payload stored under the configured event key,
//! terminated by `\n`. String payloads are copied verbatim; other JSON values
//! are written in compact form. Records that cannot form exactly one line are
//! reported individually and left out of the batch.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::event::{Chunk, Record};

const LINE_DELIMITER: u8 = b'\n';

/// What the sender does with a chunk containing records that failed to encode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingFailurePolicy {
    /// Drop the offending records and deliver the rest.
    #[default]
    SkipInvalid,
    /// Fail the whole chunk without transmitting anything.
    RejectChunk,
}

/// Reason a single record could not be encoded.
#[derive(Debug, Error)]
pub enum EncodingErrorKind {
    #[error("field `{0}` is missing")]
    MissingField(String),
    #[error("field `{0}` is null")]
    NullPayload(String),
    #[error("field `{0}` is an empty string")]
    EmptyPayload(String),
    #[error("field `{0}` contains a line delimiter")]
    EmbeddedNewline(String),
    #[error("field `{key}` could not be serialised: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-record encoding failure; `index` is the record's position in its chunk.
#[derive(Debug, Error)]
#[error("record {index}: {kind}")]
pub struct EncodingError {
    pub index: usize,
    pub kind: EncodingErrorKind,
}

/// Byte stream ready for transmission, plus the records left out of it.
#[derive(Debug, Default)]
pub struct EncodedBatch {
    bytes: Vec<u8>,
    records: usize,
    rejected: Vec<EncodingError>,
}

impl EncodedBatch {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of lines contained in the batch.
    pub fn records(&self) -> usize {
        self.records
    }

    pub fn rejected(&self) -> &[EncodingError] {
        &self.rejected
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn take_rejected(&mut self) -> Vec<EncodingError> {
        std::mem::take(&mut self.rejected)
    }
}

/// Converts chunks into newline-delimited payload streams.
#[derive(Clone, Debug)]
pub struct BatchEncoder {
    event_key: String,
}

impl BatchEncoder {
    pub fn new(event_key: impl Into<String>) -> Self {
        Self {
            event_key: event_key.into(),
        }
    }

    pub fn event_key(&self) -> &str {
        &self.event_key
    }

    /// Encode every event of `chunk` in order.
    pub fn encode(&self, chunk: &Chunk) -> EncodedBatch {
        let mut batch = EncodedBatch {
            bytes: Vec::with_capacity(self.estimate_capacity(chunk)),
            ..EncodedBatch::default()
        };
        for (index, event) in chunk.iter().enumerate() {
            match self.append_line(&event.record, &mut batch.bytes) {
                Ok(()) => batch.records += 1,
                Err(kind) => batch.rejected.push(EncodingError { index, kind }),
            }
        }
        batch
    }

    fn append_line(&self, record: &Record, out: &mut Vec<u8>) -> Result<(), EncodingErrorKind> {
        let key = &self.event_key;
        let payload = record
            .get(key)
            .ok_or_else(|| EncodingErrorKind::MissingField(key.clone()))?;
        match payload {
            Value::Null => return Err(EncodingErrorKind::NullPayload(key.clone())),
            Value::String(line) if line.is_empty() => {
                return Err(EncodingErrorKind::EmptyPayload(key.clone()));
            }
            Value::String(line) if line.as_bytes().contains(&LINE_DELIMITER) => {
                return Err(EncodingErrorKind::EmbeddedNewline(key.clone()));
            }
            Value::String(line) => out.extend_from_slice(line.as_bytes()),
            other => {
                let start = out.len();
                if let Err(source) = serde_json::to_writer(&mut *out, other) {
                    out.truncate(start);
                    return Err(EncodingErrorKind::Serialize {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }
        out.push(LINE_DELIMITER);
        Ok(())
    }

    fn estimate_capacity(&self, chunk: &Chunk) -> usize {
        chunk
            .iter()
            .filter_map(|event| match event.record.get(&self.event_key) {
                Some(Value::String(line)) => Some(line.len() + 1),
                _ => None,
            })
            .sum()
    }
}
