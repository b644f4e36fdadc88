//! Event model handed to the sender by the host.
//!
//! A [`Record`] is a flat mapping from field name to JSON value. The host
//! stamps each record with a Unix timestamp, producing an [`Event`], and groups
//! events into a [`Chunk`] that forms one flush unit. Chunk order is the order
//! in which lines reach the indexer.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field mapping produced by the host for one log event.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any previous value stored under `key`.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Look up a field by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying field map.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// A record paired with the Unix time (seconds) at which the host emitted it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: i64,
    pub record: Record,
}

impl Event {
    /// Pair `record` with an explicit emission time.
    pub fn new(time: i64, record: Record) -> Self {
        Self { time, record }
    }

    /// Stamp `record` with the current wall-clock time.
    pub fn now(record: Record) -> Self {
        Self::new(chrono::Utc::now().timestamp(), record)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} field(s)", self.time, self.record.len())
    }
}

/// Ordered batch of events delivered in a single flush.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chunk {
    events: Vec<Event>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event to the end of the chunk.
    pub fn push(&mut self, time: i64, record: Record) {
        self.events.push(Event::new(time, record));
    }

    /// Builder-style variant of [`Chunk::push`].
    pub fn with_event(mut self, time: i64, record: Record) -> Self {
        self.push(time, record);
        self
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Iterate over events in emission order.
    pub fn iter(&self) -> std::slice::Iter<'_, Event> {
        self.events.iter()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

impl From<Vec<Event>> for Chunk {
    fn from(events: Vec<Event>) -> Self {
        Self { events }
    }
}

impl FromIterator<Event> for Chunk {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Chunk {
    type Item = &'a Event;
    type IntoIter = std::slice::Iter<'a, Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
