//! Stream buffer contract (`spec.md` §3 / §5) — the external collaborator
//! that owns the raw record queue. Connection handling, record-message
//! parsing off the wire, and buffer backpressure are all the host's
//! concern; this core only ever reads through this trait.

use serde_json::{Map, Value};

use crate::record::RecordMessage;

/// What `write_batch` needs from a stream's pending-record queue.
pub trait StreamBuffer {
    /// Number of record messages currently buffered.
    fn count(&self) -> usize;

    /// A snapshot of the buffered messages, in arrival order. Does not
    /// drain the buffer — see [`StreamBuffer::flush_buffer`].
    fn peek_buffer(&self) -> Vec<RecordMessage>;

    /// Drop everything `peek_buffer` would have returned. Called only
    /// after a batch commits successfully.
    fn flush_buffer(&mut self);

    fn stream(&self) -> &str;

    fn key_properties(&self) -> &[String];

    /// The top-level record schema's `properties` object.
    fn schema_properties(&self) -> &Map<String, Value>;

    fn use_uuid_pk(&self) -> bool;
}

/// An in-memory [`StreamBuffer`], useful as a test fixture and as a
/// reference implementation for hosts that don't need a persistent queue.
#[derive(Debug, Clone)]
pub struct VecBuffer {
    stream: String,
    key_properties: Vec<String>,
    schema_properties: Map<String, Value>,
    use_uuid_pk: bool,
    records: Vec<RecordMessage>,
}

impl VecBuffer {
    pub fn new(
        stream: impl Into<String>,
        key_properties: Vec<String>,
        schema_properties: Map<String, Value>,
        use_uuid_pk: bool,
    ) -> Self {
        VecBuffer {
            stream: stream.into(),
            key_properties,
            schema_properties,
            use_uuid_pk,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: RecordMessage) {
        self.records.push(record);
    }
}

impl StreamBuffer for VecBuffer {
    fn count(&self) -> usize {
        self.records.len()
    }

    fn peek_buffer(&self) -> Vec<RecordMessage> {
        self.records.clone()
    }

    fn flush_buffer(&mut self) {
        self.records.clear();
    }

    fn stream(&self) -> &str {
        &self.stream
    }

    fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    fn schema_properties(&self) -> &Map<String, Value> {
        &self.schema_properties
    }

    fn use_uuid_pk(&self) -> bool {
        self.use_uuid_pk
    }
}
