//! Output layer: NDJSON record construction and the durable file sink.

pub mod record;
pub mod sink;

pub use record::{OutputRecord, RecordBody, RecordBuilder, to_iso8601};
pub use sink::{BatchWriter, DurableSink, SinkOutcome};
