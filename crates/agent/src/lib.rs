//! Streaming compliance engine
//!
//! Features:
//! - Single lock around session state and tracker, one utterance at a time
//! - Strict or buffered (reorder window) ingestion ordering
//! - Event broadcast for live observers
//! - Finalize-now cancellation for live sessions
//! - Batch replay of recorded transcripts and live JSON-lines streams

pub mod batch;
pub mod engine;
pub mod live;
pub mod reorder;
pub mod source;

pub use batch::run_batch;
pub use engine::{ComplianceEngine, ComplianceEvent, EngineBuilder};
pub use live::{run_live, LiveOptions};
pub use reorder::ReorderBuffer;
pub use source::{decode_line, parse_transcript, record_stream, resolve_speaker, SentimentRecord, TranscriptRecord};
