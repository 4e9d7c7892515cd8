//! Batch mode
//!
//! Completed transcripts are replayed synchronously through the engine.

use std::collections::BTreeMap;

use sop_monitor_compliance::ComplianceReport;
use sop_monitor_core::{Result, SpeakerRole};

use crate::engine::ComplianceEngine;
use crate::source::TranscriptRecord;

/// Replay records in order and finalize
///
/// Undecodable, malformed and out-of-order records are skipped; the report
/// carries the skipped count.
pub fn run_batch<I>(engine: &ComplianceEngine, records: I, labels: &BTreeMap<String, SpeakerRole>) -> ComplianceReport
where
    I: IntoIterator<Item = Result<TranscriptRecord>>,
{
    for record in records {
        let utterance = match record.and_then(|r| r.into_utterance(labels)) {
            Ok(utterance) => utterance,
            Err(e) => {
                engine.record_skipped(None, &e);
                continue;
            }
        };

        // Ingestion errors are counted by the engine
        let _ = engine.ingest(utterance);
    }

    engine.finalize()
}
