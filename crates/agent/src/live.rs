//! Live mode
//!
//! Consumes an asynchronous record stream until it ends or a shutdown is
//! signalled, annotating sentiment where the source did not, then finalizes.

use futures::{Stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use sop_monitor_compliance::ComplianceReport;
use sop_monitor_config::OrderingMode;
use sop_monitor_core::{Result, SentimentAnnotator, SpeakerRole, Utterance};

use crate::engine::ComplianceEngine;
use crate::source::TranscriptRecord;

/// Live runner options
#[derive(Debug, Clone)]
pub struct LiveOptions {
    /// Speaker label mapping
    pub speaker_labels: BTreeMap<String, SpeakerRole>,
    /// How often the reorder buffer is checked while input is idle
    pub idle_tick: Duration,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            speaker_labels: sop_monitor_config::EngineConfig::default().speaker_labels,
            idle_tick: Duration::from_millis(250),
        }
    }
}

async fn annotate(annotator: &dyn SentimentAnnotator, mut utterance: Utterance) -> Utterance {
    if utterance.sentiment.is_none() && !utterance.is_empty() {
        match annotator.annotate(&utterance.text).await {
            Ok(sentiment) => utterance.sentiment = sentiment,
            Err(e) => tracing::warn!(annotator = annotator.name(), error = %e, "Sentiment annotation failed"),
        }
    }
    utterance
}

/// Run a live session to completion
///
/// Stops at the end of the stream or when `shutdown` turns true, at an
/// utterance boundary, and returns the final report.
pub async fn run_live<S>(
    engine: Arc<ComplianceEngine>,
    mut records: S,
    annotator: Arc<dyn SentimentAnnotator>,
    mut shutdown: watch::Receiver<bool>,
    options: LiveOptions,
) -> ComplianceReport
where
    S: Stream<Item = Result<TranscriptRecord>> + Unpin,
{
    let started = Instant::now();
    let buffered = engine.ordering_mode() == OrderingMode::Buffered;
    let mut idle = tokio::time::interval(options.idle_tick);
    idle.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut shutdown_open = true;

    tracing::info!(session_id = %engine.session_id(), annotator = annotator.name(), "Live session started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown.changed(), if shutdown_open => {
                match changed {
                    Ok(()) if *shutdown.borrow() => {
                        tracing::info!("Shutdown requested, finalizing live session");
                        break;
                    }
                    Ok(()) => {}
                    Err(_) => shutdown_open = false,
                }
            }
            record = records.next() => {
                let Some(record) = record else {
                    tracing::info!("Live input ended");
                    break;
                };

                match record.and_then(|r| r.into_utterance(&options.speaker_labels)) {
                    Ok(utterance) => {
                        let utterance = annotate(annotator.as_ref(), utterance).await;
                        // Ingestion errors are counted by the engine
                        let _ = engine.ingest(utterance);
                    }
                    Err(e) => engine.record_skipped(None, &e),
                }
            }
            _ = idle.tick(), if buffered => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let released = engine.tick(elapsed_ms);
                if !released.is_empty() {
                    tracing::debug!(released = released.len(), "Released buffered utterances");
                }
            }
        }
    }

    engine.finalize()
}
