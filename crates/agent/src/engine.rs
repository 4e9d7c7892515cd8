//! Compliance Engine
//!
//! One mutual-exclusion boundary around session state, tracker and reorder
//! buffer. Each utterance is validated, ordered, appended and evaluated while
//! the lock is held, so readers only ever see whole utterances applied.

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use sop_monitor_compliance::{
    ComplianceReport, ComplianceTracker, InfoEvidence, LiveScore, ProhibitedPhraseHit, ReportMeta,
    SessionState, TrackerUpdate,
};
use sop_monitor_config::{default_sop, EngineConfig, OrderingMode, SopRules};
use sop_monitor_core::{
    CustomerIdentity, Error, InfoCategory, PhaseKind, Result, SpeakerRole, Utterance, UtteranceRef,
};

use crate::reorder::ReorderBuffer;

/// Engine event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ComplianceEvent {
    /// Utterance appended to the session
    UtteranceIngested {
        seq: usize,
        speaker: SpeakerRole,
        timestamp_ms: u64,
    },
    /// Criterion committed to a phase
    CriterionSatisfied {
        phase: PhaseKind,
        criterion: String,
        utterance: UtteranceRef,
    },
    /// Prohibited phrase used by the agent
    ProhibitedPhrase { hit: ProhibitedPhraseHit },
    /// Required information collected
    InfoCollected {
        category: InfoCategory,
        evidence: Option<InfoEvidence>,
    },
    /// Utterance rejected without affecting the session
    UtteranceSkipped { timestamp_ms: Option<u64>, reason: String },
    /// Session finalized
    Finalized { overall_score: f32 },
}

struct EngineState {
    session: SessionState,
    tracker: ComplianceTracker,
    reorder: Option<ReorderBuffer>,
    skipped: usize,
    report: Option<ComplianceReport>,
}

impl EngineState {
    fn meta(&self, session_id: &str) -> ReportMeta {
        ReportMeta::new(session_id).with_skipped(self.skipped)
    }

    fn skip(&mut self, timestamp_ms: Option<u64>, error: &Error, events: &mut Vec<ComplianceEvent>) {
        self.skipped += 1;
        tracing::warn!(?timestamp_ms, error = %error, "Skipping utterance");
        events.push(ComplianceEvent::UtteranceSkipped {
            timestamp_ms,
            reason: error.to_string(),
        });
    }

    /// Append and evaluate one ordered utterance
    fn apply(&mut self, utterance: Utterance, events: &mut Vec<ComplianceEvent>) -> Result<UtteranceRef> {
        let seq = self.session.ingest(utterance)?;
        let entry = &self.session.transcript()[seq];

        events.push(ComplianceEvent::UtteranceIngested {
            seq,
            speaker: entry.role(),
            timestamp_ms: entry.utterance.timestamp_ms,
        });

        let update = self.tracker.process(entry, &self.session);
        let reference = entry.reference();
        push_update(update, events);
        Ok(reference)
    }

    /// Apply released utterances, skipping the ones the session rejects
    fn apply_released(&mut self, released: Vec<Utterance>, events: &mut Vec<ComplianceEvent>) -> Vec<UtteranceRef> {
        let mut applied = Vec::with_capacity(released.len());
        for utterance in released {
            let timestamp_ms = utterance.timestamp_ms;
            match self.apply(utterance, events) {
                Ok(reference) => applied.push(reference),
                Err(e) => self.skip(Some(timestamp_ms), &e, events),
            }
        }
        applied
    }
}

fn push_update(update: TrackerUpdate, events: &mut Vec<ComplianceEvent>) {
    for (phase, m) in update.newly_satisfied {
        events.push(ComplianceEvent::CriterionSatisfied {
            phase,
            criterion: m.criterion,
            utterance: m.utterance,
        });
    }
    for hit in update.hits {
        events.push(ComplianceEvent::ProhibitedPhrase { hit });
    }
    for (category, status) in update.collected {
        events.push(ComplianceEvent::InfoCollected {
            category,
            evidence: status.evidence,
        });
    }
}

/// Streaming compliance engine for one conversation
pub struct ComplianceEngine {
    session_id: String,
    mode: OrderingMode,
    state: Mutex<EngineState>,
    event_tx: broadcast::Sender<ComplianceEvent>,
}

impl ComplianceEngine {
    /// Create an engine; fails if the rule set cannot be compiled
    pub fn new(sop: &SopRules, config: &EngineConfig) -> Result<Self> {
        Self::builder(config.clone()).sop(sop.clone()).build()
    }

    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<ComplianceEvent> {
        self.event_tx.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn ordering_mode(&self) -> OrderingMode {
        self.mode
    }

    /// Supply or replace the known customer name
    pub fn set_customer_name(&self, name: Option<&str>) {
        self.state.lock().tracker.set_customer_name(name);
    }

    /// Ingest one utterance
    ///
    /// Returns the utterances evaluated by this call: the utterance itself in
    /// strict mode, or whatever the reorder buffer released in buffered mode.
    /// Malformed and out-of-order utterances are counted as skipped and the
    /// error is returned to the caller; the session carries on.
    pub fn ingest(&self, utterance: Utterance) -> Result<Vec<UtteranceRef>> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            self.ingest_locked(&mut state, utterance, &mut events)
        };
        self.publish(events);
        result
    }

    fn ingest_locked(
        &self,
        state: &mut EngineState,
        utterance: Utterance,
        events: &mut Vec<ComplianceEvent>,
    ) -> Result<Vec<UtteranceRef>> {
        if state.report.is_some() {
            return Err(Error::SessionFinalized);
        }

        let timestamp_ms = utterance.timestamp_ms;
        if let Err(e) = utterance.validate() {
            state.skip(Some(timestamp_ms), &e, events);
            return Err(e);
        }

        match state.reorder.as_mut() {
            None => match state.apply(utterance, events) {
                Ok(reference) => Ok(vec![reference]),
                Err(e) => {
                    state.skip(Some(timestamp_ms), &e, events);
                    Err(e)
                }
            },
            Some(buffer) => {
                if let Err(e) = buffer.push(utterance) {
                    state.skip(Some(timestamp_ms), &e, events);
                    return Err(e);
                }
                let released = buffer.drain_ready();
                Ok(state.apply_released(released, events))
            }
        }
    }

    /// Record a record that never became an utterance (undecodable input)
    pub fn record_skipped(&self, timestamp_ms: Option<u64>, error: &Error) {
        let mut events = Vec::new();
        self.state.lock().skip(timestamp_ms, error, &mut events);
        self.publish(events);
    }

    /// Release buffered utterances up to `now_ms - reorder_window`
    ///
    /// `now_ms` is session time on the same clock as utterance timestamps.
    /// A no-op in strict mode.
    pub fn tick(&self, now_ms: u64) -> Vec<UtteranceRef> {
        let mut events = Vec::new();
        let applied = {
            let mut state = self.state.lock();
            if state.report.is_some() {
                return Vec::new();
            }
            match state.reorder.as_mut() {
                Some(buffer) => {
                    let watermark = now_ms.saturating_sub(buffer.window_ms());
                    let released = buffer.drain_until(watermark);
                    state.apply_released(released, &mut events)
                }
                None => Vec::new(),
            }
        };
        self.publish(events);
        applied
    }

    /// Consistent partial report
    pub fn snapshot(&self) -> ComplianceReport {
        let state = self.state.lock();
        match &state.report {
            Some(report) => report.clone(),
            None => state.tracker.report(&state.session, &state.meta(&self.session_id)),
        }
    }

    /// Committed live score
    pub fn score(&self) -> LiveScore {
        self.state.lock().tracker.score()
    }

    /// Utterances ingested so far
    pub fn utterances(&self) -> usize {
        self.state.lock().session.len()
    }

    pub fn skipped(&self) -> usize {
        self.state.lock().skipped
    }

    /// Utterances held in the reorder buffer
    pub fn pending(&self) -> usize {
        self.state.lock().reorder.as_ref().map_or(0, ReorderBuffer::len)
    }

    pub fn is_finalized(&self) -> bool {
        self.state.lock().report.is_some()
    }

    /// Produce the final report from whatever state exists
    ///
    /// Flushes the reorder buffer and commits the closing window. Later calls
    /// return the same report.
    pub fn finalize(&self) -> ComplianceReport {
        let mut events = Vec::new();
        let report = {
            let mut state = self.state.lock();
            if let Some(report) = &state.report {
                return report.clone();
            }

            if let Some(buffer) = state.reorder.as_mut() {
                let released = buffer.flush();
                state.apply_released(released, &mut events);
            }

            let update = state.tracker.finalize();
            push_update(update, &mut events);

            let report = state.tracker.report(&state.session, &state.meta(&self.session_id));
            state.report = Some(report.clone());
            report
        };

        tracing::info!(
            session_id = %self.session_id,
            utterances = report.total_utterances,
            skipped = report.skipped_utterances,
            overall_score = report.overall_score,
            "Session finalized"
        );
        events.push(ComplianceEvent::Finalized {
            overall_score: report.overall_score,
        });
        self.publish(events);
        report
    }

    fn publish(&self, events: Vec<ComplianceEvent>) {
        for event in events {
            // No subscribers is fine
            let _ = self.event_tx.send(event);
        }
    }
}

/// Builder for [`ComplianceEngine`]
pub struct EngineBuilder {
    config: EngineConfig,
    sop: Option<SopRules>,
    customer_name: Option<String>,
    session_id: Option<String>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            sop: None,
            customer_name: None,
            session_id: None,
        }
    }

    /// Rule set; the built-in SOP when not given
    pub fn sop(mut self, sop: SopRules) -> Self {
        self.sop = Some(sop);
        self
    }

    pub fn customer(mut self, identity: &dyn CustomerIdentity) -> Self {
        self.customer_name = identity.customer_name();
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn build(self) -> Result<ComplianceEngine> {
        let sop = self.sop.unwrap_or_else(default_sop);
        let mut tracker = ComplianceTracker::new(&sop, &self.config)?;
        tracker.set_customer_name(self.customer_name.as_deref());

        let ordering = &self.config.ordering;
        let reorder = match ordering.mode {
            OrderingMode::Strict => None,
            OrderingMode::Buffered => Some(ReorderBuffer::new(ordering.reorder_window_ms)),
        };

        let session_id = self.session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let (event_tx, _) = broadcast::channel(self.config.event_capacity.max(1));

        tracing::info!(
            session_id = %session_id,
            sop_version = %sop.version,
            mode = ?ordering.mode,
            "Created compliance session"
        );

        Ok(ComplianceEngine {
            session_id,
            mode: ordering.mode,
            state: Mutex::new(EngineState {
                session: SessionState::new(ordering.tolerance_ms),
                tracker,
                reorder,
                skipped: 0,
                report: None,
            }),
            event_tx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sop_monitor_core::KnownCustomer;

    fn strict() -> ComplianceEngine {
        ComplianceEngine::builder(EngineConfig::default())
            .session_id("test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_strict_out_of_order_is_skipped() {
        let engine = strict();
        engine.ingest(Utterance::agent("Hello", 1000)).unwrap();

        let err = engine.ingest(Utterance::customer("earlier", 500)).unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert_eq!(engine.skipped(), 1);
        assert_eq!(engine.utterances(), 1);

        assert!(engine.ingest(Utterance::customer("later", 1500)).is_ok());
        assert_eq!(engine.snapshot().skipped_utterances, 1);
    }

    #[test]
    fn test_malformed_is_skipped() {
        let engine = strict();
        let err = engine.ingest(Utterance::agent("  ", 0)).unwrap_err();
        assert!(matches!(err, Error::MalformedUtterance(_)));
        assert_eq!(engine.skipped(), 1);
        assert_eq!(engine.utterances(), 0);
    }

    #[test]
    fn test_finalize_is_terminal() {
        let engine = ComplianceEngine::builder(EngineConfig::default())
            .customer(&KnownCustomer("John".to_string()))
            .build()
            .unwrap();
        engine.ingest(Utterance::agent("Hello John, how can I help you today?", 0)).unwrap();

        let first = engine.finalize();
        assert!(first.finalized);
        assert!(first.phases[0].satisfied);
        assert!(matches!(engine.ingest(Utterance::agent("more", 10)), Err(Error::SessionFinalized)));
        assert_eq!(engine.finalize(), first);
        assert_eq!(engine.snapshot(), first);
    }

    #[test]
    fn test_duplicate_phase_keys_fail_to_build() {
        let mut sop = default_sop();
        let greeting = sop.phases["greeting"].clone();
        sop.phases.insert("greeting_protocol".to_string(), greeting);

        let err = ComplianceEngine::builder(EngineConfig::default()).sop(sop).build().err().unwrap();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_generated_session_id() {
        let engine = ComplianceEngine::new(&default_sop(), &EngineConfig::default()).unwrap();
        assert_eq!(engine.session_id().len(), 36);
    }

    #[test]
    fn test_buffered_tick_releases() {
        let mut config = EngineConfig::default();
        config.ordering.mode = OrderingMode::Buffered;
        config.ordering.reorder_window_ms = 1000;
        let engine = ComplianceEngine::builder(config).build().unwrap();

        assert!(engine.ingest(Utterance::agent("Hello", 100)).unwrap().is_empty());
        assert_eq!(engine.pending(), 1);

        assert!(engine.tick(500).is_empty());
        let released = engine.tick(1200);
        assert_eq!(released.len(), 1);
        assert_eq!(engine.pending(), 0);
        assert_eq!(engine.utterances(), 1);
    }
}
