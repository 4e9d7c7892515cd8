//! Report Builder
//!
//! Pure rendering of tracker state. Calling [`build_report`] twice on the same
//! inputs yields identical reports; no wall-clock data is included.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use sop_monitor_core::{InfoCategory, PhaseKind, SpeakerRole, UtteranceRef};

use crate::scanner::{ProhibitedPhraseHit, RequiredInfoStatus};
use crate::session::{SentimentDistribution, SessionState};
use crate::tracker::{Criterion, PhaseStatus};

/// Report identity and engine-level annotations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportMeta {
    pub session_id: String,
    pub sop_version: String,
    pub finalized: bool,
    pub skipped_utterances: usize,
}

impl ReportMeta {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    pub fn with_sop_version(mut self, version: impl Into<String>) -> Self {
        self.sop_version = version.into();
        self
    }

    pub fn with_finalized(mut self, finalized: bool) -> Self {
        self.finalized = finalized;
        self
    }

    pub fn with_skipped(mut self, skipped: usize) -> Self {
        self.skipped_utterances = skipped;
        self
    }
}

/// Phase section of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: PhaseKind,
    pub phase_name: String,
    pub satisfied: bool,
    pub satisfied_criteria: usize,
    pub total_criteria: usize,
    pub score: f32,
    pub criteria: Vec<Criterion>,
    /// Utterances that satisfied a criterion, in transcript order
    pub evidence: Vec<UtteranceRef>,
    /// Closing-tail matches not yet committed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provisional: Vec<String>,
}

impl PhaseReport {
    fn from_status(status: &PhaseStatus) -> Self {
        let evidence: BTreeSet<UtteranceRef> = status.evidence().values().copied().collect();
        Self {
            phase: status.phase(),
            phase_name: status.phase().display_name().to_string(),
            satisfied: status.satisfied(),
            satisfied_criteria: status.satisfied_criteria(),
            total_criteria: status.total_criteria(),
            score: status.score(),
            criteria: status.criteria(),
            evidence: evidence.into_iter().collect(),
            provisional: status.provisional(),
        }
    }
}

/// Utterance and sentiment totals for one speaker role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerSummary {
    pub role: SpeakerRole,
    pub utterances: usize,
    pub sentiment: SentimentDistribution,
}

/// Structured compliance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub session_id: String,
    pub sop_version: String,
    pub finalized: bool,
    pub phases: Vec<PhaseReport>,
    pub overall_score: f32,
    pub prohibited_phrases: Vec<ProhibitedPhraseHit>,
    pub required_info: BTreeMap<InfoCategory, RequiredInfoStatus>,
    pub sentiment: SentimentDistribution,
    pub speakers: Vec<SpeakerSummary>,
    pub total_utterances: usize,
    pub skipped_utterances: usize,
}

impl ComplianceReport {
    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == kind)
    }

    /// Number of required-information categories collected
    pub fn collected_info(&self) -> usize {
        self.required_info.values().filter(|s| s.collected).count()
    }

    pub fn to_json(&self, pretty: bool) -> serde_json::Result<String> {
        if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}

/// Render a report from session and tracker state
pub fn build_report(
    session: &SessionState,
    phases: &BTreeMap<PhaseKind, PhaseStatus>,
    hits: &[ProhibitedPhraseHit],
    required_info: &BTreeMap<InfoCategory, RequiredInfoStatus>,
    meta: &ReportMeta,
) -> ComplianceReport {
    let phases: Vec<PhaseReport> = phases.values().map(PhaseReport::from_status).collect();
    let overall_score = match phases.len() {
        0 => 0.0,
        n => phases.iter().map(|p| p.score).sum::<f32>() / n as f32,
    };

    let speakers = SpeakerRole::ALL
        .into_iter()
        .filter(|role| session.speaker_count(*role) > 0)
        .map(|role| SpeakerSummary {
            role,
            utterances: session.speaker_count(role),
            sentiment: session.speaker_sentiment(role),
        })
        .collect();

    ComplianceReport {
        session_id: meta.session_id.clone(),
        sop_version: meta.sop_version.clone(),
        finalized: meta.finalized,
        phases,
        overall_score,
        prohibited_phrases: hits.to_vec(),
        required_info: required_info.clone(),
        sentiment: *session.sentiment_distribution(),
        speakers,
        total_utterances: session.len(),
        skipped_utterances: meta.skipped_utterances,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::ComplianceTracker;
    use sop_monitor_config::{default_sop, EngineConfig};
    use sop_monitor_core::{SentimentLabel, Utterance};

    fn conversation() -> (SessionState, ComplianceTracker) {
        let mut session = SessionState::new(0);
        let mut tracker = ComplianceTracker::new(&default_sop(), &EngineConfig::default()).unwrap();
        tracker.set_customer_name(Some("Maria Lopez"));

        let turns = [
            Utterance::agent("Hi Maria, how may I help you today?", 0),
            Utterance::customer("My order #55512 arrived damaged", 3_000).with_sentiment(SentimentLabel::Negative, 0.92),
            Utterance::agent("I'm so sorry, that must be frustrating. Calm down, please.", 6_000),
            Utterance::agent("Could you please provide photos of the damage?", 9_000),
            Utterance::customer("Sure, sending them now", 12_000).with_sentiment(SentimentLabel::Neutral, 0.6),
            Utterance::agent("Thank you. Anything else I can help with?", 15_000),
        ];
        for u in turns {
            let seq = session.ingest(u).unwrap();
            tracker.process(&session.transcript()[seq], &session);
        }
        (session, tracker)
    }

    #[test]
    fn test_report_is_idempotent() {
        let (session, mut tracker) = conversation();
        tracker.finalize();

        let meta = ReportMeta::new("call-7").with_skipped(1);
        let first = tracker.report(&session, &meta);
        let second = tracker.report(&session, &meta);

        assert_eq!(first, second);
        assert_eq!(first.to_json(false).unwrap(), second.to_json(false).unwrap());
    }

    #[test]
    fn test_report_contents() {
        let (session, mut tracker) = conversation();

        let live = tracker.report(&session, &ReportMeta::new("call-7"));
        assert!(!live.finalized);
        assert_eq!(live.phase(PhaseKind::Closing).unwrap().satisfied_criteria, 0);
        assert_eq!(
            live.phase(PhaseKind::Closing).unwrap().provisional,
            vec!["thank_customer".to_string(), "offer_further_help".to_string()]
        );

        tracker.finalize();
        let report = tracker.report(&session, &ReportMeta::new("call-7").with_skipped(2));

        assert!(report.finalized);
        assert_eq!(report.sop_version, default_sop().version);
        assert_eq!(report.total_utterances, 6);
        assert_eq!(report.skipped_utterances, 2);
        assert_eq!(report.phases.len(), 4);
        assert!(report.phase(PhaseKind::Greeting).unwrap().satisfied);
        assert_eq!(report.phase(PhaseKind::Closing).unwrap().satisfied_criteria, 2);

        assert_eq!(report.prohibited_phrases.len(), 1);
        assert_eq!(report.prohibited_phrases[0].phrase, "calm down");
        assert_eq!(report.prohibited_phrases[0].timestamp_ms, 6_000);

        assert!(report.required_info[&InfoCategory::OrderNumber].collected);
        assert_eq!(report.required_info.len(), 4);

        assert_eq!(report.sentiment.negative, 1);
        assert_eq!(report.sentiment.unlabeled, 4);
        assert_eq!(report.speakers.len(), 2);
        assert_eq!(report.speakers[0].role, SpeakerRole::Agent);
        assert_eq!(report.speakers[0].utterances, 4);

        let expected = report.phases.iter().map(|p| p.score).sum::<f32>() / 4.0;
        assert!((report.overall_score - expected).abs() < f32::EPSILON);
    }

    #[test]
    fn test_report_serializes_category_keys() {
        let (session, tracker) = conversation();
        let json = tracker.report(&session, &ReportMeta::new("s")).to_json(false).unwrap();
        assert!(json.contains("\"ORDER_NUMBER\""));
        assert!(json.contains("\"phase\":\"greeting\""));
    }
}
