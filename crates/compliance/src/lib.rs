//! Streaming SOP compliance evaluation
//!
//! This crate provides the stateful core of the monitor:
//! - **Session State**: append-only transcript with speaker and sentiment tallies
//! - **Phase Rule Engine**: one evaluator per SOP phase, matching agent utterances
//! - **Compliance Tracker**: ratchets phase criteria, records prohibited phrases,
//!   collects required information and keeps a live score
//! - **Report Builder**: renders tracker state into a serializable report
//!
//! # Example
//!
//! ```
//! use sop_monitor_compliance::{ComplianceTracker, ReportMeta, SessionState};
//! use sop_monitor_config::{default_sop, EngineConfig};
//! use sop_monitor_core::Utterance;
//!
//! let mut session = SessionState::new(0);
//! let mut tracker = ComplianceTracker::new(&default_sop(), &EngineConfig::default()).unwrap();
//! tracker.set_customer_name(Some("John"));
//!
//! let seq = session.ingest(Utterance::agent("Hello John, how can I help you today?", 0)).unwrap();
//! tracker.process(&session.transcript()[seq], &session);
//!
//! let report = tracker.report(&session, &ReportMeta::new("demo"));
//! assert_eq!(report.phases[0].satisfied_criteria, 3);
//! ```

pub mod patterns;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod session;
pub mod tracker;

pub use patterns::{normalize_text, NameMatcher, PatternSet, PhrasePattern};
pub use report::{build_report, ComplianceReport, PhaseReport, ReportMeta, SpeakerSummary};
pub use rules::{
    build_phase_rules, ClosingRule, Commitment, CriteriaMatcher, CriterionMatch, CriterionSpec,
    EvaluationContext, GreetingRule, PhaseRule, ProblemIdentificationRule, SolutionStepsRule,
};
pub use scanner::{InfoEvidence, ProhibitedPhraseHit, ProhibitedPhraseScanner, RequiredInfoExtractor, RequiredInfoStatus};
pub use session::{SentimentDistribution, SessionState};
pub use tracker::{ComplianceTracker, Criterion, LiveScore, PhaseStatus, TrackerUpdate};
