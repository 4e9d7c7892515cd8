//! Compliance Tracker
//!
//! Runs the phase evaluators, the prohibited-phrase scanner and the
//! required-information extractor against each ingested utterance and keeps
//! the ratcheted phase status.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use sop_monitor_config::{ConfigError, EngineConfig, SopRules};
use sop_monitor_core::{InfoCategory, PhaseKind, TranscriptEntry, UtteranceRef};

use crate::patterns::{normalize_text, NameMatcher};
use crate::report::{build_report, ComplianceReport, ReportMeta};
use crate::rules::{build_phase_rules, Commitment, CriterionMatch, CriterionSpec, EvaluationContext, PhaseRule};
use crate::scanner::{ProhibitedPhraseHit, ProhibitedPhraseScanner, RequiredInfoExtractor, RequiredInfoStatus};
use crate::session::SessionState;

/// Criterion with its current satisfaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub description: String,
    pub satisfied: bool,
}

/// Satisfaction state of one phase
///
/// `satisfied` only ever grows. Provisional matches (closing tail) are kept
/// apart and do not count towards the score until committed.
#[derive(Debug, Clone)]
pub struct PhaseStatus {
    phase: PhaseKind,
    criteria: Vec<CriterionSpec>,
    satisfied: BTreeSet<String>,
    evidence: BTreeMap<String, UtteranceRef>,
    provisional: Vec<CriterionMatch>,
}

impl PhaseStatus {
    pub fn new(phase: PhaseKind, criteria: Vec<CriterionSpec>) -> Self {
        Self {
            phase,
            criteria,
            satisfied: BTreeSet::new(),
            evidence: BTreeMap::new(),
            provisional: Vec::new(),
        }
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    pub fn criteria(&self) -> Vec<Criterion> {
        self.criteria
            .iter()
            .map(|spec| Criterion {
                id: spec.id.clone(),
                description: spec.description.clone(),
                satisfied: self.satisfied.contains(&spec.id),
            })
            .collect()
    }

    pub fn total_criteria(&self) -> usize {
        self.criteria.len()
    }

    pub fn satisfied_criteria(&self) -> usize {
        self.satisfied.len()
    }

    pub fn is_criterion_satisfied(&self, id: &str) -> bool {
        self.satisfied.contains(id)
    }

    /// All criteria satisfied
    pub fn satisfied(&self) -> bool {
        !self.criteria.is_empty() && self.satisfied.len() == self.criteria.len()
    }

    /// Fraction of satisfied criteria
    pub fn score(&self) -> f32 {
        match self.criteria.len() {
            0 => 0.0,
            total => self.satisfied.len() as f32 / total as f32,
        }
    }

    /// Utterance that first satisfied each criterion
    pub fn evidence(&self) -> &BTreeMap<String, UtteranceRef> {
        &self.evidence
    }

    /// Provisional criterion ids not yet committed
    pub fn provisional(&self) -> Vec<String> {
        self.provisional
            .iter()
            .filter(|m| !self.satisfied.contains(&m.criterion))
            .map(|m| m.criterion.clone())
            .collect()
    }

    /// Union matches into the satisfied set; returns the newly satisfied ones
    fn merge(&mut self, matches: Vec<CriterionMatch>) -> Vec<CriterionMatch> {
        let mut fresh = Vec::new();
        for m in matches {
            if !self.criteria.iter().any(|c| c.id == m.criterion) {
                continue;
            }
            if self.satisfied.insert(m.criterion.clone()) {
                self.evidence.insert(m.criterion.clone(), m.utterance);
                fresh.push(m);
            }
        }
        fresh
    }

    fn set_provisional(&mut self, matches: Vec<CriterionMatch>) {
        self.provisional = matches;
    }

    fn commit_provisional(&mut self) -> Vec<CriterionMatch> {
        let pending = std::mem::take(&mut self.provisional);
        self.merge(pending)
    }
}

/// Live score snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveScore {
    pub phases: BTreeMap<PhaseKind, f32>,
    pub overall: f32,
}

/// Observable effects of processing one utterance
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerUpdate {
    pub newly_satisfied: Vec<(PhaseKind, CriterionMatch)>,
    pub hits: Vec<ProhibitedPhraseHit>,
    pub collected: Vec<(InfoCategory, RequiredInfoStatus)>,
}

impl TrackerUpdate {
    pub fn is_empty(&self) -> bool {
        self.newly_satisfied.is_empty() && self.hits.is_empty() && self.collected.is_empty()
    }
}

/// Per-session compliance state
pub struct ComplianceTracker {
    rules: Vec<Box<dyn PhaseRule>>,
    phases: BTreeMap<PhaseKind, PhaseStatus>,
    scanner: ProhibitedPhraseScanner,
    extractor: RequiredInfoExtractor,
    hits: Vec<ProhibitedPhraseHit>,
    required_info: BTreeMap<InfoCategory, RequiredInfoStatus>,
    customer: Option<NameMatcher>,
    sop_version: String,
    finalized: bool,
}

impl ComplianceTracker {
    /// Compile the rule set; fails before any utterance is processed
    pub fn new(sop: &SopRules, engine: &EngineConfig) -> Result<Self, ConfigError> {
        sop.validate()?;
        let rules = build_phase_rules(sop, engine)?;
        let phases = rules
            .iter()
            .map(|rule| (rule.phase(), PhaseStatus::new(rule.phase(), rule.criteria().to_vec())))
            .collect();

        let required_info = InfoCategory::ALL
            .into_iter()
            .map(|category| (category, RequiredInfoStatus::default()))
            .collect();

        Ok(Self {
            rules,
            phases,
            scanner: ProhibitedPhraseScanner::new(&sop.prohibited_phrases)?,
            extractor: RequiredInfoExtractor::new(&sop.required_info)?,
            hits: Vec::new(),
            required_info,
            customer: None,
            sop_version: sop.version.clone(),
            finalized: false,
        })
    }

    /// Set the known customer name used by the greeting name criterion
    pub fn set_customer_name(&mut self, name: Option<&str>) {
        self.customer = name.and_then(NameMatcher::new);
        if let Some(matcher) = &self.customer {
            tracing::debug!(name = matcher.name(), "Customer name set");
        }
    }

    pub fn customer_name(&self) -> Option<&str> {
        self.customer.as_ref().map(|m| m.name())
    }

    /// Evaluate an utterance that was just appended to `session`
    ///
    /// Utterances without text score nothing, but still move the closing
    /// window forward.
    pub fn process(&mut self, entry: &TranscriptEntry, session: &SessionState) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();
        if self.finalized {
            return update;
        }
        let blank = entry.utterance.is_empty();

        let ctx = EvaluationContext {
            session,
            customer: self.customer.as_ref(),
        };

        for rule in self.rules.iter_mut() {
            if blank && rule.commitment() == Commitment::Ratchet {
                continue;
            }
            let phase = rule.phase();
            let matches = rule.evaluate(entry, &ctx);
            let Some(status) = self.phases.get_mut(&phase) else {
                continue;
            };

            match rule.commitment() {
                Commitment::Ratchet => {
                    for m in status.merge(matches) {
                        tracing::debug!(phase = phase.key(), criterion = %m.criterion, seq = m.utterance.seq, "Criterion satisfied");
                        update.newly_satisfied.push((phase, m));
                    }
                }
                Commitment::TailProvisional => status.set_provisional(matches),
            }
        }

        if blank {
            return update;
        }

        let text = normalize_text(entry.text());

        for hit in self.scanner.scan(entry, &text) {
            tracing::info!(phrase = %hit.phrase, seq = hit.utterance.seq, "Prohibited phrase used");
            self.hits.push(hit.clone());
            update.hits.push(hit);
        }

        for category in self.extractor.extract(entry, &text, &mut self.required_info) {
            tracing::debug!(category = %category, seq = entry.seq, "Required information collected");
            if let Some(status) = self.required_info.get(&category) {
                update.collected.push((category, status.clone()));
            }
        }

        update
    }

    /// Commit provisional matches; later calls are no-ops
    pub fn finalize(&mut self) -> TrackerUpdate {
        let mut update = TrackerUpdate::default();
        if self.finalized {
            return update;
        }

        for (phase, status) in self.phases.iter_mut() {
            for m in status.commit_provisional() {
                tracing::debug!(phase = phase.key(), criterion = %m.criterion, "Criterion committed at finalize");
                update.newly_satisfied.push((*phase, m));
            }
        }

        self.finalized = true;
        update
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Current committed score
    pub fn score(&self) -> LiveScore {
        let phases: BTreeMap<PhaseKind, f32> = self.phases.iter().map(|(k, s)| (*k, s.score())).collect();
        let overall = match phases.len() {
            0 => 0.0,
            n => phases.values().sum::<f32>() / n as f32,
        };
        LiveScore { phases, overall }
    }

    pub fn phases(&self) -> &BTreeMap<PhaseKind, PhaseStatus> {
        &self.phases
    }

    pub fn phase(&self, kind: PhaseKind) -> Option<&PhaseStatus> {
        self.phases.get(&kind)
    }

    pub fn hits(&self) -> &[ProhibitedPhraseHit] {
        &self.hits
    }

    pub fn required_info(&self) -> &BTreeMap<InfoCategory, RequiredInfoStatus> {
        &self.required_info
    }

    pub fn sop_version(&self) -> &str {
        &self.sop_version
    }

    /// Render a report; `meta` supplies identity and the skipped count
    pub fn report(&self, session: &SessionState, meta: &ReportMeta) -> ComplianceReport {
        let meta = meta
            .clone()
            .with_sop_version(self.sop_version.clone())
            .with_finalized(self.finalized);
        build_report(session, &self.phases, &self.hits, &self.required_info, &meta)
    }
}
