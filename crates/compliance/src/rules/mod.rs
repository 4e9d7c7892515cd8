//! Phase Rule Engine
//!
//! One evaluator per SOP phase, all behind the [`PhaseRule`] trait so new
//! phases can be added without touching the tracker. Evaluators only look at
//! agent utterances; customer and unknown turns stay visible through the
//! session for context (window positions, tails).

mod closing;
mod greeting;
mod problem;
mod solution;

pub use closing::ClosingRule;
pub use greeting::GreetingRule;
pub use problem::ProblemIdentificationRule;
pub use solution::SolutionStepsRule;

use serde::{Deserialize, Serialize};

use sop_monitor_config::{ConfigError, EngineConfig, PhaseRules, SopRules};
use sop_monitor_core::{PhaseKind, TranscriptEntry, UtteranceRef};

use crate::patterns::{normalize_text, NameMatcher, PatternSet};
use crate::session::SessionState;

/// Criterion definition as shown in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionSpec {
    pub id: String,
    pub description: String,
}

/// A criterion satisfied by a specific utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriterionMatch {
    pub criterion: String,
    pub utterance: UtteranceRef,
}

/// How the tracker folds an evaluator's output into phase status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commitment {
    /// Matches are merged into the phase immediately and never cleared
    Ratchet,
    /// Matches describe the current conversation tail; they replace the
    /// previous provisional view and are only merged at finalization
    TailProvisional,
}

/// Inputs shared by every evaluator for one utterance
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Session the utterance was just appended to
    pub session: &'a SessionState,
    /// Known customer name, if any
    pub customer: Option<&'a NameMatcher>,
}

/// Stateful matcher for one SOP phase
pub trait PhaseRule: Send + Sync {
    /// Phase this rule scores
    fn phase(&self) -> PhaseKind;

    /// Criteria in configuration order
    fn criteria(&self) -> &[CriterionSpec];

    fn commitment(&self) -> Commitment {
        Commitment::Ratchet
    }

    /// Evaluate a freshly ingested utterance
    fn evaluate(&mut self, entry: &TranscriptEntry, ctx: &EvaluationContext<'_>) -> Vec<CriterionMatch>;
}

struct CompiledCriterion {
    spec: CriterionSpec,
    patterns: PatternSet,
    match_customer_name: bool,
}

impl CompiledCriterion {
    fn is_match(&self, text: &str, customer: Option<&NameMatcher>) -> bool {
        if self.match_customer_name && customer.is_some_and(|name| name.is_match(text)) {
            return true;
        }
        self.patterns.is_match(text)
    }
}

/// Compiled criteria of one phase
pub struct CriteriaMatcher {
    phase: PhaseKind,
    criteria: Vec<CompiledCriterion>,
    specs: Vec<CriterionSpec>,
}

impl CriteriaMatcher {
    pub fn compile(phase: PhaseKind, rules: &PhaseRules) -> Result<Self, ConfigError> {
        let mut criteria = Vec::with_capacity(rules.criteria.len());
        for rule in &rules.criteria {
            let spec = CriterionSpec {
                id: rule.id.clone(),
                description: rule.description.clone(),
            };
            let patterns = PatternSet::compile(&format!("phases.{}.{}", phase.key(), rule.id), &rule.patterns)?;
            criteria.push(CompiledCriterion {
                spec,
                patterns,
                match_customer_name: rule.match_customer_name,
            });
        }

        let specs = criteria.iter().map(|c| c.spec.clone()).collect();
        Ok(Self { phase, criteria, specs })
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase
    }

    pub fn specs(&self) -> &[CriterionSpec] {
        &self.specs
    }

    /// Criterion ids matched by normalized text
    pub fn matching<'s>(&'s self, text: &str, customer: Option<&NameMatcher>) -> Vec<&'s str> {
        self.criteria
            .iter()
            .filter(|c| c.is_match(text, customer))
            .map(|c| c.spec.id.as_str())
            .collect()
    }

    /// Match an entry if it is an agent utterance
    pub fn match_agent(&self, entry: &TranscriptEntry, customer: Option<&NameMatcher>) -> Vec<CriterionMatch> {
        if !entry.role().is_agent() || entry.utterance.is_empty() {
            return Vec::new();
        }

        let text = normalize_text(entry.text());
        self.matching(&text, customer)
            .into_iter()
            .map(|id| CriterionMatch {
                criterion: id.to_string(),
                utterance: entry.reference(),
            })
            .collect()
    }
}

fn phase_rules(sop: &SopRules, kind: PhaseKind) -> Result<&PhaseRules, ConfigError> {
    sop.phase(kind)
        .ok_or_else(|| ConfigError::MissingPhase(kind.key().to_string()))
}

/// Build the evaluator bank for a rule set, in SOP phase order
pub fn build_phase_rules(sop: &SopRules, engine: &EngineConfig) -> Result<Vec<Box<dyn PhaseRule>>, ConfigError> {
    let mut rules: Vec<Box<dyn PhaseRule>> = Vec::with_capacity(PhaseKind::ALL.len());

    for kind in PhaseKind::ALL {
        let matcher = CriteriaMatcher::compile(kind, phase_rules(sop, kind)?)?;
        let rule: Box<dyn PhaseRule> = match kind {
            PhaseKind::Greeting => Box::new(GreetingRule::new(matcher, engine.greeting_window)),
            PhaseKind::ProblemIdentification => Box::new(ProblemIdentificationRule::new(matcher)),
            PhaseKind::SolutionSteps => Box::new(SolutionStepsRule::new(matcher)),
            PhaseKind::Closing => Box::new(ClosingRule::new(matcher, engine.closing_window)),
        };
        rules.push(rule);
    }

    Ok(rules)
}
