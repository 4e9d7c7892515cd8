//! Greeting rule: opening window only

use std::collections::BTreeSet;

use sop_monitor_core::{PhaseKind, SpeakerRole, TranscriptEntry};

use super::{CriteriaMatcher, CriterionMatch, CriterionSpec, EvaluationContext, PhaseRule};

/// Greeting must happen within the first `window` agent utterances
///
/// Once every criterion has matched, or the window has passed, the rule stops
/// looking. A greeting in agent turn `window + 1` does not count.
pub struct GreetingRule {
    matcher: CriteriaMatcher,
    window: usize,
    matched: BTreeSet<String>,
}

impl GreetingRule {
    pub fn new(matcher: CriteriaMatcher, window: usize) -> Self {
        Self {
            matcher,
            window,
            matched: BTreeSet::new(),
        }
    }

    fn complete(&self) -> bool {
        self.matched.len() >= self.matcher.specs().len()
    }
}

impl PhaseRule for GreetingRule {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Greeting
    }

    fn criteria(&self) -> &[CriterionSpec] {
        self.matcher.specs()
    }

    fn evaluate(&mut self, entry: &TranscriptEntry, ctx: &EvaluationContext<'_>) -> Vec<CriterionMatch> {
        if !entry.role().is_agent() || self.complete() {
            return Vec::new();
        }

        // The session already counts this utterance.
        let agent_turn = ctx.session.speaker_count(SpeakerRole::Agent);
        if agent_turn > self.window {
            return Vec::new();
        }

        let matches = self.matcher.match_agent(entry, ctx.customer);
        for m in &matches {
            self.matched.insert(m.criterion.clone());
        }
        if self.complete() {
            tracing::debug!(agent_turn, "Greeting complete");
        }
        matches
    }
}
