//! Problem identification rule

use sop_monitor_core::{PhaseKind, TranscriptEntry};

use super::{CriteriaMatcher, CriterionMatch, CriterionSpec, EvaluationContext, PhaseRule};

/// Detail request, acknowledgement and empathy, anywhere in the call and in any order
pub struct ProblemIdentificationRule {
    matcher: CriteriaMatcher,
}

impl ProblemIdentificationRule {
    pub fn new(matcher: CriteriaMatcher) -> Self {
        Self { matcher }
    }
}

impl PhaseRule for ProblemIdentificationRule {
    fn phase(&self) -> PhaseKind {
        PhaseKind::ProblemIdentification
    }

    fn criteria(&self) -> &[CriterionSpec] {
        self.matcher.specs()
    }

    fn evaluate(&mut self, entry: &TranscriptEntry, ctx: &EvaluationContext<'_>) -> Vec<CriterionMatch> {
        self.matcher.match_agent(entry, ctx.customer)
    }
}
