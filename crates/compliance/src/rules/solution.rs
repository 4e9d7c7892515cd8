//! Solution steps rule

use sop_monitor_core::{PhaseKind, TranscriptEntry};

use super::{CriteriaMatcher, CriterionMatch, CriterionSpec, EvaluationContext, PhaseRule};

/// Next steps, information request and time expectation, anywhere in the call
pub struct SolutionStepsRule {
    matcher: CriteriaMatcher,
}

impl SolutionStepsRule {
    pub fn new(matcher: CriteriaMatcher) -> Self {
        Self { matcher }
    }
}

impl PhaseRule for SolutionStepsRule {
    fn phase(&self) -> PhaseKind {
        PhaseKind::SolutionSteps
    }

    fn criteria(&self) -> &[CriterionSpec] {
        self.matcher.specs()
    }

    fn evaluate(&mut self, entry: &TranscriptEntry, ctx: &EvaluationContext<'_>) -> Vec<CriterionMatch> {
        self.matcher.match_agent(entry, ctx.customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use sop_monitor_config::default_sop;
    use sop_monitor_core::Utterance;

    fn evaluate(text: &str) -> Vec<String> {
        let sop = default_sop();
        let matcher =
            CriteriaMatcher::compile(PhaseKind::SolutionSteps, sop.phase(PhaseKind::SolutionSteps).unwrap()).unwrap();
        let mut rule = SolutionStepsRule::new(matcher);
        let mut session = SessionState::new(0);
        let seq = session.ingest(Utterance::agent(text, 0)).unwrap();
        let ctx = EvaluationContext { session: &session, customer: None };
        rule.evaluate(&session.transcript()[seq], &ctx)
            .into_iter()
            .map(|m| m.criterion)
            .collect()
    }

    #[test]
    fn test_time_expectation_patterns() {
        assert_eq!(evaluate("We'll process your request within 24 hours."), vec!["next_steps", "time_expectation"]);
        assert_eq!(evaluate("It usually takes 3-5 business days"), vec!["time_expectation"]);
        assert!(evaluate("How can I help you today?").is_empty());
    }

    #[test]
    fn test_information_request() {
        assert_eq!(
            evaluate("Could you please upload some photos of the damage?"),
            vec!["request_information"]
        );
    }
}
