//! Closing rule: evaluated over the conversation tail

use sop_monitor_core::{PhaseKind, TranscriptEntry};

use super::{Commitment, CriteriaMatcher, CriterionMatch, CriterionSpec, EvaluationContext, PhaseRule};

/// Summary, thanks and offer of further help within the last `window` utterances
///
/// The window is re-read from the session tail on every utterance, so a
/// closing said mid-call drops out of view as the conversation continues.
pub struct ClosingRule {
    matcher: CriteriaMatcher,
    window: usize,
}

impl ClosingRule {
    pub fn new(matcher: CriteriaMatcher, window: usize) -> Self {
        Self { matcher, window }
    }
}

impl PhaseRule for ClosingRule {
    fn phase(&self) -> PhaseKind {
        PhaseKind::Closing
    }

    fn criteria(&self) -> &[CriterionSpec] {
        self.matcher.specs()
    }

    fn commitment(&self) -> Commitment {
        Commitment::TailProvisional
    }

    fn evaluate(&mut self, _entry: &TranscriptEntry, ctx: &EvaluationContext<'_>) -> Vec<CriterionMatch> {
        let mut matches: Vec<CriterionMatch> = Vec::new();

        // Newest first, so evidence points at the latest matching utterance.
        for tail_entry in ctx.session.tail(self.window).iter().rev() {
            for m in self.matcher.match_agent(tail_entry, ctx.customer) {
                if !matches.iter().any(|seen| seen.criterion == m.criterion) {
                    matches.push(m);
                }
            }
        }

        matches.sort_by_key(|m| m.utterance);
        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use sop_monitor_config::default_sop;
    use sop_monitor_core::Utterance;

    fn rule(window: usize) -> ClosingRule {
        let sop = default_sop();
        let matcher = CriteriaMatcher::compile(PhaseKind::Closing, sop.phase(PhaseKind::Closing).unwrap()).unwrap();
        ClosingRule::new(matcher, window)
    }

    fn feed(rule: &mut ClosingRule, session: &mut SessionState, u: Utterance) -> Vec<String> {
        let seq = session.ingest(u).unwrap();
        let ctx = EvaluationContext { session: &*session, customer: None };
        let mut ids: Vec<_> = rule
            .evaluate(&session.transcript()[seq], &ctx)
            .into_iter()
            .map(|m| m.criterion)
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_single_utterance_closing() {
        let mut rule = rule(3);
        let mut session = SessionState::new(0);
        let ids = feed(
            &mut rule,
            &mut session,
            Utterance::agent(
                "So to confirm, we'll replace your order within 3 business days. Thank you for your patience \u{2014} anything else I can help with?",
                0,
            ),
        );
        assert_eq!(ids, vec!["offer_further_help", "summarize_resolution", "thank_customer"]);
    }

    #[test]
    fn test_mid_call_thanks_slides_out_of_window() {
        let mut rule = rule(2);
        let mut session = SessionState::new(0);

        assert_eq!(feed(&mut rule, &mut session, Utterance::agent("Thank you for that.", 0)), vec!["thank_customer"]);
        assert_eq!(
            feed(&mut rule, &mut session, Utterance::customer("It arrived broken.", 100)),
            vec!["thank_customer"]
        );
        assert!(feed(&mut rule, &mut session, Utterance::customer("Totally broken.", 200)).is_empty());
    }

    #[test]
    fn test_criteria_combined_across_tail() {
        let mut rule = rule(3);
        let mut session = SessionState::new(0);

        feed(&mut rule, &mut session, Utterance::agent("To recap, a replacement ships today.", 0));
        feed(&mut rule, &mut session, Utterance::customer("Great.", 100));
        let ids = feed(&mut rule, &mut session, Utterance::agent("Thanks! Anything else?", 200));
        assert_eq!(ids, vec!["offer_further_help", "summarize_resolution", "thank_customer"]);
    }
}
