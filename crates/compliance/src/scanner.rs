//! Prohibited-phrase scanning and required-information extraction

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sop_monitor_config::{ConfigError, InfoRule};
use sop_monitor_core::{InfoCategory, SpeakerRole, TranscriptEntry, UtteranceRef};

use crate::patterns::{PatternSet, PhrasePattern};

/// Prohibited phrase used by the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProhibitedPhraseHit {
    /// Phrase as configured
    pub phrase: String,
    pub utterance: UtteranceRef,
    pub timestamp_ms: u64,
}

/// Scans agent utterances for configured prohibited phrases
#[derive(Debug, Clone, Default)]
pub struct ProhibitedPhraseScanner {
    phrases: Vec<PhrasePattern>,
}

impl ProhibitedPhraseScanner {
    pub fn new(phrases: &[String]) -> Result<Self, ConfigError> {
        let phrases = phrases
            .iter()
            .filter(|p| !p.trim().is_empty())
            .map(|p| PhrasePattern::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { phrases })
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    /// One hit per occurrence of each phrase in an agent utterance
    pub fn scan(&self, entry: &TranscriptEntry, normalized_text: &str) -> Vec<ProhibitedPhraseHit> {
        if !entry.role().is_agent() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        for phrase in &self.phrases {
            for _ in 0..phrase.occurrences(normalized_text) {
                hits.push(ProhibitedPhraseHit {
                    phrase: phrase.phrase().to_string(),
                    utterance: entry.reference(),
                    timestamp_ms: entry.utterance.timestamp_ms,
                });
            }
        }
        hits
    }
}

/// Where a required-information category was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoEvidence {
    pub utterance: UtteranceRef,
    /// Matched text
    pub value: String,
}

/// Collection state of one required-information category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredInfoStatus {
    pub collected: bool,
    pub evidence: Option<InfoEvidence>,
}

struct CompiledInfoRule {
    category: InfoCategory,
    patterns: PatternSet,
    speaker: Option<SpeakerRole>,
}

/// Per-category extraction rules
#[derive(Default)]
pub struct RequiredInfoExtractor {
    rules: Vec<CompiledInfoRule>,
}

impl RequiredInfoExtractor {
    pub fn new(rules: &[InfoRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                Ok(CompiledInfoRule {
                    category: rule.category,
                    patterns: PatternSet::compile(&format!("required_info.{:?}", rule.category), &rule.patterns)?,
                    speaker: rule.speaker,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self { rules })
    }

    /// Categories with an extraction rule
    pub fn categories(&self) -> impl Iterator<Item = InfoCategory> + '_ {
        self.rules.iter().map(|r| r.category)
    }

    /// Mark categories found in the utterance; returns the newly collected ones
    pub fn extract(
        &self,
        entry: &TranscriptEntry,
        normalized_text: &str,
        statuses: &mut BTreeMap<InfoCategory, RequiredInfoStatus>,
    ) -> Vec<InfoCategory> {
        let mut collected = Vec::new();

        for rule in &self.rules {
            if rule.speaker.is_some_and(|speaker| speaker != entry.role()) {
                continue;
            }

            let status = statuses.entry(rule.category).or_default();
            if status.collected {
                continue;
            }

            if let Some(value) = rule.patterns.find(normalized_text) {
                status.collected = true;
                status.evidence = Some(InfoEvidence {
                    utterance: entry.reference(),
                    value: value.trim().to_string(),
                });
                collected.push(rule.category);
            }
        }

        collected
    }
}
