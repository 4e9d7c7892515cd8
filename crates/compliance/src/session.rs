//! Session State
//!
//! Append-only conversation transcript with per-speaker and sentiment tallies.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use sop_monitor_core::{Error, Result, Sentiment, SentimentLabel, SpeakerRole, TranscriptEntry, Utterance};

/// Histogram of sentiment labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentDistribution {
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
    /// Utterances ingested without a sentiment annotation
    pub unlabeled: usize,
}

impl SentimentDistribution {
    pub fn record(&mut self, sentiment: Option<&Sentiment>) {
        match sentiment.map(|s| s.label) {
            Some(SentimentLabel::Positive) => self.positive += 1,
            Some(SentimentLabel::Neutral) => self.neutral += 1,
            Some(SentimentLabel::Negative) => self.negative += 1,
            None => self.unlabeled += 1,
        }
    }

    pub fn count(&self, label: SentimentLabel) -> usize {
        match label {
            SentimentLabel::Positive => self.positive,
            SentimentLabel::Neutral => self.neutral,
            SentimentLabel::Negative => self.negative,
        }
    }

    /// Number of labeled utterances
    pub fn labeled(&self) -> usize {
        self.positive + self.neutral + self.negative
    }

    /// Share of labeled utterances carrying `label` (0.0 when nothing is labeled)
    pub fn share(&self, label: SentimentLabel) -> f32 {
        match self.labeled() {
            0 => 0.0,
            total => self.count(label) as f32 / total as f32,
        }
    }
}

/// Accumulated conversation state
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    entries: Vec<TranscriptEntry>,
    speaker_counts: BTreeMap<SpeakerRole, usize>,
    sentiment: SentimentDistribution,
    speaker_sentiment: BTreeMap<SpeakerRole, SentimentDistribution>,
    /// Allowed backwards skew
    tolerance_ms: u64,
    /// Highest timestamp ingested so far
    last_timestamp_ms: Option<u64>,
}

impl SessionState {
    /// Create an empty session accepting timestamps up to `tolerance_ms`
    /// behind the latest ingested one.
    pub fn new(tolerance_ms: u64) -> Self {
        Self {
            tolerance_ms,
            ..Self::default()
        }
    }

    /// Append an utterance and return its sequence position
    pub fn ingest(&mut self, utterance: Utterance) -> Result<usize> {
        if let Some(last) = self.last_timestamp_ms {
            if utterance.timestamp_ms.saturating_add(self.tolerance_ms) < last {
                return Err(Error::OutOfOrder {
                    timestamp_ms: utterance.timestamp_ms,
                    last_timestamp_ms: last,
                    tolerance_ms: self.tolerance_ms,
                });
            }
        }

        let seq = self.entries.len();
        let role = utterance.speaker_role;

        *self.speaker_counts.entry(role).or_insert(0) += 1;
        self.sentiment.record(utterance.sentiment.as_ref());
        self.speaker_sentiment
            .entry(role)
            .or_default()
            .record(utterance.sentiment.as_ref());
        self.last_timestamp_ms = Some(
            self.last_timestamp_ms
                .map_or(utterance.timestamp_ms, |last| last.max(utterance.timestamp_ms)),
        );

        self.entries.push(TranscriptEntry { seq, utterance });
        Ok(seq)
    }

    /// Full ordered transcript
    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Last `n` entries (fewer when the transcript is shorter)
    pub fn tail(&self, n: usize) -> &[TranscriptEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn get(&self, seq: usize) -> Option<&TranscriptEntry> {
        self.entries.get(seq)
    }

    pub fn speaker_counts(&self) -> &BTreeMap<SpeakerRole, usize> {
        &self.speaker_counts
    }

    pub fn speaker_count(&self, role: SpeakerRole) -> usize {
        self.speaker_counts.get(&role).copied().unwrap_or(0)
    }

    pub fn sentiment_distribution(&self) -> &SentimentDistribution {
        &self.sentiment
    }

    /// Sentiment histogram for one speaker
    pub fn speaker_sentiment(&self, role: SpeakerRole) -> SentimentDistribution {
        self.speaker_sentiment.get(&role).copied().unwrap_or_default()
    }

    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last_timestamp_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
