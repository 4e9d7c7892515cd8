//! Utterance types produced by transcription and diarization

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Role of the speaker behind an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    #[serde(alias = "AGENT")]
    Agent,
    #[serde(alias = "CUSTOMER")]
    Customer,
    /// Diarization unavailable or inconclusive
    #[default]
    #[serde(alias = "UNKNOWN")]
    Unknown,
}

impl SpeakerRole {
    pub const ALL: [SpeakerRole; 3] = [SpeakerRole::Agent, SpeakerRole::Customer, SpeakerRole::Unknown];

    /// Get role display name
    pub fn display_name(&self) -> &'static str {
        match self {
            SpeakerRole::Agent => "Agent",
            SpeakerRole::Customer => "Customer",
            SpeakerRole::Unknown => "Unknown",
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, SpeakerRole::Agent)
    }
}

/// Sentiment label as emitted by the annotator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SentimentLabel {
    #[serde(rename = "POS", alias = "positive", alias = "POSITIVE")]
    Positive,
    #[serde(rename = "NEU", alias = "neutral", alias = "NEUTRAL")]
    Neutral,
    #[serde(rename = "NEG", alias = "negative", alias = "NEGATIVE")]
    Negative,
}

impl SentimentLabel {
    /// Short label used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "POS",
            SentimentLabel::Neutral => "NEU",
            SentimentLabel::Negative => "NEG",
        }
    }
}

/// Sentiment annotation attached to an utterance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSentiment")]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
}

#[derive(Deserialize)]
struct RawSentiment {
    label: SentimentLabel,
    #[serde(default, alias = "score")]
    confidence: f32,
}

impl From<RawSentiment> for Sentiment {
    fn from(raw: RawSentiment) -> Self {
        Sentiment::new(raw.label, raw.confidence)
    }
}

impl Sentiment {
    /// Create a sentiment annotation, clamping confidence into `[0, 1]`
    pub fn new(label: SentimentLabel, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { label, confidence }
    }
}

/// One speaker turn's transcribed text with timing and role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Utterance {
    pub speaker_role: SpeakerRole,

    /// Transcribed text (empty when the upstream record carried none)
    #[serde(default)]
    pub text: String,

    /// Offset from session start in milliseconds
    pub timestamp_ms: u64,

    /// Sentiment annotation, if the annotator produced one
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
}

impl Utterance {
    /// Create a new utterance without sentiment
    pub fn new(speaker_role: SpeakerRole, text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            speaker_role,
            text: text.into(),
            timestamp_ms,
            sentiment: None,
        }
    }

    pub fn agent(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(SpeakerRole::Agent, text, timestamp_ms)
    }

    pub fn customer(text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self::new(SpeakerRole::Customer, text, timestamp_ms)
    }

    /// Attach a sentiment annotation
    pub fn with_sentiment(mut self, label: SentimentLabel, confidence: f32) -> Self {
        self.sentiment = Some(Sentiment::new(label, confidence));
        self
    }

    /// Check that the utterance carries text
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::MalformedUtterance(format!(
                "utterance at {}ms has no text",
                self.timestamp_ms
            )));
        }
        Ok(())
    }

    /// Check if text is empty
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Reference to an ingested utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UtteranceRef {
    /// Position in the session transcript
    pub seq: usize,
    pub timestamp_ms: u64,
}

/// Utterance together with the position assigned at ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub seq: usize,
    pub utterance: Utterance,
}

impl TranscriptEntry {
    pub fn reference(&self) -> UtteranceRef {
        UtteranceRef {
            seq: self.seq,
            timestamp_ms: self.utterance.timestamp_ms,
        }
    }

    pub fn role(&self) -> SpeakerRole {
        self.utterance.speaker_role
    }

    pub fn text(&self) -> &str {
        &self.utterance.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utterance_validation() {
        let ok = Utterance::agent("Hello there", 0);
        assert!(ok.validate().is_ok());
        assert_eq!(ok.word_count(), 2);

        let blank = Utterance::customer("   ", 10);
        assert!(matches!(blank.validate(), Err(Error::MalformedUtterance(_))));
    }

    #[test]
    fn test_sentiment_clamped() {
        let s = Sentiment::new(SentimentLabel::Negative, 1.7);
        assert_eq!(s.confidence, 1.0);

        let s = Sentiment::new(SentimentLabel::Positive, f32::NAN);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_deserialized_sentiment_clamped() {
        let u: Utterance = serde_json::from_str(
            r#"{"speaker_role":"customer","text":"awful","timestamp_ms":5,"sentiment":{"label":"NEG","confidence":1.7}}"#,
        )
        .unwrap();
        assert_eq!(u.sentiment.unwrap().confidence, 1.0);

        let s: Sentiment = serde_json::from_str(r#"{"label":"POS","confidence":-0.2}"#).unwrap();
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn test_deserialize_labels() {
        let u: Utterance = serde_json::from_str(
            r#"{"speaker_role":"AGENT","text":"hi","timestamp_ms":5,"sentiment":{"label":"NEU","confidence":0.8}}"#,
        )
        .unwrap();
        assert_eq!(u.speaker_role, SpeakerRole::Agent);
        assert_eq!(u.sentiment.unwrap().label, SentimentLabel::Neutral);

        let u: Utterance =
            serde_json::from_str(r#"{"speaker_role":"customer","timestamp_ms":7}"#).unwrap();
        assert!(u.is_empty());
        assert!(u.sentiment.is_none());
    }

    #[test]
    fn test_entry_reference() {
        let entry = TranscriptEntry {
            seq: 3,
            utterance: Utterance::agent("Thanks", 4200),
        };
        assert_eq!(entry.reference(), UtteranceRef { seq: 3, timestamp_ms: 4200 });
        assert!(entry.role().is_agent());
    }
}
