//! Transcript records
//!
//! Decodes diarized transcript records (a JSON array or JSON lines) into
//! utterances, mapping diarization labels to speaker roles.

use futures::Stream;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::io::AsyncBufRead;
use tokio_stream::{wrappers::LinesStream, StreamExt};

use sop_monitor_core::{Error, Result, Sentiment, SentimentLabel, SpeakerRole, Utterance};

static SPEAKER_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^speaker[\s_-]*0*(\d+)$").expect("valid speaker label pattern"));

/// Sentiment as it appears in transcript files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub label: SentimentLabel,
    #[serde(default, alias = "score")]
    pub confidence: f32,
}

/// One transcribed segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Role name or diarization label
    #[serde(default, alias = "role", alias = "speaker_role")]
    pub speaker: Option<String>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default, alias = "timestamp")]
    pub timestamp_ms: Option<u64>,

    /// Segment start in seconds
    #[serde(default)]
    pub start: Option<f64>,

    #[serde(default)]
    pub sentiment: Option<SentimentRecord>,
}

impl TranscriptRecord {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            speaker: Some(speaker.into()),
            text: Some(text.into()),
            timestamp_ms: Some(timestamp_ms),
            start: None,
            sentiment: None,
        }
    }

    /// Timestamp in milliseconds, preferring `timestamp_ms` over `start`
    pub fn timestamp(&self) -> Option<u64> {
        match (self.timestamp_ms, self.start) {
            (Some(ms), _) => Some(ms),
            (None, Some(secs)) if secs.is_finite() && secs >= 0.0 => Some((secs * 1000.0).round() as u64),
            _ => None,
        }
    }

    /// Convert into an utterance
    ///
    /// A record without a usable timestamp is malformed. Missing text is
    /// passed through and rejected at ingestion.
    pub fn into_utterance(self, labels: &BTreeMap<String, SpeakerRole>) -> Result<Utterance> {
        let timestamp_ms = self.timestamp().ok_or_else(|| {
            Error::MalformedUtterance(format!(
                "record from {} has no timestamp",
                self.speaker.as_deref().unwrap_or("unknown speaker")
            ))
        })?;

        let role = self
            .speaker
            .as_deref()
            .map(|label| resolve_speaker(label, labels))
            .unwrap_or_default();

        let mut utterance = Utterance::new(role, self.text.unwrap_or_default(), timestamp_ms);
        utterance.sentiment = self.sentiment.map(|s| Sentiment::new(s.label, s.confidence));
        Ok(utterance)
    }
}

fn lookup(labels: &BTreeMap<String, SpeakerRole>, label: &str) -> Option<SpeakerRole> {
    // Layered config sources may lowercase map keys
    labels.get(label).copied().or_else(|| {
        labels
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(label))
            .map(|(_, role)| *role)
    })
}

/// Resolve a speaker label
///
/// Configured labels win (case-insensitive), then role names (`agent`,
/// `customer`), then `SPEAKER_02`/`speaker-2` style labels normalised to
/// `Speaker 2`. Anything else is [`SpeakerRole::Unknown`].
pub fn resolve_speaker(label: &str, labels: &BTreeMap<String, SpeakerRole>) -> SpeakerRole {
    let label = label.trim();
    if let Some(role) = lookup(labels, label) {
        return role;
    }

    match label.to_ascii_lowercase().as_str() {
        "agent" => return SpeakerRole::Agent,
        "customer" => return SpeakerRole::Customer,
        _ => {}
    }

    SPEAKER_LABEL
        .captures(label)
        .and_then(|caps| lookup(labels, &format!("Speaker {}", &caps[1])))
        .unwrap_or(SpeakerRole::Unknown)
}

/// Decode one JSON line
pub fn decode_line(line: &str) -> Result<TranscriptRecord> {
    serde_json::from_str(line).map_err(|e| Error::MalformedUtterance(format!("invalid record: {}", e)))
}

/// Parse a whole transcript document
///
/// A document starting with `[` is a JSON array and must parse as a whole.
/// Otherwise every non-blank line is decoded on its own, so one bad line only
/// loses that record.
pub fn parse_transcript(content: &str) -> Result<Vec<Result<TranscriptRecord>>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let records: Vec<TranscriptRecord> = serde_json::from_str(trimmed)?;
        return Ok(records.into_iter().map(Ok).collect());
    }

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(decode_line)
        .collect())
}

/// Stream of records from JSON lines
pub fn record_stream<R>(reader: R) -> impl Stream<Item = Result<TranscriptRecord>> + Unpin
where
    R: AsyncBufRead + Unpin,
{
    use tokio::io::AsyncBufReadExt;

    LinesStream::new(reader.lines()).filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(decode_line(line.trim())),
        Err(e) => Some(Err(Error::Io(e))),
    })
}
