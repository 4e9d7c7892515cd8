//! Reorder buffer for live ingestion
//!
//! Holds utterances for a configurable window and releases them in
//! `(timestamp, arrival)` order once no earlier utterance can plausibly
//! still arrive.

use std::collections::BTreeMap;

use sop_monitor_core::{Error, Result, Utterance};

/// Timestamp-ordered holding area
#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    window_ms: u64,
    pending: BTreeMap<(u64, u64), Utterance>,
    arrivals: u64,
    max_seen_ms: Option<u64>,
    last_released_ms: Option<u64>,
}

impl ReorderBuffer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            pending: BTreeMap::new(),
            arrivals: 0,
            max_seen_ms: None,
            last_released_ms: None,
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Hold an utterance
    ///
    /// Fails when the utterance is older than one already released, since it
    /// can no longer be evaluated in order.
    pub fn push(&mut self, utterance: Utterance) -> Result<()> {
        if let Some(last) = self.last_released_ms {
            if utterance.timestamp_ms < last {
                return Err(Error::OutOfOrder {
                    timestamp_ms: utterance.timestamp_ms,
                    last_timestamp_ms: last,
                    tolerance_ms: 0,
                });
            }
        }

        self.max_seen_ms = Some(
            self.max_seen_ms
                .map_or(utterance.timestamp_ms, |max| max.max(utterance.timestamp_ms)),
        );
        self.pending.insert((utterance.timestamp_ms, self.arrivals), utterance);
        self.arrivals += 1;
        Ok(())
    }

    /// Release point derived from the newest timestamp seen
    pub fn watermark(&self) -> Option<u64> {
        self.max_seen_ms.map(|max| max.saturating_sub(self.window_ms))
    }

    /// Release everything at or below the arrival watermark
    pub fn drain_ready(&mut self) -> Vec<Utterance> {
        match self.watermark() {
            Some(watermark) => self.drain_until(watermark),
            None => Vec::new(),
        }
    }

    /// Release everything with `timestamp <= watermark`
    pub fn drain_until(&mut self, watermark: u64) -> Vec<Utterance> {
        let held_back = self.pending.split_off(&(watermark.saturating_add(1), 0));
        let ready = std::mem::replace(&mut self.pending, held_back);
        self.release(ready)
    }

    /// Release everything regardless of the window
    pub fn flush(&mut self) -> Vec<Utterance> {
        let ready = std::mem::take(&mut self.pending);
        self.release(ready)
    }

    fn release(&mut self, ready: BTreeMap<(u64, u64), Utterance>) -> Vec<Utterance> {
        if let Some(((ts, _), _)) = ready.last_key_value() {
            self.last_released_ms = Some(self.last_released_ms.map_or(*ts, |last| last.max(*ts)));
        }
        ready.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(utterances: &[Utterance]) -> Vec<&str> {
        utterances.iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn test_releases_in_timestamp_order() {
        let mut buffer = ReorderBuffer::new(1000);
        buffer.push(Utterance::agent("b", 1200)).unwrap();
        buffer.push(Utterance::customer("a", 900)).unwrap();
        assert!(buffer.drain_ready().is_empty());

        buffer.push(Utterance::agent("c", 2500)).unwrap();
        let released = buffer.drain_ready();
        assert_eq!(texts(&released), vec!["a", "b"]);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut buffer = ReorderBuffer::new(0);
        buffer.push(Utterance::agent("first", 100)).unwrap();
        buffer.push(Utterance::customer("second", 100)).unwrap();
        assert_eq!(texts(&buffer.drain_ready()), vec!["first", "second"]);
    }

    #[test]
    fn test_late_arrival_after_release_is_rejected() {
        let mut buffer = ReorderBuffer::new(500);
        buffer.push(Utterance::agent("x", 1000)).unwrap();
        buffer.push(Utterance::agent("y", 2000)).unwrap();
        assert_eq!(buffer.drain_ready().len(), 1);

        let err = buffer.push(Utterance::customer("late", 900)).unwrap_err();
        assert!(matches!(err, Error::OutOfOrder { timestamp_ms: 900, last_timestamp_ms: 1000, .. }));

        assert!(buffer.push(Utterance::customer("in window", 1600)).is_ok());
    }

    #[test]
    fn test_drain_until_and_flush() {
        let mut buffer = ReorderBuffer::new(10_000);
        buffer.push(Utterance::agent("a", 100)).unwrap();
        buffer.push(Utterance::agent("b", 300)).unwrap();

        assert_eq!(texts(&buffer.drain_until(100)), vec!["a"]);
        assert_eq!(texts(&buffer.flush()), vec!["b"]);
        assert!(buffer.is_empty());
    }
}
