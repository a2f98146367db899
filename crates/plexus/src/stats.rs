// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-topic publication statistics.
//!
//! Tracks inter-publication and inter-receipt intervals with Welford's online
//! mean/variance algorithm, and detects dropped messages from gaps in the
//! per-sender sequence numbers.
//!
//! Statistics are opt-in per topic ([`StatisticsTracker::set_enabled`]). The
//! tracker itself has no locking; the context keeps it under its state lock
//! so concurrent senders on the same topic are serialized.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use std::time::Instant;

/// Milliseconds elapsed on the process-wide monotonic clock.
pub(crate) fn monotonic_millis() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    // +1 keeps the very first stamp non-zero.
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64 + 1
}

/// Metadata attached to each outgoing message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublicationMetadata {
    /// Publication time in milliseconds.
    pub stamp: u64,
    /// Per-(topic, sender) sequence number.
    pub seq: u64,
}

/// Online mean/variance accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    count: u64,
    mean: f64,
    sum_sq_dev: f64,
    min: f64,
    max: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            sum_sq_dev: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Add one sample (an interval in milliseconds).
    pub fn update(&mut self, sample: f64) {
        self.count += 1;
        let delta = sample - self.mean;
        self.mean += delta / self.count as f64;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);
        // Uses the updated mean: M2 += delta * (x - mean').
        self.sum_sq_dev += delta * (sample - self.mean);
    }

    /// Number of samples.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean interval in milliseconds, NaN without samples.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.mean
        }
    }

    /// Rate in hertz derived from the mean interval. NaN without samples,
    /// and NaN when every interval was zero (sub-millisecond bursts).
    pub fn hz(&self) -> f64 {
        if self.count >= 1 && self.mean > 0.0 {
            1000.0 / self.mean
        } else {
            f64::NAN
        }
    }

    /// Population standard deviation, NaN without samples.
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            (self.sum_sq_dev / self.count as f64).sqrt()
        }
    }

    /// Smallest sample, NaN without samples.
    pub fn min(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.min
        }
    }

    /// Largest sample, NaN without samples.
    pub fn max(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.max
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics for a single topic.
#[derive(Debug, Clone, Default)]
pub struct TopicStatistics {
    last_seq: HashMap<String, u64>,
    publication: Statistics,
    receive: Statistics,
    dropped: u64,
    prev_publication_stamp: Option<u64>,
    prev_receive_stamp: u64,
}

impl TopicStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a publication observed now.
    pub fn update(&mut self, sender: &str, meta: &PublicationMetadata) {
        self.update_at(sender, meta, monotonic_millis());
    }

    /// Record a publication observed at `now` (milliseconds).
    ///
    /// The first observation only sets the baseline. A sender seen for the
    /// first time after that is expected to start at sequence 1.
    pub fn update_at(&mut self, sender: &str, meta: &PublicationMetadata, now: u64) {
        if let Some(prev_stamp) = self.prev_publication_stamp {
            self.publication
                .update(meta.stamp.saturating_sub(prev_stamp) as f64);
            self.receive
                .update(now.saturating_sub(self.prev_receive_stamp) as f64);

            let last = self.last_seq.get(sender).copied().unwrap_or(0);
            if last.wrapping_add(1) != meta.seq {
                log::debug!(
                    "[Stats] sequence gap sender={} expected={} got={}",
                    sender,
                    last.wrapping_add(1),
                    meta.seq
                );
                self.dropped += 1;
            }
        }

        self.prev_publication_stamp = Some(meta.stamp);
        self.prev_receive_stamp = now;
        self.last_seq.insert(sender.to_string(), meta.seq);
    }

    /// Inter-publication interval statistics.
    pub fn publication(&self) -> &Statistics {
        &self.publication
    }

    /// Inter-receipt interval statistics.
    pub fn receive(&self) -> &Statistics {
        &self.receive
    }

    /// Messages detected as lost.
    pub fn dropped_msg_count(&self) -> u64 {
        self.dropped
    }

    /// Copy of the current values for operator diagnostics.
    pub fn snapshot(&self, topic: &str) -> TopicStatisticsSnapshot {
        TopicStatisticsSnapshot {
            topic: topic.to_string(),
            publication: self.publication,
            receive: self.receive,
            dropped_msg_count: self.dropped,
        }
    }
}

/// Point-in-time copy of [`TopicStatistics`].
#[derive(Debug, Clone, PartialEq)]
pub struct TopicStatisticsSnapshot {
    pub topic: String,
    pub publication: Statistics,
    pub receive: Statistics,
    pub dropped_msg_count: u64,
}

impl TopicStatisticsSnapshot {
    /// Publication rate in hertz, NaN until a non-zero interval is seen.
    pub fn hz(&self) -> f64 {
        self.publication.hz()
    }

    /// Standard deviation of the publication interval.
    pub fn std_dev(&self) -> f64 {
        self.publication.std_dev()
    }

    /// Shortest publication interval (ms).
    pub fn min_interval(&self) -> f64 {
        self.publication.min()
    }

    /// Longest publication interval (ms).
    pub fn max_interval(&self) -> f64 {
        self.publication.max()
    }
}

/// Statistics for every enabled topic.
#[derive(Debug, Default)]
pub struct StatisticsTracker {
    enabled: HashSet<String>,
    topics: HashMap<String, TopicStatistics>,
}

impl StatisticsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable statistics for a topic. Disabling discards what was
    /// accumulated so far.
    pub fn set_enabled(&mut self, topic: &str, enabled: bool) {
        if enabled {
            self.enabled.insert(topic.to_string());
        } else {
            self.enabled.remove(topic);
            self.topics.remove(topic);
        }
    }

    #[inline]
    pub fn is_enabled(&self, topic: &str) -> bool {
        self.enabled.contains(topic)
    }

    /// Record a publication. No-op unless the topic is enabled.
    pub fn observe(&mut self, topic: &str, sender: &str, meta: &PublicationMetadata) {
        self.observe_at(topic, sender, meta, monotonic_millis());
    }

    pub(crate) fn observe_at(
        &mut self,
        topic: &str,
        sender: &str,
        meta: &PublicationMetadata,
        now: u64,
    ) {
        if !self.is_enabled(topic) {
            return;
        }
        self.topics
            .entry(topic.to_string())
            .or_default()
            .update_at(sender, meta, now);
    }

    /// Current statistics for a topic, if any publication was observed.
    pub fn get(&self, topic: &str) -> Option<&TopicStatistics> {
        self.topics.get(topic)
    }

    pub fn snapshot(&self, topic: &str) -> Option<TopicStatisticsSnapshot> {
        self.topics.get(topic).map(|stats| stats.snapshot(topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(stamp: u64, seq: u64) -> PublicationMetadata {
        PublicationMetadata { stamp, seq }
    }

    #[test]
    fn test_empty_statistics_are_nan() {
        let stats = Statistics::new();
        assert_eq!(stats.count(), 0);
        assert!(stats.hz().is_nan());
        assert!(stats.std_dev().is_nan());
        assert!(stats.mean().is_nan());
        assert!(stats.min().is_nan());
        assert!(stats.max().is_nan());
    }

    #[test]
    fn test_single_sample_defines_rate() {
        let mut stats = Statistics::new();
        stats.update(100.0);
        assert_eq!(stats.count(), 1);
        assert!((stats.hz() - 10.0).abs() < 1e-9);
        assert_eq!(stats.std_dev(), 0.0);
        assert_eq!(stats.min(), stats.max());
        assert_eq!(stats.min(), stats.mean());
    }

    #[test]
    fn test_zero_interval_rate_is_nan() {
        let mut stats = Statistics::new();
        stats.update(0.0);
        assert_eq!(stats.count(), 1);
        assert_eq!(stats.mean(), 0.0);
        assert!(stats.hz().is_nan());

        stats.update(20.0);
        assert!((stats.hz() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_welford_matches_two_pass() {
        let samples = [10.0, 12.0, 9.0, 11.0, 30.0, 10.5];
        let mut stats = Statistics::new();
        for s in samples {
            stats.update(s);
        }

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        assert!((stats.mean() - mean).abs() < 1e-9);
        assert!((stats.std_dev() - var.sqrt()).abs() < 1e-9);
        assert_eq!(stats.min(), 9.0);
        assert_eq!(stats.max(), 30.0);
        assert!(stats.min() <= stats.mean() && stats.mean() <= stats.max());
    }

    #[test]
    fn test_contiguous_sequence_has_no_drops() {
        let mut topic = TopicStatistics::new();
        for seq in 1..=4 {
            topic.update_at("a", &meta(seq * 10, seq), seq * 10);
        }
        assert_eq!(topic.dropped_msg_count(), 0);
        assert_eq!(topic.publication().count(), 3);
    }

    #[test]
    fn test_sequence_gap_counts_one_drop() {
        let mut topic = TopicStatistics::new();
        for (i, seq) in [1u64, 2, 3, 5].into_iter().enumerate() {
            let t = (i as u64 + 1) * 10;
            topic.update_at("a", &meta(t, seq), t);
        }
        assert_eq!(topic.dropped_msg_count(), 1);
    }

    #[test]
    fn test_first_observation_is_baseline_only() {
        let mut topic = TopicStatistics::new();
        topic.update_at("a", &meta(5, 7), 5);
        assert_eq!(topic.publication().count(), 0);
        assert_eq!(topic.receive().count(), 0);
        assert_eq!(topic.dropped_msg_count(), 0);
    }

    #[test]
    fn test_sender_restart_counts_drop() {
        let mut topic = TopicStatistics::new();
        topic.update_at("a", &meta(10, 1), 10);
        topic.update_at("a", &meta(20, 2), 20);
        topic.update_at("a", &meta(30, 1), 30);
        assert_eq!(topic.dropped_msg_count(), 1);
    }

    #[test]
    fn test_senders_tracked_independently() {
        let mut topic = TopicStatistics::new();
        topic.update_at("a", &meta(10, 1), 10);
        topic.update_at("b", &meta(11, 1), 11);
        topic.update_at("a", &meta(20, 2), 20);
        topic.update_at("b", &meta(21, 2), 21);
        assert_eq!(topic.dropped_msg_count(), 0);
    }

    #[test]
    fn test_intervals_recorded() {
        let mut topic = TopicStatistics::new();
        topic.update_at("a", &meta(100, 1), 1_000);
        topic.update_at("a", &meta(150, 2), 1_070);
        assert_eq!(topic.publication().mean(), 50.0);
        assert_eq!(topic.receive().mean(), 70.0);
    }

    #[test]
    fn test_tracker_ignores_disabled_topics() {
        let mut tracker = StatisticsTracker::new();
        tracker.observe_at("chatter", "a", &meta(1, 1), 1);
        assert!(tracker.get("chatter").is_none());

        tracker.set_enabled("chatter", true);
        tracker.observe_at("chatter", "a", &meta(1, 1), 1);
        tracker.observe_at("chatter", "a", &meta(2, 2), 2);
        let snap = tracker.snapshot("chatter").expect("stats exist");
        assert_eq!(snap.publication.count(), 1);
        assert_eq!(snap.dropped_msg_count, 0);

        tracker.set_enabled("chatter", false);
        assert!(tracker.get("chatter").is_none());
    }

    #[test]
    fn test_monotonic_millis_non_zero_and_ordered() {
        let a = monotonic_millis();
        let b = monotonic_millis();
        assert!(a >= 1);
        assert!(b >= a);
    }
}
