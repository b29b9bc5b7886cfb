//! Performance Tracker — per-provider success/latency/rating bookkeeping
//!
//! Process-wide state mutated after every dispatch attempt and whenever a
//! caller records explicit feedback. Updates go through a single mutex so
//! concurrent fan-outs never lose increments to the running latency mean.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// Upper bound on retained user ratings per provider. Oldest entries are
/// evicted first, keeping memory bounded in long-running processes.
pub const MAX_RATING_HISTORY: usize = 100;

/// Accumulated performance data for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStats {
    pub provider: String,
    pub total_queries: u64,
    pub success_count: u64,
    /// Incrementally updated running mean over all recorded attempts.
    pub avg_latency_ms: f64,
    /// User-supplied 1-5 quality ratings, newest last.
    pub ratings: VecDeque<u8>,
    pub last_updated: DateTime<Utc>,
}

impl ProviderStats {
    fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            total_queries: 0,
            success_count: 0,
            avg_latency_ms: 0.0,
            ratings: VecDeque::new(),
            last_updated: Utc::now(),
        }
    }

    fn record(&mut self, success: bool, latency_ms: u64) {
        self.total_queries += 1;
        if success {
            self.success_count += 1;
        }
        let n = self.total_queries as f64;
        self.avg_latency_ms = (self.avg_latency_ms * (n - 1.0) + latency_ms as f64) / n;
        self.last_updated = Utc::now();
    }

    fn push_rating(&mut self, rating: u8) {
        if self.ratings.len() == MAX_RATING_HISTORY {
            self.ratings.pop_front();
        }
        self.ratings.push_back(rating.clamp(1, 5));
    }

    /// Success rate over all recorded attempts (0.0-1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.success_count as f64 / self.total_queries as f64
        }
    }

    /// Mean user rating, or `None` when no ratings exist.
    pub fn average_rating(&self) -> Option<f64> {
        if self.ratings.is_empty() {
            return None;
        }
        let sum: u32 = self.ratings.iter().map(|&r| r as u32).sum();
        Some(sum as f64 / self.ratings.len() as f64)
    }
}

/// Tracks performance signals for every provider seen so far.
#[derive(Default)]
pub struct PerformanceTracker {
    stats: Mutex<HashMap<String, ProviderStats>>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ProviderStats>> {
        self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record one dispatch attempt.
    pub fn record(&self, provider: &str, success: bool, latency_ms: u64) {
        debug!(provider, success, latency_ms, "recording attempt");
        let mut stats = self.lock();
        stats
            .entry(provider.to_string())
            .or_insert_with(|| ProviderStats::new(provider))
            .record(success, latency_ms);
    }

    /// Record one dispatch attempt plus a user quality rating.
    pub fn record_with_rating(&self, provider: &str, success: bool, latency_ms: u64, rating: u8) {
        debug!(provider, success, latency_ms, rating, "recording rated attempt");
        let mut stats = self.lock();
        let entry = stats
            .entry(provider.to_string())
            .or_insert_with(|| ProviderStats::new(provider));
        entry.record(success, latency_ms);
        entry.push_rating(rating);
    }

    /// Mean user rating for a provider, or `None` if it has no ratings
    /// (including providers never seen).
    pub fn average_rating(&self, provider: &str) -> Option<f64> {
        self.lock().get(provider).and_then(|s| s.average_rating())
    }

    /// Snapshot of every tracked provider, sorted by name for
    /// deterministic output.
    pub fn stats(&self) -> Vec<ProviderStats> {
        let mut all: Vec<ProviderStats> = self.lock().values().cloned().collect();
        all.sort_by(|a, b| a.provider.cmp(&b.provider));
        all
    }

    /// Drop all accumulated stats.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_mean_matches_hand_computation() {
        let tracker = PerformanceTracker::new();
        tracker.record("p", true, 100);
        tracker.record("p", false, 300);
        tracker.record("p", true, 200);

        let stats = tracker.stats();
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.total_queries, 3);
        assert_eq!(s.success_count, 2);
        // (100 + 300 + 200) / 3
        assert!((s.avg_latency_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_alternating_success_failure() {
        let tracker = PerformanceTracker::new();
        for i in 0..10u64 {
            tracker.record("p", i % 2 == 0, 50 + i * 10);
        }
        let s = &tracker.stats()[0];
        assert_eq!(s.total_queries, 10);
        assert_eq!(s.success_count, 5);
        // mean of 50, 60, ..., 140
        assert!((s.avg_latency_ms - 95.0).abs() < 1e-9);
        assert!((s.success_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_average_rating_none_without_data() {
        let tracker = PerformanceTracker::new();
        assert_eq!(tracker.average_rating("unknown"), None);
        tracker.record("p", true, 10);
        assert_eq!(tracker.average_rating("p"), None);
    }

    #[test]
    fn test_ratings_clamped_and_averaged() {
        let tracker = PerformanceTracker::new();
        tracker.record_with_rating("p", true, 10, 5);
        tracker.record_with_rating("p", true, 10, 3);
        tracker.record_with_rating("p", true, 10, 0); // clamps to 1
        let avg = tracker.average_rating("p").unwrap();
        assert!((avg - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rating_history_bounded() {
        let tracker = PerformanceTracker::new();
        for _ in 0..MAX_RATING_HISTORY {
            tracker.record_with_rating("p", true, 1, 1);
        }
        tracker.record_with_rating("p", true, 1, 5);

        let s = &tracker.stats()[0];
        assert_eq!(s.ratings.len(), MAX_RATING_HISTORY);
        // oldest entry evicted, newest retained
        assert_eq!(*s.ratings.back().unwrap(), 5);
    }

    #[test]
    fn test_stats_sorted_by_name() {
        let tracker = PerformanceTracker::new();
        tracker.record("zeta", true, 1);
        tracker.record("alpha", true, 1);
        let names: Vec<String> = tracker.stats().into_iter().map(|s| s.provider).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_clear_resets_everything() {
        let tracker = PerformanceTracker::new();
        tracker.record_with_rating("p", true, 10, 4);
        tracker.clear();
        assert!(tracker.stats().is_empty());
        assert_eq!(tracker.average_rating("p"), None);
    }

    #[test]
    fn test_concurrent_records_not_lost() {
        use std::sync::Arc;
        let tracker = Arc::new(PerformanceTracker::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    tracker.record("p", true, 10);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.stats()[0].total_queries, 800);
    }
}
