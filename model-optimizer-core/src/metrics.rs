//! Metrics and performance tracking
//!
//! Lock-free load counters and the fixed-capacity sample window used by the
//! performance monitor.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for loader activity
#[derive(Debug, Default)]
pub struct LoadStatistics {
    pub fetches: AtomicU64,
    pub decodes: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    /// Loads that joined an in-flight load of the same key
    pub coalesced: AtomicU64,
    pub failures: AtomicU64,
}

impl LoadStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode(&self) {
        self.decodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LoadCounters {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        LoadCounters {
            fetches: self.fetches.load(Ordering::Relaxed),
            decodes: self.decodes.load(Ordering::Relaxed),
            cache_hits: hits,
            cache_misses: misses,
            coalesced: self.coalesced.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hit_rate: if hits + misses > 0 {
                hits as f64 / (hits + misses) as f64
            } else {
                0.0
            },
        }
    }
}

/// Point-in-time copy of [`LoadStatistics`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadCounters {
    pub fetches: u64,
    pub decodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced: u64,
    pub failures: u64,
    pub cache_hit_rate: f64,
}

/// Fixed-capacity sample window; the oldest sample is dropped on overflow
#[derive(Debug, Clone)]
pub struct RingBuffer {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Arithmetic mean, zero when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let mut buffer = RingBuffer::new(3);
        for sample in [1.0, 2.0, 3.0, 4.0] {
            buffer.push(sample);
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.mean(), 3.0);
    }

    #[test]
    fn test_empty_mean_is_zero() {
        assert_eq!(RingBuffer::new(100).mean(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let stats = LoadStatistics::new();
        stats.record_cache_hit();
        stats.record_cache_hit();
        stats.record_cache_hit();
        stats.record_cache_miss();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.cache_hits, 3);
        assert_eq!(snapshot.cache_hit_rate, 0.75);
    }
}
