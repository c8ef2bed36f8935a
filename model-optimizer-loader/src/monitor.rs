//! Performance monitoring
//!
//! Rolling windows of load time, render time and memory samples, reported
//! together with the cache and loader counters.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use model_optimizer_core::config::DEFAULT_METRICS_WINDOW;
use model_optimizer_core::{LoadCounters, LoadStatistics, RingBuffer};

use crate::cache::{CacheManager, CacheStats};

#[derive(Debug)]
struct Windows {
    load_ms: RingBuffer,
    render_ms: RingBuffer,
    memory_bytes: RingBuffer,
}

/// Snapshot returned by [`PerformanceMonitor::get_metrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub average_load_ms: f64,
    pub average_render_ms: f64,
    pub average_memory_bytes: f64,
    pub load_samples: usize,
    pub render_samples: usize,
    pub memory_samples: usize,
    pub cache: CacheStats,
    pub loads: LoadCounters,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    windows: Mutex<Windows>,
    cache: Arc<CacheManager>,
    loads: Arc<LoadStatistics>,
}

impl PerformanceMonitor {
    pub fn new(cache: Arc<CacheManager>, loads: Arc<LoadStatistics>) -> Self {
        Self::with_window(cache, loads, DEFAULT_METRICS_WINDOW)
    }

    pub fn with_window(
        cache: Arc<CacheManager>,
        loads: Arc<LoadStatistics>,
        window: usize,
    ) -> Self {
        Self {
            windows: Mutex::new(Windows {
                load_ms: RingBuffer::new(window),
                render_ms: RingBuffer::new(window),
                memory_bytes: RingBuffer::new(window),
            }),
            cache,
            loads,
        }
    }

    fn with_windows<R>(&self, f: impl FnOnce(&mut Windows) -> R) -> R {
        // A panic while recording leaves the buffers usable
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut windows)
    }

    pub fn record_load_time(&self, ms: f64) {
        self.with_windows(|w| w.load_ms.push(ms));
    }

    pub fn record_load_duration(&self, duration: Duration) {
        self.record_load_time(duration.as_secs_f64() * 1000.0);
    }

    pub fn record_render_time(&self, ms: f64) {
        self.with_windows(|w| w.render_ms.push(ms));
    }

    pub fn record_memory_usage(&self, bytes: u64) {
        self.with_windows(|w| w.memory_bytes.push(bytes as f64));
    }

    pub async fn get_metrics(&self) -> PerformanceMetrics {
        let cache = self.cache.stats().await;
        self.with_windows(|w| PerformanceMetrics {
            average_load_ms: w.load_ms.mean(),
            average_render_ms: w.render_ms.mean(),
            average_memory_bytes: w.memory_bytes.mean(),
            load_samples: w.load_ms.len(),
            render_samples: w.render_ms.len(),
            memory_samples: w.memory_bytes.len(),
            cache,
            loads: self.loads.snapshot(),
        })
    }

    pub fn reset(&self) {
        self.with_windows(|w| {
            w.load_ms.clear();
            w.render_ms.clear();
            w.memory_bytes.clear();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(window: usize) -> PerformanceMonitor {
        PerformanceMonitor::with_window(
            Arc::new(CacheManager::new(1024)),
            Arc::new(LoadStatistics::new()),
            window,
        )
    }

    #[tokio::test]
    async fn test_empty_metrics_are_zero() {
        let metrics = monitor(100).get_metrics().await;
        assert_eq!(metrics.average_load_ms, 0.0);
        assert_eq!(metrics.average_render_ms, 0.0);
        assert_eq!(metrics.average_memory_bytes, 0.0);
        assert_eq!(metrics.cache.entries, 0);
        assert_eq!(metrics.cache.max_size, 1024);
    }

    #[tokio::test]
    async fn test_window_keeps_latest_samples() {
        let monitor = monitor(100);
        for i in 0..150 {
            monitor.record_load_time(i as f64);
        }
        monitor.record_render_time(16.0);
        monitor.record_render_time(18.0);
        monitor.record_memory_usage(2048);

        let metrics = monitor.get_metrics().await;
        assert_eq!(metrics.load_samples, 100);
        // Samples 50..150
        assert_eq!(metrics.average_load_ms, 99.5);
        assert_eq!(metrics.average_render_ms, 17.0);
        assert_eq!(metrics.average_memory_bytes, 2048.0);
    }

    #[tokio::test]
    async fn test_reset() {
        let monitor = monitor(4);
        monitor.record_load_duration(Duration::from_millis(250));
        assert_eq!(monitor.get_metrics().await.average_load_ms, 250.0);

        monitor.reset();
        assert_eq!(monitor.get_metrics().await.load_samples, 0);
    }
}
