//! Rotation Metrics
//!
//! Thread-safe counters shared by the per-location workers of a run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Thread-safe metrics for tracking rotation runs
#[derive(Debug, Clone)]
pub struct RotationMetrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    /// Number of locations rotated
    locations_rotated: AtomicUsize,
    /// Number of locations without a matching policy
    locations_unresolved: AtomicUsize,
    /// Total number of artifacts given a decision
    artifacts_evaluated: AtomicUsize,
    /// Total number of artifacts kept
    artifacts_kept: AtomicUsize,
    /// Total number of artifacts marked for removal
    artifacts_removed: AtomicUsize,
    /// Total number of artifacts removed by include/exclude filters
    artifacts_excluded: AtomicUsize,
    /// Total number of candidates with unparseable timestamps
    extraction_failures: AtomicUsize,
    /// Total bytes marked for removal
    bytes_removable: AtomicU64,
    /// Total duration in milliseconds
    total_duration_ms: AtomicU64,
}

impl Default for RotationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                locations_rotated: AtomicUsize::new(0),
                locations_unresolved: AtomicUsize::new(0),
                artifacts_evaluated: AtomicUsize::new(0),
                artifacts_kept: AtomicUsize::new(0),
                artifacts_removed: AtomicUsize::new(0),
                artifacts_excluded: AtomicUsize::new(0),
                extraction_failures: AtomicUsize::new(0),
                bytes_removable: AtomicU64::new(0),
                total_duration_ms: AtomicU64::new(0),
            }),
        }
    }

    pub fn record_location_rotated(&self) {
        self.inner.locations_rotated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_location_unresolved(&self) {
        self.inner
            .locations_unresolved
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_artifacts_evaluated(&self, count: usize) {
        self.inner
            .artifacts_evaluated
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_artifacts_kept(&self, count: usize) {
        self.inner.artifacts_kept.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_artifacts_removed(&self, count: usize) {
        self.inner
            .artifacts_removed
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_artifacts_excluded(&self, count: usize) {
        self.inner
            .artifacts_excluded
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_extraction_failures(&self, count: usize) {
        self.inner
            .extraction_failures
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_bytes_removable(&self, bytes: u64) {
        self.inner
            .bytes_removable
            .fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_duration_ms(&self, duration_ms: u64) {
        self.inner
            .total_duration_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
    }

    pub fn locations_rotated(&self) -> usize {
        self.inner.locations_rotated.load(Ordering::Relaxed)
    }

    pub fn locations_unresolved(&self) -> usize {
        self.inner.locations_unresolved.load(Ordering::Relaxed)
    }

    pub fn artifacts_evaluated(&self) -> usize {
        self.inner.artifacts_evaluated.load(Ordering::Relaxed)
    }

    pub fn artifacts_kept(&self) -> usize {
        self.inner.artifacts_kept.load(Ordering::Relaxed)
    }

    pub fn artifacts_removed(&self) -> usize {
        self.inner.artifacts_removed.load(Ordering::Relaxed)
    }

    pub fn artifacts_excluded(&self) -> usize {
        self.inner.artifacts_excluded.load(Ordering::Relaxed)
    }

    pub fn extraction_failures(&self) -> usize {
        self.inner.extraction_failures.load(Ordering::Relaxed)
    }

    pub fn bytes_removable(&self) -> u64 {
        self.inner.bytes_removable.load(Ordering::Relaxed)
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.inner.total_duration_ms.load(Ordering::Relaxed)
    }
}
