//! ## forrad-core::alloc::stats
//! **Allocator counters and the metrics seam**
//!
//! Chunk sources and pools report to a [`MetricsSink`]. The sink is
//! write-only from the allocator's point of view; [`AllocStats`] is the
//! in-process implementation and `forrad-telemetry` exports the same events
//! to Prometheus.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receiver for allocator events.
pub trait MetricsSink {
    /// A chunk was appended; `bytes` is what the quota was charged.
    fn chunk_appended(&self, bytes: usize);

    /// An `alloc()` call entered backpressure (at most once per call).
    fn yielded(&self);

    /// The domain crossed its configured maximum for the first time.
    fn quota_exceeded(&self) {}
}

/// Monotonic allocator counters.
///
/// Counters are relaxed atomics; they carry no ordering with the allocator's
/// own state.
#[derive(Debug, Default)]
pub struct AllocStats {
    chunk_appends: AtomicU64,
    bytes_allocated: AtomicU64,
    yields: AtomicU64,
    quota_exceeded: AtomicU64,
}

/// Point-in-time copy of [`AllocStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunk_appends: u64,
    pub bytes_allocated: u64,
    pub yields: u64,
    pub quota_exceeded: u64,
}

impl AllocStats {
    /// Creates a new `AllocStats` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of chunk appends.
    pub fn chunk_appends(&self) -> u64 {
        self.chunk_appends.load(Ordering::Relaxed)
    }

    /// Returns the bytes charged by chunk appends.
    pub fn bytes_allocated(&self) -> u64 {
        self.bytes_allocated.load(Ordering::Relaxed)
    }

    /// Returns the number of `alloc()` calls that had to yield.
    pub fn yields(&self) -> u64 {
        self.yields.load(Ordering::Relaxed)
    }

    /// Returns how often the quota latch fired. Anything above one is a bug.
    pub fn quota_exceeded(&self) -> u64 {
        self.quota_exceeded.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunk_appends: self.chunk_appends(),
            bytes_allocated: self.bytes_allocated(),
            yields: self.yields(),
            quota_exceeded: self.quota_exceeded(),
        }
    }
}

impl MetricsSink for AllocStats {
    #[inline]
    fn chunk_appended(&self, bytes: usize) {
        self.chunk_appends.fetch_add(1, Ordering::Relaxed);
        self.bytes_allocated
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    fn yielded(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn quota_exceeded(&self) {
        self.quota_exceeded.fetch_add(1, Ordering::Relaxed);
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for Rc<S> {
    fn chunk_appended(&self, bytes: usize) {
        (**self).chunk_appended(bytes)
    }

    fn yielded(&self) {
        (**self).yielded()
    }

    fn quota_exceeded(&self) {
        (**self).quota_exceeded()
    }
}

/// Fan-out: both sinks see every event.
impl<A: MetricsSink, B: MetricsSink> MetricsSink for (A, B) {
    fn chunk_appended(&self, bytes: usize) {
        self.0.chunk_appended(bytes);
        self.1.chunk_appended(bytes);
    }

    fn yielded(&self) {
        self.0.yielded();
        self.1.yielded();
    }

    fn quota_exceeded(&self) {
        self.0.quota_exceeded();
        self.1.quota_exceeded();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_stats_increment_and_read() {
        let stats = AllocStats::new();
        assert_eq!(stats.chunk_appends(), 0);
        assert_eq!(stats.yields(), 0);

        stats.chunk_appended(128);
        stats.yielded();

        assert_eq!(stats.chunk_appends(), 1);
        assert_eq!(stats.bytes_allocated(), 128);
        assert_eq!(stats.yields(), 1);
        assert_eq!(stats.quota_exceeded(), 0);
    }

    #[test]
    fn test_alloc_stats_multiple_increments() {
        let stats = AllocStats::new();
        for _ in 0..100 {
            stats.chunk_appended(64);
            stats.yielded();
            MetricsSink::quota_exceeded(&stats);
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.chunk_appends, 100);
        assert_eq!(snapshot.bytes_allocated, 6400);
        assert_eq!(snapshot.yields, 100);
        assert_eq!(snapshot.quota_exceeded, 100);
    }

    #[test]
    fn test_pair_sink_fans_out() {
        let left = Rc::new(AllocStats::new());
        let right = Rc::new(AllocStats::new());
        let pair = (left.clone(), right.clone());

        pair.chunk_appended(10);
        pair.yielded();

        assert_eq!(left.snapshot(), right.snapshot());
        assert_eq!(left.bytes_allocated(), 10);
        assert_eq!(right.yields(), 1);
    }
}
