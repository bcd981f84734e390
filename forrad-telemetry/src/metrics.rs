//! ## forrad-telemetry::metrics
//! **Prometheus export of allocator events**
//!
//! [`MetricsRecorder`] implements the allocator's `MetricsSink`, so it can be
//! handed to an `AllocatorDomain` directly or paired with `AllocStats`.

use forrad_core::alloc::MetricsSink;
use prometheus::{IntCounter, Registry};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub chunk_appends: IntCounter,
    pub chunk_bytes: IntCounter,
    pub alloc_yields: IntCounter,
    pub quota_exceeded: IntCounter,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let chunk_appends = IntCounter::new(
            "forrad_chunk_appends_total",
            "Memory chunks appended by all chunk sources",
        )?;
        let chunk_bytes = IntCounter::new(
            "forrad_chunk_bytes_total",
            "Bytes charged to the shared pool budget",
        )?;
        let alloc_yields = IntCounter::new(
            "forrad_alloc_yields_total",
            "Allocations that waited under backpressure",
        )?;
        let quota_exceeded = IntCounter::new(
            "forrad_quota_exceeded_total",
            "Times the shared pool budget was first exceeded",
        )?;

        registry.register(Box::new(chunk_appends.clone()))?;
        registry.register(Box::new(chunk_bytes.clone()))?;
        registry.register(Box::new(alloc_yields.clone()))?;
        registry.register(Box::new(quota_exceeded.clone()))?;

        Ok(Self {
            registry,
            chunk_appends,
            chunk_bytes,
            alloc_yields,
            quota_exceeded,
        })
    }

    /// Renders every registered metric in the Prometheus text format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl MetricsSink for MetricsRecorder {
    fn chunk_appended(&self, bytes: usize) {
        self.chunk_appends.inc();
        self.chunk_bytes.inc_by(bytes as u64);
    }

    fn yielded(&self) {
        self.alloc_yields.inc();
    }

    fn quota_exceeded(&self) {
        self.quota_exceeded.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forrad_core::alloc::AllocStats;
    use forrad_core::sched::{LocalScheduler, NullCommunicator};
    use forrad_core::{AllocatorDomain, ObjectPool};
    use std::rc::Rc;

    #[test]
    fn test_counters_render() {
        let recorder = MetricsRecorder::new().unwrap();
        recorder.chunk_appended(1024);
        recorder.yielded();

        let text = recorder.gather_metrics().unwrap();
        assert!(text.contains("forrad_chunk_appends_total 1"));
        assert!(text.contains("forrad_chunk_bytes_total 1024"));
        assert!(text.contains("forrad_alloc_yields_total 1"));
        assert!(text.contains("forrad_quota_exceeded_total 0"));
    }

    #[test]
    fn test_recorder_as_domain_sink() {
        let recorder = MetricsRecorder::new().unwrap();
        let stats = Rc::new(AllocStats::new());
        let domain = AllocatorDomain::new(
            1,
            Rc::new(LocalScheduler::new()),
            Rc::new(NullCommunicator),
            Rc::new((recorder.clone(), stats.clone())),
        );
        let pool: ObjectPool = ObjectPool::new(domain, 8, 32, 4).unwrap();
        assert!(pool.try_alloc().is_some());

        assert_eq!(recorder.chunk_appends.get(), 1);
        assert_eq!(recorder.quota_exceeded.get(), 1);
        assert_eq!(recorder.chunk_bytes.get(), stats.bytes_allocated());
    }
}
