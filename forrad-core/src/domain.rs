//! ## forrad-core::domain
//! **Allocator domain: the per-node quota shared by all pools**
//!
//! Every [`ChunkSource`](crate::alloc::chunk::ChunkSource) charges its chunk
//! appends to the domain it was created in. Pools consult the domain before
//! carving fresh objects and, when over budget, go through its backpressure
//! round instead.
//!
//! The counters are plain `Cell`s. A domain belongs to one worker thread and
//! is shared between that worker's pools through `Rc`; the type is `!Sync`,
//! so a second OS thread has to build its own domain.

use std::cell::Cell;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::alloc::stats::{AllocStats, MetricsSink};
use crate::sched::{Communicator, LocalScheduler, NullCommunicator, Scheduler};

pub struct AllocatorDomain {
    total_allocated: Cell<usize>,
    max_bytes: usize,
    exceeded: Cell<bool>,
    scheduler: Rc<dyn Scheduler>,
    communicator: Rc<dyn Communicator>,
    metrics: Rc<dyn MetricsSink>,
}

impl AllocatorDomain {
    /// Creates a domain that allows fresh carving while fewer than
    /// `max_bytes` have been charged.
    pub fn new(
        max_bytes: usize,
        scheduler: Rc<dyn Scheduler>,
        communicator: Rc<dyn Communicator>,
        metrics: Rc<dyn MetricsSink>,
    ) -> Rc<Self> {
        Rc::new(Self {
            total_allocated: Cell::new(0),
            max_bytes,
            exceeded: Cell::new(false),
            scheduler,
            communicator,
            metrics,
        })
    }

    /// A domain with no budget, a [`LocalScheduler`] and no communicator.
    pub fn unbounded() -> Rc<Self> {
        Self::new(
            usize::MAX,
            Rc::new(LocalScheduler::new()),
            Rc::new(NullCommunicator),
            Rc::new(AllocStats::new()),
        )
    }

    /// Bytes charged so far by every chunk source in the domain.
    #[inline]
    pub fn total_allocated(&self) -> usize {
        self.total_allocated.get()
    }

    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Whether the one-shot over-budget latch has fired.
    #[inline]
    pub fn is_exceeded(&self) -> bool {
        self.exceeded.get()
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.scheduler
    }

    pub fn metrics(&self) -> &dyn MetricsSink {
        &*self.metrics
    }

    /// Adds `bytes` to the shared counter. Never refused.
    pub(crate) fn charge(&self, bytes: usize) {
        let total = self.total_allocated.get().saturating_add(bytes);
        self.total_allocated.set(total);

        if total > self.max_bytes && !self.exceeded.get() {
            self.exceeded.set(true);
            warn!(
                total_allocated = total,
                max_bytes = self.max_bytes,
                "Shared pool size {} exceeded max size {}",
                total,
                self.max_bytes
            );
            self.metrics.quota_exceeded();
        }
    }

    /// Fresh carving is allowed below the budget, and always inside a
    /// no-switch region where yielding is not an option.
    #[inline]
    pub(crate) fn may_carve(&self) -> bool {
        self.total_allocated.get() < self.max_bytes || self.scheduler.in_no_switch_region()
    }

    /// One backpressure round: drive network progress, then let other tasks run.
    pub(crate) async fn backpressure(&self) {
        trace!(
            total_allocated = self.total_allocated.get(),
            max_bytes = self.max_bytes,
            "pool over budget, yielding"
        );
        self.communicator.poll();
        self.scheduler.yield_now().await;
    }
}

impl std::fmt::Debug for AllocatorDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocatorDomain")
            .field("total_allocated", &self.total_allocated.get())
            .field("max_bytes", &self.max_bytes)
            .field("exceeded", &self.exceeded.get())
            .finish_non_exhaustive()
    }
}
