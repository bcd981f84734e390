//! ## forrad-core::sched
//! **Cooperative scheduler and communicator seams**
//!
//! The allocator never blocks a worker thread. When a pool is over budget it
//! drives network progress through a [`Communicator`] and suspends the current
//! task through a [`Scheduler`], then retries. Both are supplied by the
//! runtime that owns the worker; [`LocalScheduler`] and the communicators
//! below are the implementations used on a tokio `LocalSet`.

use std::cell::Cell;

use async_trait::async_trait;

/// Cooperative task scheduler of one worker.
#[async_trait(?Send)]
pub trait Scheduler {
    /// Whether the current task declared that it must not be switched out.
    fn in_no_switch_region(&self) -> bool;

    /// Suspends the current task; resumes it later at the same point.
    async fn yield_now(&self);
}

/// Network layer progress hook. Non-blocking and safe to call repeatedly.
pub trait Communicator {
    fn poll(&self);
}

/// Scheduler for tasks running on a tokio current-thread runtime or `LocalSet`.
#[derive(Debug, Default)]
pub struct LocalScheduler {
    no_switch_depth: Cell<usize>,
    yields: Cell<u64>,
}

impl LocalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a no-switch region until the guard drops. Regions nest.
    pub fn enter_no_switch(&self) -> NoSwitchGuard<'_> {
        self.no_switch_depth.set(self.no_switch_depth.get() + 1);
        NoSwitchGuard { scheduler: self }
    }

    /// Number of times a task yielded through this scheduler.
    pub fn yields(&self) -> u64 {
        self.yields.get()
    }
}

#[async_trait(?Send)]
impl Scheduler for LocalScheduler {
    #[inline]
    fn in_no_switch_region(&self) -> bool {
        self.no_switch_depth.get() > 0
    }

    async fn yield_now(&self) {
        debug_assert!(
            !self.in_no_switch_region(),
            "yield requested inside a no-switch region"
        );
        self.yields.set(self.yields.get() + 1);
        tokio::task::yield_now().await;
    }
}

/// RAII marker for a no-switch region, see [`LocalScheduler::enter_no_switch`].
#[must_use = "the region ends when the guard is dropped"]
pub struct NoSwitchGuard<'a> {
    scheduler: &'a LocalScheduler,
}

impl Drop for NoSwitchGuard<'_> {
    fn drop(&mut self) {
        let depth = &self.scheduler.no_switch_depth;
        depth.set(depth.get() - 1);
    }
}

/// Communicator for single-node setups with no transfers to drive.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCommunicator;

impl Communicator for NullCommunicator {
    #[inline]
    fn poll(&self) {}
}

/// Communicator that only records how often it was polled.
#[derive(Debug, Default)]
pub struct CountingCommunicator {
    polls: Cell<u64>,
}

impl CountingCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn polls(&self) -> u64 {
        self.polls.get()
    }
}

impl Communicator for CountingCommunicator {
    fn poll(&self) {
        self.polls.set(self.polls.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_switch_regions_nest() {
        let scheduler = LocalScheduler::new();
        assert!(!scheduler.in_no_switch_region());
        {
            let _outer = scheduler.enter_no_switch();
            {
                let _inner = scheduler.enter_no_switch();
                assert!(scheduler.in_no_switch_region());
            }
            assert!(scheduler.in_no_switch_region());
        }
        assert!(!scheduler.in_no_switch_region());
    }

    #[tokio::test]
    async fn test_yield_now_counts() {
        let scheduler = LocalScheduler::new();
        scheduler.yield_now().await;
        scheduler.yield_now().await;
        assert_eq!(scheduler.yields(), 2);
    }

    #[test]
    fn test_counting_communicator() {
        let comm = CountingCommunicator::new();
        comm.poll();
        comm.poll();
        assert_eq!(comm.polls(), 2);
        NullCommunicator.poll();
    }
}
