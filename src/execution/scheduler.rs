//! Execution scheduler - decides job order and concurrency

use crate::core::Build;

/// Strategy for scheduling job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingStrategy {
    /// Run jobs one at a time
    #[default]
    Sequential,

    /// Run every job at once
    Parallel,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

/// Scheduler for determining how jobs run
#[derive(Debug, Clone)]
pub struct ExecutionScheduler {
    strategy: SchedulingStrategy,
}

impl ExecutionScheduler {
    pub fn new(strategy: SchedulingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// How many of `total` jobs may run at the same time
    pub fn concurrency(&self, total: usize) -> usize {
        match self.strategy {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::Parallel => total.max(1),
            SchedulingStrategy::LimitedParallel(max) => max.clamp(1, total.max(1)),
        }
    }

    /// Job indices in start order: required jobs first, matrix order otherwise
    pub fn order(&self, build: &Build) -> Vec<usize> {
        let (mut required, allowed): (Vec<usize>, Vec<usize>) =
            (0..build.jobs.len()).partition(|&i| !build.jobs[i].allow_failure);
        required.extend(allowed);
        required
    }
}
