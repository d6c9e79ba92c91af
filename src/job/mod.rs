
pub mod serial_job_queue;

use std::sync::Arc;

use portable_atomic::{AtomicUsize, Ordering};

pub use serial_job_queue::SerialJobQueue;

/// Job is a unit of work which runs to completion once dispatched, without
/// suspending. Dropping a job without running it must release everything
/// it holds.
pub trait Job: Send {
    fn run(self: Box<Self>);
}

/// JobCounter counts the jobs created for one destination which have not
/// finished yet. It is the backpressure signal of that destination.
#[derive(Debug, Default, Clone)]
pub struct JobCounter {
    outstanding: Arc<AtomicUsize>,
}

impl JobCounter {
    pub fn new() -> Self {
        JobCounter::default()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// acquire counts one more outstanding job until the returned guard is
    /// dropped.
    pub fn acquire(&self) -> CountedJob {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        CountedJob {
            counter: self.clone(),
        }
    }
}

/// CountedJob is held by a job for its whole lifetime, so the count is
/// released on every exit path, including jobs dropped before running.
#[derive(Debug)]
pub struct CountedJob {
    counter: JobCounter,
}

impl Drop for CountedJob {
    fn drop(&mut self) {
        self.counter.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}
