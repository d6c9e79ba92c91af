use portable_atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Job;

/// SerialJobQueue runs jobs one at a time, in submission order, on a tokio
/// task. Every job touching the state of one outbound stream goes through
/// the queue of the receiving endpoint, which makes that job the only writer
/// of the state while it runs.
pub struct SerialJobQueue {
    name: String,
    tx: mpsc::UnboundedSender<Box<dyn Job>>,
    handle: JoinHandle<()>,
    closed: AtomicBool,
}

impl SerialJobQueue {
    /// new spawns the queue's worker task on the current tokio runtime.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Box<dyn Job>>();
        let worker_name = name.clone();
        let handle = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.run();
            }
            log::debug!("job queue {} stopped", worker_name);
        });

        SerialJobQueue {
            name,
            tx,
            handle,
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// add enqueues a job. Returns false when the queue is closed, in which
    /// case the job is dropped without running.
    pub fn add(&self, job: Box<dyn Job>) -> bool {
        if self.is_closed() {
            log::debug!("job queue {} closed, discarding job", self.name);
            return false;
        }
        match self.tx.send(job) {
            Ok(()) => true,
            Err(_) => {
                log::debug!("job queue {} closed, discarding job", self.name);
                false
            }
        }
    }

    /// close stops the worker. Jobs still queued are dropped without running.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.handle.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }
}

impl Drop for SerialJobQueue {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
