//! The range server's work queue (spec §4.4): a singly-linked FIFO of decoded
//! requests. A worker detaches the *entire* queue atomically rather than one
//! item at a time -- this lets one worker process a burst without
//! re-entering the mutex, at the cost of multi-worker parallelism within a
//! single burst (documented tradeoff, spec §4.4).

use crate::reply::ReplyTarget;
use hxhim_wire::Message;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// A decoded request paired with where its response should go.
pub struct WorkItem {
    pub message: Message,
    pub reply: ReplyTarget,
}

/// The shared FIFO, condition variable, and shutdown flag (mirrors the
/// teacher's `BackgroundScheduler` plumbing, minus priority ordering).
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    work_ready: Condvar,
    shutdown: AtomicBool,
}

impl WorkQueue {
    pub fn new() -> Self {
        WorkQueue {
            items: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Append one item and wake a worker.
    pub fn push(&self, item: WorkItem) {
        self.items.lock().push_back(item);
        self.work_ready.notify_one();
    }

    /// Block until the queue is non-empty, then detach and return everything
    /// currently queued as one burst. Returns `None` once shutdown has been
    /// signaled and the queue is empty (the worker's exit condition).
    pub fn detach_burst(&self) -> Option<VecDeque<WorkItem>> {
        let mut items = self.items.lock();
        loop {
            if !items.is_empty() {
                return Some(std::mem::take(&mut *items));
            }
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            self.work_ready.wait(&mut items);
        }
    }

    /// Current queue depth, for `stats()` (ambient observability).
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Signal shutdown and wake every worker blocked on the condition.
    /// Locking the queue before notifying avoids a lost wakeup: a worker
    /// between its shutdown check and `wait()` holds this lock, so acquiring
    /// it guarantees the worker either is already parked (woken by this
    /// notify) or hasn't checked yet (and will see `shutdown` once it does).
    pub fn trigger_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let _guard = self.items.lock();
        self.work_ready.notify_all();
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::unreachable_reply_target;
    use hxhim_core::IndexType;
    use hxhim_wire::Header;

    fn item() -> WorkItem {
        WorkItem {
            message: Message::Close {
                header: Header { src: 0, dst: 0, index: "primary".to_string(), index_type: IndexType::Primary, per_entry_db: vec![0] },
            },
            reply: unreachable_reply_target(),
        }
    }

    #[test]
    fn detach_burst_drains_everything_at_once() {
        let queue = WorkQueue::new();
        queue.push(item());
        queue.push(item());
        let burst = queue.detach_burst().unwrap();
        assert_eq!(burst.len(), 2);
        assert!(queue.items.lock().is_empty());
    }

    #[test]
    fn shutdown_with_empty_queue_returns_none() {
        let queue = WorkQueue::new();
        queue.trigger_shutdown();
        assert!(queue.detach_burst().is_none());
    }
}
