//! Per-operation queue state (spec §3 Queue state, §4.5 Enqueue).
//!
//! The distilled spec lists eight independent queues: PUT/GET/RANGE-GET/DELETE
//! plus an "unsafe" variant of each. This implementation folds the safe and
//! unsafe variant of each operation into one queue whose entries carry an
//! `Option<Destination>` -- `None` routes through the partitioner as usual,
//! `Some(dest)` bypasses it the way an unsafe call does (spec §3 "An 'unsafe'
//! PUT names an explicit destination database and bypasses the hash router").
//! DESIGN.md records this as an Open Question resolution: it halves the
//! number of mutexes and background-drainer sources without changing
//! observable behavior, since the two variants differ only in how a
//! destination is chosen, not in how they are batched or drained. RANGE-GET
//! is folded into the GET queue the same way, distinguished by `num_recs`.
//!
//! PUT is the only queue with background-drainer plumbing (`start_cv`/
//! `done_cv`/`force_flush`); GET and DELETE are flushed synchronously
//! (spec §4.5).

use crate::batch::BatchChain;
use hxhim_core::{GetOp, HxhimResult, Triple};
use hxhim_partition::Destination;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// One queued PUT.
pub struct PutEntry {
    pub triple: Triple,
    pub unsafe_dest: Option<Destination>,
}

/// One queued GET or RANGE-GET. `seed` is the already-encoded physical key
/// (`None` only valid for `GetOp::First`/`GetOp::Last`); `num_recs > 1`
/// selects the range-scan path (spec §4.4 "BGET with range-op").
pub struct GetEntry {
    pub seed: Option<Vec<u8>>,
    pub op: GetOp,
    pub num_recs: usize,
    pub unsafe_dest: Option<Destination>,
}

/// One queued DELETE.
pub struct DeleteEntry {
    pub first: Vec<u8>,
    pub second: Vec<u8>,
    pub unsafe_dest: Option<Destination>,
}

/// A detached run of batch nodes, tagged with whether the caller forced the
/// drain (spec §4.5 step 2-3).
pub struct DrainBatch<T> {
    pub nodes: VecDeque<Vec<T>>,
    pub forced: bool,
}

struct PutQueueState {
    chain: BatchChain<PutEntry>,
    running: bool,
    force_flush: bool,
}

/// The PUT queue: enqueue is lock-free apart from the chain mutex; draining
/// is driven by the background drainer thread via [`Self::next_batch`]
/// (spec §4.5 Background PUT drainer).
pub struct PutQueue {
    state: Mutex<PutQueueState>,
    start_cv: Condvar,
    done_cv: Condvar,
}

impl PutQueue {
    pub fn new() -> Self {
        PutQueue {
            state: Mutex::new(PutQueueState { chain: BatchChain::new(), running: true, force_flush: false }),
            start_cv: Condvar::new(),
            done_cv: Condvar::new(),
        }
    }

    /// Append one PUT. Signals the drainer's start condition if this entry
    /// just filled its node (spec §4.5 Enqueue: "for PUTs only, signals the
    /// drainer's start condition").
    pub fn enqueue(&self, entry: PutEntry) {
        let mut state = self.state.lock();
        if state.chain.push(entry) {
            self.start_cv.notify_one();
        }
    }

    /// Block until there is a batch to drain, or the queue has shut down
    /// with nothing left (`None`). Called only by the background drainer.
    pub fn next_batch(&self, watermark: usize) -> Option<DrainBatch<PutEntry>> {
        let mut state = self.state.lock();
        loop {
            if state.force_flush {
                let nodes = state.chain.take_all();
                return Some(DrainBatch { nodes, forced: true });
            }
            if state.chain.full_batches() >= watermark.max(1) {
                let nodes = state.chain.take_full_prefix();
                if !nodes.is_empty() {
                    return Some(DrainBatch { nodes, forced: false });
                }
            }
            if !state.running {
                return None;
            }
            self.start_cv.wait(&mut state);
        }
    }

    /// Request an immediate drain of everything currently queued and block
    /// until the drainer has processed it. Returns an error without waiting
    /// further if shutdown happens first (spec §8 property: "shutdown
    /// cancels in-flight").
    pub fn force_flush(&self) -> HxhimResult<()> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(hxhim_core::HxhimError::Shutdown);
        }
        state.force_flush = true;
        self.start_cv.notify_one();
        while state.force_flush && state.running {
            self.done_cv.wait(&mut state);
        }
        if !state.running {
            return Err(hxhim_core::HxhimError::Shutdown);
        }
        Ok(())
    }

    /// Called by the drainer once a forced drain completes: clears the flag
    /// and wakes whoever is blocked in [`Self::force_flush`].
    pub fn finish_forced(&self) {
        let mut state = self.state.lock();
        state.force_flush = false;
        self.done_cv.notify_all();
    }

    /// Stop the drainer and wake every thread waiting on either condition
    /// (spec §3 Lifecycles: "broadcasts both condition variables").
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.force_flush = false;
        self.start_cv.notify_all();
        self.done_cv.notify_all();
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().chain.is_empty()
    }
}

impl Default for PutQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// A synchronously-flushed queue (GET/RANGE-GET, DELETE): no background
/// thread, the flush caller drains the whole chain itself (spec §4.5
/// "non-PUT flushes ... block on the queue mutex and on the transport
/// receive").
pub struct SyncQueue<T> {
    chain: Mutex<BatchChain<T>>,
}

impl<T> SyncQueue<T> {
    pub fn new() -> Self {
        SyncQueue { chain: Mutex::new(BatchChain::new()) }
    }

    pub fn enqueue(&self, entry: T) {
        self.chain.lock().push(entry);
    }

    pub fn drain_all(&self) -> VecDeque<Vec<T>> {
        self.chain.lock().take_all()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.lock().is_empty()
    }
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_wakes_drainer_only_once_node_is_full() {
        let queue = PutQueue::new();
        for _ in 0..hxhim_core::Limits::BATCH_CAP - 1 {
            queue.enqueue(PutEntry { triple: Triple::new("s", "p", "o"), unsafe_dest: None });
        }
        assert!(!queue.is_empty());
    }

    #[test]
    fn shutdown_wakes_a_pending_force_flush_with_an_error() {
        let queue = std::sync::Arc::new(PutQueue::new());
        let q2 = queue.clone();
        let handle = std::thread::spawn(move || q2.force_flush());
        // Give the flush call a moment to start waiting before we shut down.
        std::thread::sleep(std::time::Duration::from_millis(20));
        queue.shutdown();
        assert!(matches!(handle.join().unwrap(), Err(hxhim_core::HxhimError::Shutdown)));
    }

    #[test]
    fn sync_queue_drain_all_empties_the_chain() {
        let queue: SyncQueue<u8> = SyncQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        let drained = queue.drain_all();
        assert_eq!(drained.len(), 1);
        assert!(queue.is_empty());
    }
}
