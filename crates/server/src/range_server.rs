//! The range server itself: owns the listener thread, the worker pool, and
//! the index registry; implements [`LocalDispatch`] so the loopback
//! transport can hand it a request directly (spec §4.3 Loopback, §4.4).

use crate::handlers::HandlerConfig;
use crate::reply::ReplyTarget;
use crate::workqueue::{WorkItem, WorkQueue};
use crate::{listener, worker};
use hxhim_core::Rank;
use hxhim_index::IndexRegistry;
use hxhim_wire::channel::Envelope;
use hxhim_wire::{LocalDispatch, Message, ResponseSlot, Shutdown, Transport};
use parking_lot::Mutex;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

/// A running range server: listener + worker pool sharing one work queue and
/// one index registry. `shutdown()` takes `&self` (not `&mut self`) so the
/// server can be held behind the same `Arc` used to register it as a
/// [`LocalDispatch`] target.
pub struct RangeServer {
    queue: Arc<WorkQueue>,
    registry: Arc<IndexRegistry>,
    shutdown_flag: Shutdown,
    listener_handle: Mutex<Option<JoinHandle<()>>>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RangeServer {
    /// Start a range server listening on `transport` with `num_workers`
    /// worker threads, serving `registry`.
    pub fn start(
        rank: Rank,
        transport: Arc<dyn Transport>,
        registry: Arc<IndexRegistry>,
        num_workers: usize,
        config: HandlerConfig,
        shutdown_flag: Shutdown,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new());
        let listener_handle = listener::spawn(transport, Arc::clone(&queue), shutdown_flag.clone(), rank);
        let worker_handles = worker::spawn_pool(num_workers, Arc::clone(&queue), Arc::clone(&registry), config, rank);
        RangeServer {
            queue,
            registry,
            shutdown_flag,
            listener_handle: Mutex::new(Some(listener_handle)),
            worker_handles: Mutex::new(worker_handles),
        }
    }

    /// Start a range server whose listener polls a channel-fabric
    /// `Receiver<Envelope>` instead of a [`Transport`] (spec §4.3, the
    /// in-process multi-rank backend used by [`hxhim_wire::channel`]).
    pub fn start_channel(
        rank: Rank,
        rx: Receiver<Envelope>,
        registry: Arc<IndexRegistry>,
        num_workers: usize,
        config: HandlerConfig,
        shutdown_flag: Shutdown,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new());
        let listener_handle = listener::spawn_envelope(rx, Arc::clone(&queue), shutdown_flag.clone(), rank);
        let worker_handles = worker::spawn_pool(num_workers, Arc::clone(&queue), Arc::clone(&registry), config, rank);
        RangeServer {
            queue,
            registry,
            shutdown_flag,
            listener_handle: Mutex::new(Some(listener_handle)),
            worker_handles: Mutex::new(worker_handles),
        }
    }

    /// The index registry this server is serving, for tests and ambient
    /// `stats()` reporting.
    pub fn registry(&self) -> &Arc<IndexRegistry> {
        &self.registry
    }

    /// Number of items currently queued, for `stats()` (ambient observability).
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Signal shutdown and join every thread. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown_flag.trigger();
        self.queue.trigger_shutdown();
        if let Some(handle) = self.listener_handle.lock().take() {
            let _ = handle.join();
        }
        for handle in self.worker_handles.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for RangeServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LocalDispatch for RangeServer {
    fn dispatch(&self, request: Message, slot: ResponseSlot) {
        self.queue.push(WorkItem { message: request, reply: ReplyTarget::Loopback(slot) });
    }
}
