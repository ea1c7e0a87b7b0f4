//! The range server's worker pool (spec §4.4): N threads, each blocking on
//! the work queue's condition, detaching a whole burst at a time, executing
//! the matching handler per item, and sending the response back via whatever
//! [`ReplyTarget`](crate::reply::ReplyTarget) the item carries.
//!
//! Local writes are serialized by one write mutex shared across every worker
//! (spec §5: "both single- and multi-worker configurations use the same
//! write mutex in this implementation" -- see DESIGN.md for the Open
//! Question this resolves).

use crate::handlers::{self, HandlerConfig};
use crate::workqueue::WorkQueue;
use hxhim_index::IndexRegistry;
use hxhim_wire::Message;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::warn;

/// Spawn `num_threads` worker threads sharing `queue`, `registry`, and one
/// write mutex.
pub fn spawn_pool(
    num_threads: usize,
    queue: Arc<WorkQueue>,
    registry: Arc<IndexRegistry>,
    config: HandlerConfig,
    rank: hxhim_core::Rank,
) -> Vec<JoinHandle<()>> {
    let write_mutex = Arc::new(Mutex::new(()));
    (0..num_threads.max(1))
        .map(|i| {
            let queue = Arc::clone(&queue);
            let registry = Arc::clone(&registry);
            let write_mutex = Arc::clone(&write_mutex);
            std::thread::Builder::new()
                .name(format!("hxhim-worker-{rank}-{i}"))
                .spawn(move || worker_loop(&queue, &registry, &write_mutex, config))
                .expect("failed to spawn range-server worker thread")
        })
        .collect()
}

fn worker_loop(queue: &WorkQueue, registry: &IndexRegistry, write_mutex: &Mutex<()>, config: HandlerConfig) {
    loop {
        let Some(burst) = queue.detach_burst() else {
            return;
        };
        for item in burst {
            let is_write = matches!(
                item.message,
                Message::Put { .. } | Message::BPut { .. } | Message::Delete { .. } | Message::BDelete { .. } | Message::Commit { .. }
            );
            let response = match registry.resolve(item.message.header().index.as_str()) {
                Some(index) => {
                    if is_write {
                        let _guard = write_mutex.lock();
                        handlers::handle(item.message, &index, config)
                    } else {
                        handlers::handle(item.message, &index, config)
                    }
                }
                None => {
                    let header = item.message.header().clone();
                    let name = header.index.clone();
                    Message::Recv { header, error: Some(format!("no such index '{name}'")) }
                }
            };
            if let Err(e) = item.reply.send(response) {
                warn!("failed to deliver range-server response: {e}");
            }
        }
    }
}
