//! The range server's listener thread (spec §4.4): loops checking shutdown,
//! polling the transport for the next inbound request, and enqueuing a work
//! item for the worker pool.

use crate::reply::ReplyTarget;
use crate::workqueue::{WorkItem, WorkQueue};
use hxhim_wire::channel::{recv_envelope, Envelope};
use hxhim_wire::{Shutdown, Transport};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Spawn the listener thread. It owns nothing but a reference to the
/// transport and the queue it feeds; the worker pool owns execution.
pub fn spawn(transport: Arc<dyn Transport>, queue: Arc<WorkQueue>, shutdown: Shutdown, rank: hxhim_core::Rank) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("hxhim-listener-{rank}"))
        .spawn(move || listener_loop(transport, queue, shutdown))
        .expect("failed to spawn range-server listener thread")
}

fn listener_loop(transport: Arc<dyn Transport>, queue: Arc<WorkQueue>, shutdown: Shutdown) {
    loop {
        match transport.recv_request(&shutdown) {
            Ok(request) => {
                debug!(op = %request.header().index, "listener received request");
                queue.push(WorkItem { message: request, reply: ReplyTarget::Transport(Arc::clone(&transport)) });
            }
            Err(hxhim_core::HxhimError::Shutdown) => {
                debug!("listener observed shutdown, exiting");
                return;
            }
            Err(e) => {
                warn!("listener transport error: {e}");
                if shutdown.is_set() {
                    return;
                }
            }
        }
    }
}

/// Spawn the listener thread for the in-process channel-fabric backend
/// (spec §4.3, §8 scenario F): the fabric hands each rank its own
/// `Receiver<Envelope>` rather than a polled [`Transport`], since every
/// inbound request already carries its own reply sender.
pub fn spawn_envelope(rx: Receiver<Envelope>, queue: Arc<WorkQueue>, shutdown: Shutdown, rank: hxhim_core::Rank) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("hxhim-listener-{rank}"))
        .spawn(move || envelope_listener_loop(&rx, queue, shutdown))
        .expect("failed to spawn range-server envelope listener thread")
}

fn envelope_listener_loop(rx: &Receiver<Envelope>, queue: Arc<WorkQueue>, shutdown: Shutdown) {
    loop {
        match recv_envelope(rx, &shutdown) {
            Ok(envelope) => {
                debug!(op = %envelope.request.header().index, "listener received request");
                queue.push(WorkItem { message: envelope.request, reply: ReplyTarget::Envelope(envelope.reply) });
            }
            Err(hxhim_core::HxhimError::Shutdown) => {
                debug!("listener observed shutdown, exiting");
                return;
            }
            Err(e) => {
                warn!("listener channel error: {e}");
                if shutdown.is_set() {
                    return;
                }
            }
        }
    }
}
