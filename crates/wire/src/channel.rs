//! An in-process, multi-"rank" transport built on `std::sync::mpsc`.
//!
//! Real HPC runs use the MPI or RPC backends; this backend exists so multiple
//! simulated ranks can exchange requests and responses inside a single test
//! process (spec §8 scenario F, two ranks, without an MPI environment).
//!
//! Each request carries its own one-shot reply channel, so there is no shared
//! per-rank response table to demultiplex -- the destination rank's listener
//! thread replies directly on the channel the request arrived with.

use crate::message::Message;
use crate::transport::{destination_of, poll_until_ready, Shutdown, Transport};
use hxhim_core::{HxhimError, HxhimResult, Rank};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

/// A request delivered to a rank's listener, paired with where to send the
/// reply once the range server has handled it.
pub struct Envelope {
    pub request: Message,
    pub reply: Sender<Message>,
}

/// A shared directory of per-rank request queues. Every simulated rank
/// registers itself once; `ChannelTransport` handles look this table up to
/// find where to deliver a message.
#[derive(Clone, Default)]
pub struct ChannelFabric {
    requests: Arc<Mutex<HashMap<Rank, Sender<Envelope>>>>,
}

impl ChannelFabric {
    pub fn new() -> Self {
        ChannelFabric::default()
    }

    /// Register `rank` in the fabric and return its transport handle plus the
    /// receiving end its listener thread should poll for inbound requests.
    pub fn register(&self, rank: Rank) -> (ChannelTransport, Receiver<Envelope>) {
        let (tx, rx) = std::sync::mpsc::channel();
        self.requests.lock().insert(rank, tx);
        (
            ChannelTransport {
                fabric: self.clone(),
                self_rank: rank,
            },
            rx,
        )
    }
}

/// The per-rank handle used as a [`Transport`] implementation.
pub struct ChannelTransport {
    fabric: ChannelFabric,
    self_rank: Rank,
}

impl ChannelTransport {
    pub fn self_rank(&self) -> Rank {
        self.self_rank
    }

    fn request_queue_for(&self, dst: Rank) -> HxhimResult<Sender<Envelope>> {
        self.fabric
            .requests
            .lock()
            .get(&dst)
            .cloned()
            .ok_or_else(|| HxhimError::Transport(format!("no such rank {dst} registered in channel fabric")))
    }
}

impl Transport for ChannelTransport {
    fn send_request(&self, request: Message) -> HxhimResult<Message> {
        let dst = destination_of(&request);
        let queue = self.request_queue_for(dst)?;
        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        queue
            .send(Envelope { request, reply: reply_tx })
            .map_err(|_| HxhimError::Transport(format!("rank {dst} listener has shut down")))?;
        reply_rx
            .recv()
            .map_err(|_| HxhimError::Transport(format!("rank {dst} dropped the reply channel without answering")))
    }

    fn send_response(&self, _response: Message) -> HxhimResult<()> {
        // Replies go out on the per-request oneshot channel carried inside
        // the `Envelope` the listener received, not through the transport.
        Err(HxhimError::Transport(
            "channel transport replies via the Envelope's reply sender, not send_response".to_string(),
        ))
    }

    fn recv_request(&self, _shutdown: &Shutdown) -> HxhimResult<Message> {
        // The listener loop owns the `Receiver<Envelope>` directly (see
        // `ChannelFabric::register`); this method is unused by this backend.
        Err(HxhimError::Transport(
            "poll the Receiver<Envelope> from ChannelFabric::register directly".to_string(),
        ))
    }
}

/// Block on an `Envelope` receiver until a request arrives or `shutdown` fires.
pub fn recv_envelope(rx: &Receiver<Envelope>, shutdown: &Shutdown) -> HxhimResult<Envelope> {
    poll_until_ready(shutdown, || rx.try_recv().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxhim_core::IndexType;

    fn header(src: Rank, dst: Rank) -> crate::message::Header {
        crate::message::Header {
            src,
            dst,
            index: "primary".to_string(),
            index_type: IndexType::Primary,
            per_entry_db: vec![0],
        }
    }

    #[test]
    fn request_then_response_round_trip() {
        let fabric = ChannelFabric::new();
        let (client, _client_rx) = fabric.register(0);
        let (_server, server_rx) = fabric.register(1);

        let shutdown = Shutdown::new();
        let server_thread = std::thread::spawn(move || {
            let envelope = recv_envelope(&server_rx, &shutdown).unwrap();
            assert_eq!(envelope.request.header().dst, 1);
            envelope
                .reply
                .send(Message::Recv { header: header(1, 0), error: None })
                .unwrap();
        });

        let response = client.send_request(Message::Commit { header: header(0, 1) }).unwrap();
        match response {
            Message::Recv { error, .. } => assert!(error.is_none()),
            _ => panic!("wrong response variant"),
        }
        server_thread.join().unwrap();
    }

    #[test]
    fn unregistered_rank_errors() {
        let fabric = ChannelFabric::new();
        let (client, _rx) = fabric.register(0);
        let result = client.send_request(Message::Commit { header: header(0, 9) });
        assert!(result.is_err());
    }
}
