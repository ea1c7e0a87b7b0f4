//! Where a handled request's response should be delivered: back through the
//! loopback single-slot pointer if the requester is this same rank, or out
//! over the transport otherwise (spec §4.4 "Responses are sent either via
//! the loopback single-slot pointer ... or via the transport's
//! send-client-response").

use hxhim_core::{HxhimError, HxhimResult};
use hxhim_wire::{Message, ResponseSlot, Transport};
use std::sync::mpsc::Sender;
use std::sync::Arc;

pub enum ReplyTarget {
    Loopback(ResponseSlot),
    Transport(Arc<dyn Transport>),
    /// The channel-fabric backend: each request carries its own one-shot
    /// reply sender (spec §4.3), so replying never goes back through a
    /// shared transport handle.
    Envelope(Sender<Message>),
}

impl ReplyTarget {
    pub fn send(&self, response: Message) -> HxhimResult<()> {
        match self {
            ReplyTarget::Loopback(slot) => {
                slot.deposit(response);
                Ok(())
            }
            ReplyTarget::Transport(transport) => transport.send_response(response),
            ReplyTarget::Envelope(reply) => reply
                .send(response)
                .map_err(|_| HxhimError::Transport("envelope caller already gave up".to_string())),
        }
    }
}

/// A reply target that always fails -- used only by this crate's own unit
/// tests, never constructed by the listener or loopback dispatcher.
#[cfg(test)]
pub(crate) fn unreachable_reply_target() -> ReplyTarget {
    struct Unreachable;
    impl Transport for Unreachable {
        fn send_request(&self, _request: Message) -> HxhimResult<Message> {
            Err(HxhimError::Transport("unreachable test transport".to_string()))
        }
        fn send_response(&self, _response: Message) -> HxhimResult<()> {
            Err(HxhimError::Transport("unreachable test transport".to_string()))
        }
        fn recv_request(&self, _shutdown: &hxhim_wire::Shutdown) -> HxhimResult<Message> {
            Err(HxhimError::Transport("unreachable test transport".to_string()))
        }
    }
    ReplyTarget::Transport(Arc::new(Unreachable))
}
