//! The transport abstraction (spec §4.3): a typed send/receive of request and
//! response messages, implemented by several interchangeable backends.

use crate::message::Message;
use hxhim_core::{HxhimError, HxhimResult, Rank};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A typed request/response transport between one rank and another.
///
/// Every backend (loopback, in-process channel, MPI, RPC) implements this
/// trait identically from the client's point of view: `send_request` blocks
/// until a response arrives or the shared [`Shutdown`] flag is observed.
pub trait Transport: Send + Sync {
    /// Send a request message to `header().dst` and block for its response.
    fn send_request(&self, request: Message) -> HxhimResult<Message>;

    /// Server-side: send a response back to `header().dst` (the original
    /// request's `src`). Used by range-server handlers, never by clients.
    fn send_response(&self, response: Message) -> HxhimResult<()>;

    /// Listener-side: block until the next request addressed to `self_rank`
    /// arrives, or the shutdown flag is observed (in which case this returns
    /// `Err(HxhimError::Shutdown)` rather than blocking forever, per §4.3
    /// Cancellation).
    fn recv_request(&self, shutdown: &Shutdown) -> HxhimResult<Message>;
}

/// A cooperative cancellation flag, polled inside every transport wait loop
/// (spec §4.3 Cancellation, §5 Cancellation and timeouts).
#[derive(Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    /// A fresh, not-yet-triggered flag.
    pub fn new() -> Self {
        Shutdown(Arc::new(AtomicBool::new(false)))
    }

    /// Trigger the flag. Every thread polling it via [`Self::is_set`] observes
    /// this on its next poll.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been triggered.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Helper used by backends implementing the "non-blocking issue + test-in-loop
/// with a brief sleep" pattern spec §4.3 describes for the MPI backend: poll
/// `try_once` until it returns `Some`, sleeping briefly between attempts,
/// bailing out with [`HxhimError::Shutdown`] if `shutdown` is observed first.
pub fn poll_until_ready<T>(shutdown: &Shutdown, mut try_once: impl FnMut() -> Option<T>) -> HxhimResult<T> {
    loop {
        if let Some(value) = try_once() {
            return Ok(value);
        }
        if shutdown.is_set() {
            return Err(HxhimError::Shutdown);
        }
        std::thread::sleep(std::time::Duration::from_micros(200));
    }
}

/// Which rank a message should be delivered to -- a convenience extracted
/// from a request's header rather than duplicated at every call site.
pub fn destination_of(message: &Message) -> Rank {
    message.header().dst
}
