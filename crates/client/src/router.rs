//! Resolves a destination rank to a transport: the loopback shortcut for
//! `self_rank`, a registered remote [`Transport`] for everyone else (spec
//! §4.3 Loopback, §4.2 routing).

use hxhim_core::{HxhimError, HxhimResult, Rank};
use hxhim_wire::{Message, Transport};
use std::collections::HashMap;
use std::sync::Arc;

/// Picks the right transport for a request's destination rank.
pub struct Router {
    self_rank: Rank,
    loopback: Arc<dyn Transport>,
    remotes: HashMap<Rank, Arc<dyn Transport>>,
}

impl Router {
    /// Build a router whose loopback shortcut handles requests addressed to
    /// `self_rank`. Remote ranks are added with [`Self::register_remote`].
    pub fn new(self_rank: Rank, loopback: Arc<dyn Transport>) -> Self {
        Router { self_rank, loopback, remotes: HashMap::new() }
    }

    /// Register the transport used to reach `rank` when it is not
    /// `self_rank`.
    pub fn register_remote(&mut self, rank: Rank, transport: Arc<dyn Transport>) {
        self.remotes.insert(rank, transport);
    }

    pub fn self_rank(&self) -> Rank {
        self.self_rank
    }

    /// Send `request` to `dst` and block for its response.
    pub fn send(&self, dst: Rank, request: Message) -> HxhimResult<Message> {
        if dst == self.self_rank {
            self.loopback.send_request(request)
        } else {
            self.remotes
                .get(&dst)
                .ok_or_else(|| HxhimError::Transport(format!("no transport registered for rank {dst}")))?
                .send_request(request)
        }
    }
}
