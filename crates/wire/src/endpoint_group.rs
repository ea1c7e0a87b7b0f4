//! Multicast fan-out over a set of endpoints (spec §4.3 "Endpoint-group
//! multicast is performed by iterating a contained endpoint map and issuing
//! parallel RPCs; responses are joined in caller order").

use crate::message::Message;
use crate::transport::Transport;
use hxhim_core::{HxhimResult, Rank};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A named collection of per-rank transports, used for collective operations
/// like `stat-flush` (spec §4.2) that must reach every server owning an index.
pub struct EndpointGroup {
    endpoints: BTreeMap<Rank, Arc<dyn Transport>>,
}

impl EndpointGroup {
    /// Build a group from an explicit rank -> transport map.
    pub fn new(endpoints: BTreeMap<Rank, Arc<dyn Transport>>) -> Self {
        EndpointGroup { endpoints }
    }

    /// Ranks currently registered in this group, in ascending order.
    pub fn ranks(&self) -> Vec<Rank> {
        self.endpoints.keys().copied().collect()
    }

    /// Send `make_request(rank)` to every endpoint and collect responses in
    /// caller order (ascending rank), not arrival order -- the caller-order
    /// guarantee spec §4.3 asks for.
    pub fn multicast(&self, make_request: impl Fn(Rank) -> Message) -> Vec<HxhimResult<Message>> {
        // `std::thread::scope` gives bounded parallel fan-out without needing
        // an async runtime here; each endpoint's `send_request` already does
        // its own internal blocking/cancellation handling.
        let mut results: Vec<Option<HxhimResult<Message>>> = (0..self.endpoints.len()).map(|_| None).collect();
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for (slot, (&rank, transport)) in self.endpoints.iter().enumerate() {
                let request = make_request(rank);
                let transport = Arc::clone(transport);
                handles.push((slot, scope.spawn(move || transport.send_request(request))));
            }
            for (slot, handle) in handles {
                results[slot] = Some(handle.join().unwrap_or_else(|_| {
                    Err(hxhim_core::HxhimError::Transport("endpoint worker panicked".to_string()))
                }));
            }
        });
        results.into_iter().map(|r| r.expect("every slot is filled")).collect()
    }
}
