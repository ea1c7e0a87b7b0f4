//! Synchronous flush of the GET/RANGE-GET and DELETE queues (spec §4.5:
//! "GETs, range GETs, and DELETEs are drained only on explicit flush").
//!
//! Unlike the PUT drainer these run on the calling thread: the flush call
//! itself walks the detached chain, issues one bulk request per destination,
//! and returns once every response has landed in the result graph.

use crate::queue::{DeleteEntry, GetEntry};
use crate::router::Router;
use hxhim_core::{DbIndex, GetOp, Rank};
use hxhim_index::Index;
use hxhim_partition::Destination;
use hxhim_results::ResultGraph;
use hxhim_wire::{Header, Message};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Route and send every GET entry in one detached chain, appending each
/// response to `results`.
pub fn flush_get_nodes(self_rank: Rank, nodes: VecDeque<Vec<GetEntry>>, index: &Index, router: &Router, results: &ResultGraph) {
    for node in nodes {
        for response in process_get_node(self_rank, &node, index) {
            results.push(send_or_record_error(router, response, true));
        }
    }
}

/// Route and send every DELETE entry in one detached chain.
pub fn flush_delete_nodes(self_rank: Rank, nodes: VecDeque<Vec<DeleteEntry>>, index: &Index, router: &Router, results: &ResultGraph) {
    for node in nodes {
        for response in process_delete_node(self_rank, &node, index) {
            results.push(send_or_record_error(router, response, false));
        }
    }
}

/// Group one GET node by `(destination, op, num_recs)` -- a wire `BGet`
/// carries one op and one `num_recs` for the whole message, so entries that
/// disagree on either cannot share a request even when they share a
/// destination.
fn process_get_node(self_rank: Rank, entries: &[GetEntry], index: &Index) -> Vec<Message> {
    let mut groups: FxHashMap<(Rank, DbIndex, GetOp, usize), Vec<Option<Vec<u8>>>> = FxHashMap::default();

    for entry in entries {
        let dest = entry.unsafe_dest.unwrap_or_else(|| route_get(index, entry));
        groups
            .entry((dest.rank, dest.db_index, entry.op, entry.num_recs))
            .or_default()
            .push(entry.seed.clone());
    }

    groups
        .into_iter()
        .map(|((rank, db_index, op, num_recs), keys)| {
            let header = Header {
                src: self_rank,
                dst: rank,
                index: index.name().to_string(),
                index_type: index.index_type(),
                per_entry_db: vec![db_index; keys.len()],
            };
            if keys.len() == 1 && num_recs <= 1 {
                Message::Get { header, op, key: keys.into_iter().next().unwrap() }
            } else {
                Message::BGet { header, op, keys, num_recs }
            }
        })
        .collect()
}

fn process_delete_node(self_rank: Rank, entries: &[DeleteEntry], index: &Index) -> Vec<Message> {
    let mut groups: FxHashMap<(Rank, DbIndex), Vec<Vec<u8>>> = FxHashMap::default();

    for entry in entries {
        let key = hxhim_codec::fanout::get_key(&entry.first, &entry.second).unwrap_or_default();
        let dest = entry.unsafe_dest.unwrap_or_else(|| index.partitioner().route(&key));
        groups.entry((dest.rank, dest.db_index)).or_default().push(key);
    }

    groups
        .into_iter()
        .map(|((rank, db_index), keys)| {
            let header = Header {
                src: self_rank,
                dst: rank,
                index: index.name().to_string(),
                index_type: index.index_type(),
                per_entry_db: vec![db_index; keys.len()],
            };
            if keys.len() == 1 {
                Message::Delete { header, key: keys.into_iter().next().unwrap() }
            } else {
                Message::BDelete { header, keys }
            }
        })
        .collect()
}

fn route_get(index: &Index, entry: &GetEntry) -> Destination {
    match entry.op {
        GetOp::Eq => index.partitioner().route(entry.seed.as_deref().unwrap_or_default()),
        _ => index
            .partitioner()
            .route_by_stats(entry.seed.as_deref(), entry.op)
            .into_iter()
            .next()
            // No statistics recorded yet (nothing written to this index):
            // fall back to rank 0, the first range server under any
            // configuration.
            .unwrap_or(Destination { rank: 0, db_index: 0 }),
    }
}

fn send_or_record_error(router: &Router, request: Message, is_get: bool) -> Message {
    let dst = request.header().dst;
    let header = request.header().clone();
    match router.send(dst, request) {
        Ok(response) => response,
        Err(e) if is_get => Message::RecvGet { header, error: Some(e.to_string()), key: Vec::new(), value: None },
        Err(e) => Message::Recv { header, error: Some(e.to_string()) },
    }
}
