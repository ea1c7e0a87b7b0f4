//! The background PUT drainer thread (spec §4.5 "Background PUT drainer").
//!
//! Exactly one of these runs per session (spec §5 Threading model: "at most
//! one background PUT drainer exists per session; no other thread consumes
//! the PUT queue").

use crate::queue::{PutEntry, PutQueue};
use crate::router::Router;
use hxhim_core::Rank;
use hxhim_index::IndexRegistry;
use hxhim_results::ResultGraph;
use hxhim_wire::{Header, KvEntry, Message};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use tracing::warn;

/// Spawn the drainer thread. It runs until [`PutQueue::next_batch`] observes
/// shutdown with nothing left to drain.
pub fn spawn(
    self_rank: Rank,
    queue: Arc<PutQueue>,
    registry: Arc<IndexRegistry>,
    router: Arc<Router>,
    results: Arc<ResultGraph>,
    watermark: usize,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("hxhim-put-drainer-{self_rank}"))
        .spawn(move || drainer_loop(self_rank, &queue, &registry, &router, &results, watermark))
        .expect("failed to spawn PUT drainer thread")
}

fn drainer_loop(self_rank: Rank, queue: &PutQueue, registry: &IndexRegistry, router: &Router, results: &ResultGraph, watermark: usize) {
    loop {
        let Some(batch) = queue.next_batch(watermark) else {
            return;
        };
        let index = registry.primary();
        for node in &batch.nodes {
            for request in process_put_node(self_rank, node, &index) {
                results.push(dispatch_or_record_error(router, request));
            }
        }
        if batch.forced {
            queue.finish_forced();
        }
    }
}

/// Send the grouped BPut requests a node fans out into, returning the
/// not-yet-sent requests so the caller can route each one (kept separate
/// from sending so unit tests can exercise the fan-out/grouping logic
/// without a live transport).
fn process_put_node(self_rank: Rank, entries: &[PutEntry], index: &hxhim_index::Index) -> Vec<Message> {
    let mut groups: FxHashMap<(Rank, hxhim_core::DbIndex), Vec<KvEntry>> = FxHashMap::default();

    for entry in entries {
        // A malformed triple (e.g. a component too long to encode) is local
        // to this entry, not the whole node (spec §7 propagation policy).
        let records = match hxhim_codec::fanout::put_records(&entry.triple) {
            Ok(records) => records,
            Err(e) => {
                warn!("dropping unencodable triple from PUT batch: {e}");
                continue;
            }
        };
        for record in records {
            let dest = entry.unsafe_dest.unwrap_or_else(|| index.partitioner().route(&record.key));
            groups
                .entry((dest.rank, dest.db_index))
                .or_default()
                .push(KvEntry { key: record.key, value: Some(record.value) });
        }
    }

    groups
        .into_iter()
        .map(|((rank, db_index), entries)| {
            let header = Header {
                src: self_rank,
                dst: rank,
                index: index.name().to_string(),
                index_type: index.index_type(),
                per_entry_db: vec![db_index; entries.len()],
            };
            Message::BPut { header, entries }
        })
        .collect()
}

fn dispatch_or_record_error(router: &Router, request: Message) -> Message {
    let dst = request.header().dst;
    let header = request.header().clone();
    match router.send(dst, request) {
        Ok(response) => response,
        Err(e) => {
            warn!("PUT fan-out to rank {dst} failed: {e}");
            Message::RecvBulk { header, error: Some(e.to_string()), succeeded: 0, failed: 0 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxhim_core::{IndexType, KeyType, Triple};
    use hxhim_index::{IndexConfig, IndexRegistry, LocalDbSpec};
    use std::collections::HashMap;

    fn registry() -> Arc<IndexRegistry> {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = HashMap::new();
        specs.insert("primary".to_string(), LocalDbSpec { db_path: dir.path().to_path_buf(), create_new: true });
        let config = IndexConfig {
            name: "primary".to_string(),
            index_type: IndexType::Primary,
            key_type: KeyType::Byte,
            rangeserver_factor: 1,
            dbs_per_server: 1,
            slice_size: 1024,
        };
        Arc::new(IndexRegistry::open(0, 1, config, vec![], &specs).unwrap())
    }

    #[test]
    fn one_triple_groups_into_destinations_by_rank() {
        let registry = registry();
        let index = registry.primary();
        let entries = vec![PutEntry { triple: Triple::new("alice", "age", "30"), unsafe_dest: None }];
        let responses = process_put_node(0, &entries, &index);
        assert!(!responses.is_empty());
        // Single rank in this test setup: every one of the six fan-out
        // records routes to rank 0, so they collapse into one BPut.
        assert_eq!(responses.len(), 1);
        match responses.into_iter().next().unwrap() {
            Message::BPut { entries, header, .. } => {
                assert_eq!(entries.len(), 6);
                assert_eq!(header.dst, 0);
            }
            _ => panic!("expected BPut"),
        }
    }

    #[test]
    fn unsafe_put_bypasses_the_partitioner() {
        let registry = registry();
        let index = registry.primary();
        let dest = hxhim_partition::Destination { rank: 7, db_index: 0 };
        let entries = vec![PutEntry { triple: Triple::new("alice", "age", "30"), unsafe_dest: Some(dest) }];
        let responses = process_put_node(0, &entries, &index);
        match responses.into_iter().next().unwrap() {
            Message::BPut { header, .. } => assert_eq!(header.dst, 7),
            _ => panic!("expected BPut"),
        }
    }
}
