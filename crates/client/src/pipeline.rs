//! Ties the per-operation queues, the background PUT drainer, and the
//! synchronous flush paths together into one client-side pipeline (spec
//! §4.5, §6 data operations).

use crate::drainer;
use crate::flush;
use crate::queue::{DeleteEntry, GetEntry, PutEntry, PutQueue, SyncQueue};
use crate::router::Router;
use hxhim_core::{GetOp, HxhimError, HxhimResult, Limits, Rank, Triple};
use hxhim_index::IndexRegistry;
use hxhim_partition::Destination;
use hxhim_results::{ResultChain, ResultGraph};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::instrument;

/// The client-side request pipeline for one session: per-operation queues, a
/// background PUT drainer, and the index registry/router used to turn
/// queued entries into wire requests.
pub struct ClientPipeline {
    self_rank: Rank,
    registry: Arc<IndexRegistry>,
    router: Arc<Router>,
    results: Arc<ResultGraph>,
    put_queue: Arc<PutQueue>,
    get_queue: SyncQueue<GetEntry>,
    delete_queue: SyncQueue<DeleteEntry>,
    drainer_handle: parking_lot::Mutex<Option<std::thread::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl ClientPipeline {
    /// Build a pipeline and spawn its background PUT drainer
    /// (spec §5 Scheduling model: "one background PUT drainer per session").
    /// `router` is built by the caller (`Session::open`) with every peer
    /// rank's transport already registered.
    pub fn new(self_rank: Rank, registry: Arc<IndexRegistry>, router: Arc<Router>, watermark: usize) -> Self {
        let results = Arc::new(ResultGraph::new());
        let put_queue = Arc::new(PutQueue::new());
        let drainer_handle = drainer::spawn(self_rank, Arc::clone(&put_queue), Arc::clone(&registry), Arc::clone(&router), Arc::clone(&results), watermark);

        ClientPipeline {
            self_rank,
            registry,
            router,
            results,
            put_queue,
            get_queue: SyncQueue::new(),
            delete_queue: SyncQueue::new(),
            drainer_handle: parking_lot::Mutex::new(Some(drainer_handle)),
            closed: AtomicBool::new(false),
        }
    }

    fn require_open(&self) -> HxhimResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(HxhimError::Shutdown)
        } else {
            Ok(())
        }
    }

    // -- PUT --------------------------------------------------------------

    #[instrument(skip(self, triple))]
    pub fn put(&self, triple: Triple) -> HxhimResult<()> {
        self.require_open()?;
        self.put_queue.enqueue(PutEntry { triple, unsafe_dest: None });
        Ok(())
    }

    pub fn put_unsafe(&self, triple: Triple, dest: Destination) -> HxhimResult<()> {
        self.require_open()?;
        self.put_queue.enqueue(PutEntry { triple, unsafe_dest: Some(dest) });
        Ok(())
    }

    #[instrument(skip(self, triples))]
    pub fn bput(&self, triples: Vec<Triple>) -> HxhimResult<()> {
        self.require_open()?;
        if triples.len() > Limits::MAX_BULK_PUT_OPS {
            return Err(HxhimError::QueueFull(format!("bput of {} exceeds MAX_BULK_PUT_OPS", triples.len())));
        }
        for triple in triples {
            self.put_queue.enqueue(PutEntry { triple, unsafe_dest: None });
        }
        Ok(())
    }

    // -- GET ----------------------------------------------------------------

    fn encode_seed(first: &[u8], second: &[u8]) -> HxhimResult<Vec<u8>> {
        hxhim_codec::fanout::get_key(first, second)
    }

    /// Point lookup: given (S, P), enqueue a request for O. The response
    /// appears in the result graph after [`Self::flush_gets`].
    #[instrument(skip(self))]
    pub fn get(&self, first: &[u8], second: &[u8]) -> HxhimResult<()> {
        self.require_open()?;
        let seed = Self::encode_seed(first, second)?;
        self.get_queue.enqueue(GetEntry { seed: Some(seed), op: GetOp::Eq, num_recs: 1, unsafe_dest: None });
        Ok(())
    }

    pub fn get_unsafe(&self, first: &[u8], second: &[u8], dest: Destination) -> HxhimResult<()> {
        self.require_open()?;
        let seed = Self::encode_seed(first, second)?;
        self.get_queue.enqueue(GetEntry { seed: Some(seed), op: GetOp::Eq, num_recs: 1, unsafe_dest: Some(dest) });
        Ok(())
    }

    /// Ordered lookup relative to `seed` (the physical key of a prior
    /// result, or `None` to start from either end).
    pub fn get_op(&self, seed: Option<Vec<u8>>, op: GetOp) -> HxhimResult<()> {
        self.require_open()?;
        self.get_queue.enqueue(GetEntry { seed, op, num_recs: 1, unsafe_dest: None });
        Ok(())
    }

    /// RANGE-GET: walk forward from `seed` collecting up to `num_recs`
    /// entries in one reply (spec §4.4 "BGET with range-op").
    pub fn get_range(&self, seed: Option<Vec<u8>>, num_recs: usize) -> HxhimResult<()> {
        self.require_open()?;
        self.get_queue.enqueue(GetEntry { seed, op: GetOp::Next, num_recs, unsafe_dest: None });
        Ok(())
    }

    #[instrument(skip(self, pairs))]
    pub fn bget(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> HxhimResult<()> {
        self.require_open()?;
        if pairs.len() > Limits::MAX_BULK_GET_OPS {
            return Err(HxhimError::QueueFull(format!("bget of {} exceeds MAX_BULK_GET_OPS", pairs.len())));
        }
        for (first, second) in pairs {
            let seed = Self::encode_seed(&first, &second)?;
            self.get_queue.enqueue(GetEntry { seed: Some(seed), op: GetOp::Eq, num_recs: 1, unsafe_dest: None });
        }
        Ok(())
    }

    // -- DELETE ---------------------------------------------------------------

    #[instrument(skip(self))]
    pub fn delete(&self, first: &[u8], second: &[u8]) -> HxhimResult<()> {
        self.require_open()?;
        self.delete_queue.enqueue(DeleteEntry { first: first.to_vec(), second: second.to_vec(), unsafe_dest: None });
        Ok(())
    }

    pub fn delete_unsafe(&self, first: &[u8], second: &[u8], dest: Destination) -> HxhimResult<()> {
        self.require_open()?;
        self.delete_queue.enqueue(DeleteEntry { first: first.to_vec(), second: second.to_vec(), unsafe_dest: Some(dest) });
        Ok(())
    }

    #[instrument(skip(self, pairs))]
    pub fn bdelete(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> HxhimResult<()> {
        self.require_open()?;
        if pairs.len() > Limits::MAX_BULK_DELETE_OPS {
            return Err(HxhimError::QueueFull(format!("bdelete of {} exceeds MAX_BULK_DELETE_OPS", pairs.len())));
        }
        for (first, second) in pairs {
            self.delete_queue.enqueue(DeleteEntry { first, second, unsafe_dest: None });
        }
        Ok(())
    }

    // -- Flush ------------------------------------------------------------

    /// Force-drain the PUT queue and block until the background drainer has
    /// processed everything observed at call time (spec §4.5 Flush (PUT)).
    #[instrument(skip(self))]
    pub fn flush_puts(&self) -> HxhimResult<ResultChain> {
        self.put_queue.force_flush()?;
        Ok(self.results.drain())
    }

    #[instrument(skip(self))]
    pub fn flush_gets(&self) -> HxhimResult<ResultChain> {
        self.require_open()?;
        let nodes = self.get_queue.drain_all();
        flush::flush_get_nodes(self.self_rank, nodes, &self.registry.primary(), &self.router, &self.results);
        Ok(self.results.drain())
    }

    #[instrument(skip(self))]
    pub fn flush_deletes(&self) -> HxhimResult<ResultChain> {
        self.require_open()?;
        let nodes = self.delete_queue.drain_all();
        flush::flush_delete_nodes(self.self_rank, nodes, &self.registry.primary(), &self.router, &self.results);
        Ok(self.results.drain())
    }

    /// Flush every queue kind, in PUT / GET / DELETE order, returning the
    /// concatenated result chain.
    pub fn flush_all(&self) -> HxhimResult<ResultChain> {
        self.put_queue.force_flush()?;
        self.require_open()?;
        let get_nodes = self.get_queue.drain_all();
        flush::flush_get_nodes(self.self_rank, get_nodes, &self.registry.primary(), &self.router, &self.results);
        let delete_nodes = self.delete_queue.drain_all();
        flush::flush_delete_nodes(self.self_rank, delete_nodes, &self.registry.primary(), &self.router, &self.results);
        Ok(self.results.drain())
    }

    /// Forward a COMMIT to every local database on every range server this
    /// index is hosted on. Single-process sessions only ever have one local
    /// destination (the loopback rank); a multi-rank commit would fan out
    /// over the router the same way PUT does, left for a future collective
    /// helper (DESIGN.md Open Questions).
    pub fn commit(&self) -> HxhimResult<()> {
        self.require_open()?;
        let index = self.registry.primary();
        let header = hxhim_wire::Header {
            src: self.self_rank,
            dst: self.self_rank,
            index: index.name().to_string(),
            index_type: index.index_type(),
            per_entry_db: vec![0],
        };
        let response = self.router.send(self.self_rank, hxhim_wire::Message::Commit { header })?;
        match response {
            hxhim_wire::Message::Recv { error: None, .. } => Ok(()),
            hxhim_wire::Message::Recv { error: Some(e), .. } => Err(HxhimError::Store(e)),
            _ => Ok(()),
        }
    }

    /// Collective statistics snapshot swap (spec §4.2 `stat-flush`). In a
    /// single-process session this is simply "use what this rank has
    /// recorded" -- a real all-gather across the bootstrap group belongs to
    /// `Session`, which has the rank count and transport endpoint group this
    /// pipeline does not.
    pub fn stat_flush(&self) -> HxhimResult<()> {
        self.require_open()?;
        let index = self.registry.primary();
        let snapshot = index.partitioner().local_stats_snapshot();
        index.partitioner().install_stats_snapshot(vec![snapshot]);
        Ok(())
    }

    /// Stop the background drainer and drop any unflushed queue contents
    /// (spec §3 Lifecycles: "drops each queue head chain").
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.put_queue.shutdown();
        if let Some(handle) = self.drainer_handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn result_graph(&self) -> &Arc<ResultGraph> {
        &self.results
    }
}

impl Drop for ClientPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxhim_core::{IndexType, KeyType};
    use hxhim_index::{IndexConfig, IndexRegistry, LocalDbSpec};
    use hxhim_server::{HandlerConfig, RangeServer};
    use hxhim_wire::{channel::ChannelFabric, LoopbackTransport, Shutdown};
    use std::collections::HashMap;

    fn registry(dir: &std::path::Path) -> Arc<IndexRegistry> {
        let mut specs = HashMap::new();
        specs.insert("primary".to_string(), LocalDbSpec { db_path: dir.to_path_buf(), create_new: true });
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

    fn pipeline(dir: &std::path::Path) -> (ClientPipeline, Arc<RangeServer>) {
        let registry = registry(dir);
        let fabric = ChannelFabric::new();
        let (listener_transport, _rx) = fabric.register(0);
        let shutdown = Shutdown::new();
        let server = Arc::new(RangeServer::start(0, Arc::new(listener_transport), Arc::clone(&registry), 1, HandlerConfig::default(), shutdown.clone()));
        let loopback = Arc::new(LoopbackTransport::new(server.clone(), shutdown));
        let router = Arc::new(Router::new(0, loopback));
        let pipeline = ClientPipeline::new(0, registry, router, 2);
        (pipeline, server)
    }

    #[test]
    fn put_flush_then_get_flush_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, server) = pipeline(dir.path());

        pipeline.put(Triple::new("alice", "age", "30")).unwrap();
        pipeline.flush_puts().unwrap();

        pipeline.get(b"alice", b"age").unwrap();
        let chain = pipeline.flush_gets().unwrap();
        let mut cursor = chain.cursor();
        assert!(cursor.first_server());
        assert!(cursor.first_kv());
        assert_eq!(cursor.get_kv().unwrap().value, b"30");

        server.shutdown();
    }

    #[test]
    fn put_then_delete_then_get_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, server) = pipeline(dir.path());

        pipeline.put(Triple::new("alice", "age", "30")).unwrap();
        pipeline.delete(b"alice", b"age").unwrap();
        let chain = pipeline.flush_all().unwrap();
        assert!(!chain.is_empty());

        pipeline.get(b"alice", b"age").unwrap();
        let chain = pipeline.flush_gets().unwrap();
        let mut cursor = chain.cursor();
        cursor.first_server();
        cursor.first_kv();
        assert!(cursor.get_kv().unwrap().value.is_empty());

        server.shutdown();
    }

    #[test]
    fn close_then_put_returns_shutdown_error() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, server) = pipeline(dir.path());
        pipeline.close();
        assert!(matches!(pipeline.put(Triple::new("a", "b", "c")), Err(HxhimError::Shutdown)));
        server.shutdown();
    }

    #[test]
    fn bput_exceeding_batch_cap_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, server) = pipeline(dir.path());
        let too_many: Vec<Triple> = (0..Limits::MAX_BULK_PUT_OPS + 1).map(|i| Triple::new(i.to_string(), "p", "o")).collect();
        assert!(matches!(pipeline.bput(too_many), Err(HxhimError::QueueFull(_))));
        server.shutdown();
    }
}
