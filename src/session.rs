//! `Session`: the handle returned by [`open`](Session::open) (spec §6
//! "Session contract"). Ties the client pipeline, the local range server (if
//! this rank hosts one), and the transport layer together for one rank.

use crate::bootstrap::Bootstrap;
use crate::manifest::Manifest;
use hxhim_client::{ClientPipeline, Router};
use hxhim_core::config::{Config, ConfigChain};
use hxhim_core::{logging, GetOp, HxhimError, HxhimResult, IndexType, KeyType, Rank, Triple};
use hxhim_index::{IndexConfig, IndexRegistry, LocalDbSpec};
use hxhim_partition::Destination;
use hxhim_results::ResultChain;
use hxhim_server::{HandlerConfig, RangeServer};
use hxhim_wire::channel::ChannelFabric;
use hxhim_wire::{LoopbackTransport, Shutdown, Transport};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// The manifest-writing rank on close (spec §6: "written by the rank-1 range
/// server"). Rank 0 is always a range server under this partitioner (it is
/// never excluded by `rangeserver_factor`), so this rank always exists.
const MANIFEST_RANK: Rank = 0;

/// How this rank reaches every other rank (spec §6: the messaging layer
/// `Bootstrap` deliberately leaves out). The caller builds one of these
/// according to the deployment and hands it to [`Session::open`].
pub enum SessionTransport {
    /// The in-process multi-"rank" backend (spec §8 scenario F): every
    /// simulated rank registers itself in the same fabric before any of them
    /// calls `Session::open`.
    Channel(ChannelFabric),
    /// A real MPI communicator, already initialized via
    /// `hxhim_wire::backend_mpi::MpiTransport::init`. The caller keeps the
    /// returned `Universe` alive for the process's lifetime.
    #[cfg(feature = "mpi-transport")]
    Mpi(Arc<hxhim_wire::backend_mpi::MpiTransport>),
    /// The RPC backend: every peer's address, plus the address this rank
    /// should listen on if it hosts a range server.
    #[cfg(feature = "rpc-transport")]
    Rpc {
        endpoints: HashMap<Rank, String>,
        listen_addr: Option<std::net::SocketAddr>,
    },
}

/// A transport that errors on every call -- installed as the loopback handle
/// for a rank that hosts no local range server, where it is structurally
/// unreachable (the partitioner only ever routes to range-server ranks).
struct NoLocalRangeServer;

impl Transport for NoLocalRangeServer {
    fn send_request(&self, _request: hxhim_wire::Message) -> HxhimResult<hxhim_wire::Message> {
        Err(HxhimError::Transport("this rank hosts no local range server".to_string()))
    }
    fn send_response(&self, _response: hxhim_wire::Message) -> HxhimResult<()> {
        Err(HxhimError::Transport("this rank hosts no local range server".to_string()))
    }
    fn recv_request(&self, _shutdown: &Shutdown) -> HxhimResult<hxhim_wire::Message> {
        Err(HxhimError::Transport("this rank hosts no local range server".to_string()))
    }
}

/// One rank's handle to the session: the client pipeline plus, if this rank
/// hosts a shard of the primary index, the range server serving it.
pub struct Session {
    self_rank: Rank,
    rank_count: u32,
    pipeline: ClientPipeline,
    range_server: Option<Arc<RangeServer>>,
    db_path: PathBuf,
    manifest: Manifest,
    shutdown: Shutdown,
}

impl Session {
    /// Open a session for this rank (spec §6: "collective over the bootstrap
    /// group; every process either becomes a range server or a pure client or
    /// both"). Resolves configuration, installs the global `tracing`
    /// subscriber, opens (or attaches to) this rank's local store, and wires
    /// the transport named by `transport`.
    pub fn open(bootstrap: &dyn Bootstrap, transport: SessionTransport, chain: &ConfigChain) -> HxhimResult<Session> {
        let config = Config::resolve(chain);
        logging::init(&config.debug_level);

        let self_rank = bootstrap.rank();
        let rank_count = bootstrap.rank_count();
        let key_type: KeyType = config.db_key_type.parse().unwrap_or(KeyType::Byte);

        let index_config = IndexConfig {
            name: "primary".to_string(),
            index_type: IndexType::Primary,
            key_type,
            rangeserver_factor: config.rangeserver_factor,
            dbs_per_server: config.dbs_per_server,
            slice_size: config.max_recs_per_slice,
        };

        let db_path = PathBuf::from(&config.db_path).join(format!("{}-{}", config.db_name, self_rank));
        let mut local_db_specs = HashMap::new();
        local_db_specs.insert(
            "primary".to_string(),
            LocalDbSpec { db_path: db_path.clone(), create_new: config.create_new_db },
        );

        let registry = Arc::new(IndexRegistry::open(self_rank, rank_count, index_config, vec![], &local_db_specs)?);
        let is_range_server = registry.primary().is_local();

        let manifest = Manifest::new(&config.db_type, key_type, config.rangeserver_factor, config.max_recs_per_slice, rank_count);
        if is_range_server && !config.create_new_db {
            if let Some(on_disk) = Manifest::read(&db_path)? {
                on_disk.check(&manifest)?;
            }
        }

        let shutdown = Shutdown::new();
        let handler_config = HandlerConfig { value_append: config.value_append };
        let (router, range_server) = wire_transport(
            self_rank,
            rank_count,
            is_range_server,
            Arc::clone(&registry),
            config.num_worker_threads,
            handler_config,
            transport,
            shutdown.clone(),
        )?;

        let pipeline = ClientPipeline::new(self_rank, registry, Arc::new(router), config.watermark);

        Ok(Session {
            self_rank,
            rank_count,
            pipeline,
            range_server,
            db_path,
            manifest,
            shutdown,
        })
    }

    pub fn rank(&self) -> Rank {
        self.self_rank
    }

    pub fn rank_count(&self) -> u32 {
        self.rank_count
    }

    // -- PUT ----------------------------------------------------------------

    pub fn put(&self, triple: Triple) -> HxhimResult<()> {
        self.pipeline.put(triple)
    }

    pub fn put_unsafe(&self, triple: Triple, dest: Destination) -> HxhimResult<()> {
        self.pipeline.put_unsafe(triple, dest)
    }

    pub fn bput(&self, triples: Vec<Triple>) -> HxhimResult<()> {
        self.pipeline.bput(triples)
    }

    // -- GET ------------------------------------------------------------------

    pub fn get(&self, first: &[u8], second: &[u8]) -> HxhimResult<()> {
        self.pipeline.get(first, second)
    }

    pub fn get_unsafe(&self, first: &[u8], second: &[u8], dest: Destination) -> HxhimResult<()> {
        self.pipeline.get_unsafe(first, second, dest)
    }

    pub fn get_op(&self, seed: Option<Vec<u8>>, op: GetOp) -> HxhimResult<()> {
        self.pipeline.get_op(seed, op)
    }

    pub fn get_range(&self, seed: Option<Vec<u8>>, num_recs: usize) -> HxhimResult<()> {
        self.pipeline.get_range(seed, num_recs)
    }

    pub fn bget(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> HxhimResult<()> {
        self.pipeline.bget(pairs)
    }

    // -- DELETE -----------------------------------------------------------------

    pub fn delete(&self, first: &[u8], second: &[u8]) -> HxhimResult<()> {
        self.pipeline.delete(first, second)
    }

    pub fn delete_unsafe(&self, first: &[u8], second: &[u8], dest: Destination) -> HxhimResult<()> {
        self.pipeline.delete_unsafe(first, second, dest)
    }

    pub fn bdelete(&self, pairs: Vec<(Vec<u8>, Vec<u8>)>) -> HxhimResult<()> {
        self.pipeline.bdelete(pairs)
    }

    // -- Flush / collective ---------------------------------------------------

    pub fn flush_puts(&self) -> HxhimResult<ResultChain> {
        self.pipeline.flush_puts()
    }

    pub fn flush_gets(&self) -> HxhimResult<ResultChain> {
        self.pipeline.flush_gets()
    }

    pub fn flush_deletes(&self) -> HxhimResult<ResultChain> {
        self.pipeline.flush_deletes()
    }

    pub fn flush_all(&self) -> HxhimResult<ResultChain> {
        self.pipeline.flush_all()
    }

    pub fn commit(&self) -> HxhimResult<()> {
        self.pipeline.commit()
    }

    pub fn stat_flush(&self) -> HxhimResult<()> {
        self.pipeline.stat_flush()
    }

    /// Tear the session down (spec §6: "collective; drains nothing
    /// automatically -- unflushed requests are dropped with their buffers").
    /// Idempotent: a second call after the first is a no-op beyond re-joining
    /// already-stopped threads.
    pub fn close(&self) -> HxhimResult<()> {
        self.pipeline.close();
        if let Some(server) = &self.range_server {
            if self.self_rank == MANIFEST_RANK {
                self.manifest.write(&self.db_path)?;
            }
            server.shutdown();
        }
        self.shutdown.trigger();
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[allow(clippy::too_many_arguments)]
fn wire_transport(
    self_rank: Rank,
    rank_count: u32,
    is_range_server: bool,
    registry: Arc<IndexRegistry>,
    num_workers: usize,
    handler_config: HandlerConfig,
    transport: SessionTransport,
    shutdown: Shutdown,
) -> HxhimResult<(Router, Option<Arc<RangeServer>>)> {
    match transport {
        SessionTransport::Channel(fabric) => {
            let (channel_transport, rx) = fabric.register(self_rank);
            let remote: Arc<dyn Transport> = Arc::new(channel_transport);
            let (mut router, range_server) = if is_range_server {
                let server = Arc::new(RangeServer::start_channel(self_rank, rx, registry, num_workers, handler_config, shutdown.clone()));
                let loopback = Arc::new(LoopbackTransport::new(server.clone(), shutdown));
                (Router::new(self_rank, loopback), Some(server))
            } else {
                // No local shard to serve: the listening half of the fabric
                // registration (`rx`) is simply never polled, since nothing
                // ever routes to a rank that hosts no range server.
                (Router::new(self_rank, Arc::new(NoLocalRangeServer)), None)
            };
            for rank in 0..rank_count as Rank {
                if rank != self_rank {
                    router.register_remote(rank, Arc::clone(&remote));
                }
            }
            Ok((router, range_server))
        }

        #[cfg(feature = "mpi-transport")]
        SessionTransport::Mpi(transport) => {
            let remote: Arc<dyn Transport> = transport;
            let (mut router, range_server) = if is_range_server {
                let server = Arc::new(RangeServer::start(
                    self_rank,
                    Arc::clone(&remote),
                    registry,
                    num_workers,
                    handler_config,
                    shutdown.clone(),
                ));
                let loopback = Arc::new(LoopbackTransport::new(server.clone(), shutdown));
                (Router::new(self_rank, loopback), Some(server))
            } else {
                (Router::new(self_rank, Arc::new(NoLocalRangeServer)), None)
            };
            for rank in 0..rank_count as Rank {
                if rank != self_rank {
                    router.register_remote(rank, Arc::clone(&remote));
                }
            }
            Ok((router, range_server))
        }

        #[cfg(feature = "rpc-transport")]
        SessionTransport::Rpc { endpoints, listen_addr } => {
            let remote: Arc<dyn Transport> = hxhim_wire::backend_rpc::RpcTransport::new(endpoints, if is_range_server { listen_addr } else { None })?;
            let (mut router, range_server) = if is_range_server {
                let server = Arc::new(RangeServer::start(
                    self_rank,
                    Arc::clone(&remote),
                    registry,
                    num_workers,
                    handler_config,
                    shutdown.clone(),
                ));
                let loopback = Arc::new(LoopbackTransport::new(server.clone(), shutdown));
                (Router::new(self_rank, loopback), Some(server))
            } else {
                (Router::new(self_rank, Arc::new(NoLocalRangeServer)), None)
            };
            for rank in 0..rank_count as Rank {
                if rank != self_rank {
                    router.register_remote(rank, Arc::clone(&remote));
                }
            }
            Ok((router, range_server))
        }
    }
}
