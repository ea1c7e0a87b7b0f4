//! The index registry (spec §4.7): a named collection of [`Index`] objects --
//! one primary plus zero or more secondaries -- each with its own
//! [`Partitioner`](hxhim_partition::Partitioner), local ordered store (if this
//! rank hosts a shard of it), and statistics table.

use hxhim_core::{DbIndex, HxhimError, HxhimResult, IndexType, KeyType, Rank};
use hxhim_partition::Partitioner;
use hxhim_store::{mem::MemStore, OrderedStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Static configuration for one index, independent of whether this rank
/// hosts any of its shards.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub name: String,
    pub index_type: IndexType,
    pub key_type: KeyType,
    pub rangeserver_factor: u32,
    pub dbs_per_server: u32,
    pub slice_size: u64,
}

/// A named index: its routing table, and -- if this rank is one of its range
/// servers -- the local database handle(s) it owns (spec §3 Index).
pub struct Index {
    config: IndexConfig,
    partitioner: Partitioner,
    /// `local_dbs[i]` is this rank's shard of database index `i`, present
    /// only when this rank hosts the index at all.
    local_dbs: Vec<Arc<dyn OrderedStore>>,
}

impl Index {
    /// Build an index's routing table. `local_dbs` is empty on a rank that
    /// does not host this index.
    fn new(rank_count: u32, config: IndexConfig, local_dbs: Vec<Arc<dyn OrderedStore>>) -> HxhimResult<Self> {
        let partitioner = Partitioner::new(
            rank_count,
            config.rangeserver_factor,
            config.dbs_per_server,
            config.slice_size,
            config.key_type,
        )?;
        Ok(Index { config, partitioner, local_dbs })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn index_type(&self) -> IndexType {
        self.config.index_type
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// Whether this rank hosts any shard of this index.
    pub fn is_local(&self) -> bool {
        !self.local_dbs.is_empty()
    }

    /// The local database handle for `db_index`, if this rank hosts it.
    pub fn local_db(&self, db_index: DbIndex) -> Option<&Arc<dyn OrderedStore>> {
        self.local_dbs.get(db_index as usize)
    }
}

/// Where (and whether) a rank should open a local database for one shard of
/// one index -- resolved from [`hxhim_core::Config`] at session `open`.
pub struct LocalDbSpec {
    pub db_path: PathBuf,
    pub create_new: bool,
}

/// The registry resolves a logical index name to its [`Index`] (spec §4.7):
/// consulted by the client pipeline to pick a partitioner per operation, and
/// by the range server to pick which local database a decoded message
/// targets.
pub struct IndexRegistry {
    indexes: RwLock<HashMap<String, Arc<Index>>>,
    primary_name: String,
}

impl IndexRegistry {
    /// Build a registry with a primary index plus zero or more secondaries.
    /// `local_db_specs[name]` gives the rank's local store path for every
    /// index it should host shards of; indexes absent from the map are
    /// routing-only on this rank (spec §4.7 "if the calling rank hosts a
    /// shard of it").
    pub fn open(
        rank: Rank,
        rank_count: u32,
        primary: IndexConfig,
        secondaries: Vec<IndexConfig>,
        local_db_specs: &HashMap<String, LocalDbSpec>,
    ) -> HxhimResult<Self> {
        let mut indexes = HashMap::new();
        let primary_name = primary.name.clone();

        for config in std::iter::once(primary).chain(secondaries) {
            let name = config.name.clone();
            let local_dbs = open_local_shards(rank, rank_count, &config, local_db_specs.get(&name))?;
            let index = Index::new(rank_count, config, local_dbs)?;
            indexes.insert(name, Arc::new(index));
        }

        Ok(IndexRegistry {
            indexes: RwLock::new(indexes),
            primary_name,
        })
    }

    /// The always-present primary index.
    pub fn primary(&self) -> Arc<Index> {
        self.resolve(&self.primary_name).expect("primary index is always registered")
    }

    /// Resolve a logical index name, or `None` if no such index is registered.
    pub fn resolve(&self, name: &str) -> Option<Arc<Index>> {
        self.indexes.read().get(name).cloned()
    }

    /// Names of every registered index, primary first.
    pub fn names(&self) -> Vec<String> {
        let indexes = self.indexes.read();
        let mut names: Vec<String> = indexes.keys().cloned().collect();
        names.sort_by_key(|n| if n == &self.primary_name { 0 } else { 1 });
        names
    }
}

fn open_local_shards(
    rank: Rank,
    rank_count: u32,
    config: &IndexConfig,
    spec: Option<&LocalDbSpec>,
) -> HxhimResult<Vec<Arc<dyn OrderedStore>>> {
    let Some(spec) = spec else {
        return Ok(Vec::new());
    };
    let partitioner = Partitioner::new(rank_count, config.rangeserver_factor, config.dbs_per_server, config.slice_size, config.key_type)?;
    if !partitioner.is_range_server(rank) {
        return Ok(Vec::new());
    }

    let mut dbs: Vec<Arc<dyn OrderedStore>> = Vec::with_capacity(config.dbs_per_server as usize);
    for db_index in 0..config.dbs_per_server {
        let wal_path = spec.db_path.join(format!("{}.{}.{}.wal", config.name, rank, db_index));
        let store = if spec.create_new {
            MemStore::create_new(Some(wal_path))?
        } else {
            MemStore::open(Some(wal_path))?
        };
        dbs.push(Arc::new(store));
    }
    Ok(dbs)
}

impl std::fmt::Debug for IndexRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexRegistry").field("names", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str) -> IndexConfig {
        IndexConfig {
            name: name.to_string(),
            index_type: IndexType::Primary,
            key_type: KeyType::Byte,
            rangeserver_factor: 1,
            dbs_per_server: 1,
            slice_size: 1024,
        }
    }

    #[test]
    fn single_rank_hosts_primary() {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = HashMap::new();
        specs.insert(
            "primary".to_string(),
            LocalDbSpec { db_path: dir.path().to_path_buf(), create_new: true },
        );
        let registry = IndexRegistry::open(0, 1, config("primary"), vec![], &specs).unwrap();
        let primary = registry.primary();
        assert!(primary.is_local());
        assert!(primary.local_db(0).is_some());
    }

    #[test]
    fn secondary_without_local_spec_is_routing_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = HashMap::new();
        specs.insert(
            "primary".to_string(),
            LocalDbSpec { db_path: dir.path().to_path_buf(), create_new: true },
        );
        let registry = IndexRegistry::open(0, 1, config("primary"), vec![config("by_predicate")], &specs).unwrap();
        let secondary = registry.resolve("by_predicate").unwrap();
        assert!(!secondary.is_local());
    }

    #[test]
    fn unknown_index_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = HashMap::new();
        specs.insert(
            "primary".to_string(),
            LocalDbSpec { db_path: dir.path().to_path_buf(), create_new: true },
        );
        let registry = IndexRegistry::open(0, 1, config("primary"), vec![], &specs).unwrap();
        assert!(registry.resolve("nonexistent").is_none());
    }
}
