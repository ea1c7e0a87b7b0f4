//! Configuration reader chain (spec §6, AMBIENT STACK/Configuration).
//!
//! Collaborator contract: the *file format* a config source reads from is out of
//! scope (§1). What this module owns is the priority chain that resolves a key to
//! a string value, and the typed [`Config`] built on top of it.

use std::collections::HashMap;
use std::env;

/// A single source of configuration key -> string mappings.
///
/// Sources are consulted in priority order (highest first); the first source
/// that returns `Some` wins for that key. A source may veto, extend, or
/// override predecessors simply by being queried before or after them in the chain.
pub trait ConfigSource {
    /// Look up a single key.
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads a fixed, in-memory map. Used for the "direct environment variable
/// overrides per key" tier and for tests.
pub struct MapSource(pub HashMap<String, String>);

impl ConfigSource for MapSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// Reads `HXHIM_<UPPER_SNAKE_KEY>` from the process environment.
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn get(&self, key: &str) -> Option<String> {
        let var = format!("HXHIM_{}", key.to_uppercase());
        env::var(var).ok()
    }
}

/// Reads a `key=value` per line file, the contents of which came from either the
/// default filename in the current working directory, or a file named by an
/// environment variable. Parsing is deliberately trivial: this is the ambient
/// config layer, not the out-of-scope CLI/file-format reader.
pub struct FileSource(HashMap<String, String>);

impl FileSource {
    /// Parse `key=value` lines, ignoring blank lines and lines starting with `#`.
    pub fn parse(contents: &str) -> Self {
        let mut map = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((k, v)) = line.split_once('=') {
                map.insert(k.trim().to_string(), v.trim().to_string());
            }
        }
        FileSource(map)
    }

    /// Load per spec §6's search order: `HXHIM_CONFIG` env var names the file;
    /// otherwise `hxhim.conf` in the current directory. Missing files yield an
    /// empty source rather than an error -- config is always optional.
    pub fn load_default() -> Self {
        let path = env::var("HXHIM_CONFIG").unwrap_or_else(|_| "hxhim.conf".to_string());
        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::parse(&contents),
            Err(_) => FileSource(HashMap::new()),
        }
    }
}

impl ConfigSource for FileSource {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

/// A priority-ordered chain of [`ConfigSource`]s.
///
/// Per §6: "default filename in CWD -> file pointed to by a named environment
/// variable -> direct environment variable overrides per key". We implement
/// that as first-match-wins over sources pushed in priority order (highest
/// priority first): env overrides, then env-named file, then CWD file.
pub struct ConfigChain {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigChain {
    /// The chain described by spec §6, in priority order.
    pub fn default_chain() -> Self {
        ConfigChain {
            sources: vec![Box::new(EnvSource), Box::new(FileSource::load_default())],
        }
    }

    /// Build a chain from explicit sources, highest priority first. Used by tests
    /// that want deterministic input instead of the process environment.
    pub fn from_sources(sources: Vec<Box<dyn ConfigSource>>) -> Self {
        ConfigChain { sources }
    }

    /// Resolve a key against the chain, falling through sources in order.
    pub fn get(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|s| s.get(key))
    }
}

/// Typed configuration resolved from a [`ConfigChain`] plus built-in defaults.
///
/// Field names match the `db_path` / `db_name` / ... keys enumerated in spec §6.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory prefix for each range server's local store files.
    pub db_path: String,
    /// Name stem used together with index id and rank to form the file path.
    pub db_name: String,
    /// Which embedded ordered store to instantiate.
    pub db_type: String,
    /// Semantic type used to interpret a key for numeric partitioning/ordering.
    pub db_key_type: String,
    /// Every N-th rank is a range server.
    pub rangeserver_factor: u32,
    /// Slice size used by the partitioner.
    pub max_recs_per_slice: u64,
    /// Number of independent ordered stores per range server rank.
    pub dbs_per_server: u32,
    /// Range-server worker pool size.
    pub num_worker_threads: usize,
    /// Drainer wake threshold (number of full batches).
    pub watermark: usize,
    /// Truncate any existing store on open.
    pub create_new_db: bool,
    /// If true, PUT concatenates to any existing value instead of overwriting.
    pub value_append: bool,
    /// Logging verbosity, mapped to a `tracing` filter directive.
    pub debug_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "./hxhim-data".to_string(),
            db_name: "hxhim".to_string(),
            db_type: "memory".to_string(),
            db_key_type: "byte".to_string(),
            rangeserver_factor: 1,
            max_recs_per_slice: 1024,
            dbs_per_server: 1,
            num_worker_threads: 1,
            watermark: crate::limits::Limits::DEFAULT_WATERMARK,
            create_new_db: false,
            value_append: false,
            debug_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Resolve a full [`Config`] from a chain, falling back to [`Config::default`]
    /// for any key the chain does not answer.
    pub fn resolve(chain: &ConfigChain) -> Config {
        let defaults = Config::default();
        Config {
            db_path: chain.get("db_path").unwrap_or(defaults.db_path),
            db_name: chain.get("db_name").unwrap_or(defaults.db_name),
            db_type: chain.get("db_type").unwrap_or(defaults.db_type),
            db_key_type: chain.get("db_key_type").unwrap_or(defaults.db_key_type),
            rangeserver_factor: chain
                .get("rangeserver_factor")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rangeserver_factor),
            max_recs_per_slice: chain
                .get("max_recs_per_slice")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_recs_per_slice),
            dbs_per_server: chain
                .get("dbs_per_server")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.dbs_per_server),
            num_worker_threads: chain
                .get("num_worker_threads")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.num_worker_threads),
            watermark: chain
                .get("watermark")
                .or_else(|| chain.get("queued_bulk_puts"))
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.watermark),
            create_new_db: chain
                .get("create_new_db")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.create_new_db),
            value_append: chain
                .get("value_append")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.value_append),
            debug_level: chain.get("debug_level").unwrap_or(defaults.debug_level),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_first_match_wins() {
        let mut high = HashMap::new();
        high.insert("watermark".to_string(), "7".to_string());
        let mut low = HashMap::new();
        low.insert("watermark".to_string(), "3".to_string());
        low.insert("db_name".to_string(), "low".to_string());

        let chain = ConfigChain::from_sources(vec![Box::new(MapSource(high)), Box::new(MapSource(low))]);
        assert_eq!(chain.get("watermark").as_deref(), Some("7"));
        assert_eq!(chain.get("db_name").as_deref(), Some("low"));
        assert_eq!(chain.get("missing"), None);
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let chain = ConfigChain::from_sources(vec![]);
        let cfg = Config::resolve(&chain);
        assert_eq!(cfg.watermark, crate::limits::Limits::DEFAULT_WATERMARK);
        assert_eq!(cfg.db_type, "memory");
    }
}
