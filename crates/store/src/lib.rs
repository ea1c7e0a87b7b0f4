//! The embedded ordered key-value store contract (spec §4.8, §6 collaborator contract).
//!
//! The production engine (LevelDB/RocksDB/etc.) is an external collaborator and out
//! of scope for this repository. What *is* in scope is the [`OrderedStore`] trait
//! every range-server handler (`hxhim-server`) and every index (`hxhim-index`) code
//! against, plus one reference backend -- [`mem::MemStore`] -- so the rest of the
//! core is runnable and testable without vendoring a C++ engine.

pub mod mem;
pub mod wal;

use hxhim_core::HxhimResult;

/// One key/value pair as returned by a scan operation.
pub type Entry = (Vec<u8>, Vec<u8>);

/// The ordered key-value store contract (spec §4.8).
///
/// Implementations must order keys byte-lexicographically, matching the physical
/// key encoding produced by `hxhim-codec`, and must be safe for concurrent readers
/// with a single writer at a time (§5 Shared-resource policy).
pub trait OrderedStore: Send + Sync {
    /// Write a single key/value pair, overwriting any existing value.
    fn put(&self, key: &[u8], value: &[u8]) -> HxhimResult<()>;

    /// Write many key/value pairs as one batch. Implementations should make this
    /// at least as durable as the same pairs written one at a time via [`Self::put`];
    /// atomicity across the whole batch is not required (no cross-key transactions,
    /// per spec §1 Non-goals).
    fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> HxhimResult<()>;

    /// Point lookup. `Ok(None)` means the key does not exist (§7 NotFound).
    fn get(&self, key: &[u8]) -> HxhimResult<Option<Vec<u8>>>;

    /// The smallest key strictly greater than `seed`, or the smallest key in the
    /// store if `seed` is `None` (GetOp::Next / GetOp::First, §4.4).
    fn get_next(&self, seed: Option<&[u8]>) -> HxhimResult<Option<Entry>>;

    /// The largest key strictly less than `seed`, or the largest key in the store
    /// if `seed` is `None` (GetOp::Prev / GetOp::Last, §4.4).
    fn get_prev(&self, seed: Option<&[u8]>) -> HxhimResult<Option<Entry>>;

    /// Visit up to `num_recs` keys starting at (and including) `seed`, walking
    /// forward in key order. Used by the BGET range-op path for `num_recs > 1`
    /// (§4.4).
    fn scan_forward(&self, seed: &[u8], num_recs: usize) -> HxhimResult<Vec<Entry>>;

    /// Remove a key. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> HxhimResult<()>;

    /// Remove many keys as one batch.
    fn batch_delete(&self, keys: &[Vec<u8>]) -> HxhimResult<()>;

    /// Forward to the store's commit entry point (§4.4 COMMIT handler).
    fn commit(&self) -> HxhimResult<()>;
}
