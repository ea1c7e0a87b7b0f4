//! Triple and the shared opcode/type enums (spec §3, §4.3, §6).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rank (process) identifier within the bootstrap group.
pub type Rank = i32;

/// A logical database index within a range server (§3 Index, §4.2).
pub type DbIndex = u32;

/// An immutable (subject, predicate, object) tuple.
///
/// Each component is an opaque byte sequence. Equality and ordering are
/// byte-lexicographic, matching the physical key encoding built on top of it
/// (`hxhim-codec`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Triple {
    /// Subject component.
    pub subject: Vec<u8>,
    /// Predicate component.
    pub predicate: Vec<u8>,
    /// Object component.
    pub object: Vec<u8>,
}

impl Triple {
    /// Build a triple from owned byte buffers.
    pub fn new(subject: impl Into<Vec<u8>>, predicate: impl Into<Vec<u8>>, object: impl Into<Vec<u8>>) -> Self {
        Triple {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// Request-side operation tag carried on every wire message (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkOp {
    /// Single PUT.
    Put,
    /// Bulk PUT.
    BPut,
    /// Single GET.
    Get,
    /// Bulk GET.
    BGet,
    /// Single DELETE.
    Delete,
    /// Bulk DELETE.
    BDelete,
    /// Commit the local ordered store.
    Commit,
    /// Session teardown.
    Close,
}

/// The lookup semantics for a GET/BGET entry (spec §4.2, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GetOp {
    /// Exact-match point lookup.
    Eq,
    /// Ordered successor of the supplied key (or the first key, if no seed is given).
    Next,
    /// Ordered predecessor of the supplied key (or the last key, if no seed is given).
    Prev,
    /// First key in the database.
    First,
    /// Last key in the database.
    Last,
}

/// The role of a named index (§3 Index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// The primary index: globally ordered, partitioned across all range servers.
    Primary,
    /// A secondary index that is globally ordered (one physical range per slice).
    SecondaryGlobal,
    /// A secondary index that preserves order only within one server.
    SecondaryLocal,
}

/// The semantic type used to interpret a key for numeric partitioning/ordering (§4.2, §6 `db_key_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Opaque byte string; sliced via a fixed-base numeric projection of its prefix.
    Byte,
    /// Interpreted as a big-endian `i32`.
    Int32,
    /// Interpreted as a big-endian `i64`.
    Int64,
    /// Interpreted as a big-endian `u64`.
    Uint64,
    /// Interpreted as an IEEE-754 `f64` (bit pattern made order-preserving).
    Float64,
}

impl std::str::FromStr for KeyType {
    type Err = ();

    /// Parses the `db_key_type` config value (§6). Unrecognized values fall
    /// back to `Byte` rather than erroring -- config is always optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "int32" => KeyType::Int32,
            "int64" => KeyType::Int64,
            "uint64" => KeyType::Uint64,
            "float64" => KeyType::Float64,
            _ => KeyType::Byte,
        })
    }
}

impl fmt::Display for WorkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkOp::Put => "PUT",
            WorkOp::BPut => "BPUT",
            WorkOp::Get => "GET",
            WorkOp::BGet => "BGET",
            WorkOp::Delete => "DELETE",
            WorkOp::BDelete => "BDELETE",
            WorkOp::Commit => "COMMIT",
            WorkOp::Close => "CLOSE",
        };
        f.write_str(s)
    }
}
