//! Message taxonomy (spec §4.3, §9 "Heavy inheritance" design note).
//!
//! The original implementation uses a class hierarchy of message types; this
//! re-expresses it as a tagged sum with a shared header, exactly as §9
//! recommends: `Message = Put | BPut | Get | BGet | Delete | BDelete | Recv |
//! RecvGet | RecvBGet | RecvBulk | Commit | Close`.

use hxhim_core::{DbIndex, GetOp, IndexType, Rank};
use serde::{Deserialize, Serialize};

/// Fields every message carries, request or response (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Source rank.
    pub src: Rank,
    /// Destination rank.
    pub dst: Rank,
    /// Index this message targets, by name.
    pub index: String,
    /// That index's type, so the receiver can pick a routing strategy without
    /// a registry round-trip.
    pub index_type: IndexType,
    /// Per-entry target database, for bulk messages whose entries may span
    /// more than one local database on the destination rank. Single-entry
    /// messages use a one-element vec.
    pub per_entry_db: Vec<DbIndex>,
}

/// One key/value entry inside a bulk request or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    /// Physical key.
    pub key: Vec<u8>,
    /// Physical value. Absent (`None`) on a GET request entry; present on a
    /// PUT request entry or a successful reply entry. A present-but-empty
    /// value on a reply entry means "no such key" (§7 NotFound).
    pub value: Option<Vec<u8>>,
}

/// The wire message taxonomy. Request variants flow client -> range server;
/// response variants flow range server -> client (including over the
/// loopback shortcut).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// Single PUT request.
    Put { header: Header, key: Vec<u8>, value: Vec<u8> },
    /// Bulk PUT request.
    BPut { header: Header, entries: Vec<KvEntry> },
    /// Single GET request.
    Get { header: Header, op: GetOp, key: Option<Vec<u8>> },
    /// Bulk GET request. `num_recs` > 1 on a single-entry request selects the
    /// range-scan code path (spec §4.4 "BGET with range-op").
    BGet { header: Header, op: GetOp, keys: Vec<Option<Vec<u8>>>, num_recs: usize },
    /// Single DELETE request.
    Delete { header: Header, key: Vec<u8> },
    /// Bulk DELETE request.
    BDelete { header: Header, keys: Vec<Vec<u8>> },
    /// Forward to the local store's commit entry point.
    Commit { header: Header },
    /// Session teardown notification.
    Close { header: Header },

    /// Acknowledgement of a single PUT/DELETE/COMMIT.
    Recv { header: Header, error: Option<String> },
    /// Reply to a single GET. `key` echoes the request's key so the result
    /// graph's kv-iterator can expose (key, value) pairs uniformly with the
    /// bulk reply variant.
    RecvGet { header: Header, error: Option<String>, key: Vec<u8>, value: Option<Vec<u8>> },
    /// Reply to a bulk GET. Per-entry errors are represented as `None` values,
    /// never as a message-level failure unless every entry failed (§7).
    RecvBGet { header: Header, error: Option<String>, entries: Vec<KvEntry> },
    /// Acknowledgement of a bulk PUT/DELETE.
    RecvBulk { header: Header, error: Option<String>, succeeded: usize, failed: usize },
}

impl Message {
    /// The header common to every variant.
    pub fn header(&self) -> &Header {
        match self {
            Message::Put { header, .. }
            | Message::BPut { header, .. }
            | Message::Get { header, .. }
            | Message::BGet { header, .. }
            | Message::Delete { header, .. }
            | Message::BDelete { header, .. }
            | Message::Commit { header }
            | Message::Close { header }
            | Message::Recv { header, .. }
            | Message::RecvGet { header, .. }
            | Message::RecvBGet { header, .. }
            | Message::RecvBulk { header, .. } => header,
        }
    }

    /// True for the request-side variants (client -> range server).
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Message::Put { .. }
                | Message::BPut { .. }
                | Message::Get { .. }
                | Message::BGet { .. }
                | Message::Delete { .. }
                | Message::BDelete { .. }
                | Message::Commit { .. }
                | Message::Close { .. }
        )
    }
}

/// Serialize a message with the RPC backend's structured serializer
/// (`rmp-serde`, matching the teacher's `rmp_serde`-based wire envelope).
pub fn to_bytes(message: &Message) -> Vec<u8> {
    rmp_serde::to_vec(message).expect("Message always serializes")
}

/// Deserialize bytes produced by [`to_bytes`].
pub fn from_bytes(bytes: &[u8]) -> Result<Message, rmp_serde::decode::Error> {
    rmp_serde::from_slice(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Header {
        Header { src: 0, dst: 0, index: "primary".to_string(), index_type: IndexType::Primary, per_entry_db: vec![0] }
    }

    #[test]
    fn round_trip_through_rmp() {
        let msg = Message::Put { header: header(), key: b"k".to_vec(), value: b"v".to_vec() };
        let bytes = to_bytes(&msg);
        let back = from_bytes(&bytes).unwrap();
        match back {
            Message::Put { key, value, .. } => {
                assert_eq!(key, b"k");
                assert_eq!(value, b"v");
            }
            _ => panic!("wrong variant"),
        }
    }
}
