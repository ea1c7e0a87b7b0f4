//! PUT permutation fan-out (spec §3 Permutation fan-out, §9 Open Questions).
//!
//! The original implementation carries both a four-way and a six-way fan-out
//! table and both are reachable from different call paths; DESIGN.md records the
//! decision to standardize on six-way for every safe PUT, since it covers all
//! two-component queries symmetrically and removes the ambiguity of picking
//! between the two at the call site. `unsafe_put_records` uses the same table;
//! "unsafe" only changes how the destination database is chosen (spec §4.3
//! Loopback / §6), not how a triple is fanned out.

use crate::encode;
use hxhim_core::{HxhimResult, Triple};

/// One physical record produced by fanning out a triple: the physical key, the
/// physical value, and which two-component query it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutRecord {
    /// Encoded `first ++ second ++ lens` physical key.
    pub key: Vec<u8>,
    /// The value stored under `key` -- the triple's remaining component.
    pub value: Vec<u8>,
    /// Which direction of lookup this record answers, for diagnostics/logging.
    pub query: &'static str,
}

/// Fan a triple out into the six physical records that make it retrievable by
/// any pair of its components (spec §3 table, six-way variant).
pub fn put_records(triple: &Triple) -> HxhimResult<[FanoutRecord; 6]> {
    let Triple { subject: s, predicate: p, object: o } = triple;

    Ok([
        FanoutRecord { key: encode(s, p)?, value: o.clone(), query: "SP->O" },
        FanoutRecord { key: encode(s, o)?, value: p.clone(), query: "SO->P" },
        FanoutRecord { key: encode(p, o)?, value: s.clone(), query: "PO->S" },
        FanoutRecord { key: encode(p, s)?, value: o.clone(), query: "PS->O" },
        FanoutRecord { key: encode(o, s)?, value: p.clone(), query: "OS->P" },
        FanoutRecord { key: encode(o, p)?, value: s.clone(), query: "OP->S" },
    ])
}

/// The physical key used to retrieve `value` given `(first, second)` (§4.4 BGET EQ,
/// used by both the client when building a GET request and the server handler that
/// serves it).
pub fn get_key(first: &[u8], second: &[u8]) -> HxhimResult<Vec<u8>> {
    encode(first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_records_produced() {
        let t = Triple::new("alice", "age", "30");
        let records = put_records(&t).unwrap();
        assert_eq!(records.len(), 6);
        // Every record's key must decode back to the pair it claims to serve.
        for r in &records {
            assert!(crate::is_well_formed(&r.key));
        }
    }

    #[test]
    fn sp_lookup_matches_get_key() {
        let t = Triple::new("alice", "age", "30");
        let records = put_records(&t).unwrap();
        let sp = &records[0];
        assert_eq!(sp.key, get_key(b"alice", b"age").unwrap());
        assert_eq!(sp.value, b"30");
    }
}
