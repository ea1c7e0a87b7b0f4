//! Triple-to-key encoding (spec §4.1).
//!
//! All bytes passing through the range server's ordered store go through this
//! codec. The encoding is canonical and order-preserving: see [`encode`] and
//! [`decode`] for the exact layout, and [`fanout`] for how one logical triple
//! becomes several physical records.

pub mod fanout;

use byteorder::{BigEndian, ByteOrder};
use hxhim_core::{ErrorKind, HxhimError, HxhimResult};

const LEN_FIELD_SIZE: usize = std::mem::size_of::<u64>();

/// Encode two components into one physical key.
///
/// Layout: `bytes(first) ++ bytes(second) ++ u64be(len(first)) ++ u64be(len(second))`.
///
/// The trailing length fields make the encoding unambiguous without an external
/// schema, and sort so that all records sharing `first` form one contiguous
/// lexicographic range (spec §4.1).
pub fn encode(first: &[u8], second: &[u8]) -> HxhimResult<Vec<u8>> {
    if first.is_empty() || second.is_empty() {
        return Err(HxhimError::InputInvalid(
            "encode: both components must be non-empty".to_string(),
        ));
    }

    let mut out = Vec::with_capacity(first.len() + second.len() + 2 * LEN_FIELD_SIZE);
    out.extend_from_slice(first);
    out.extend_from_slice(second);

    let mut len_buf = [0u8; LEN_FIELD_SIZE];
    BigEndian::write_u64(&mut len_buf, first.len() as u64);
    out.extend_from_slice(&len_buf);
    BigEndian::write_u64(&mut len_buf, second.len() as u64);
    out.extend_from_slice(&len_buf);

    Ok(out)
}

/// Decode a physical key back into zero-copy slices of its two components.
///
/// Validates `first_len + second_len + 16 == buf.len()` before trusting either
/// length field, so truncated or corrupted records are rejected rather than
/// panicking on an out-of-bounds slice.
pub fn decode(buf: &[u8]) -> HxhimResult<(&[u8], &[u8])> {
    if buf.len() < 2 * LEN_FIELD_SIZE {
        return Err(HxhimError::InputInvalid(
            "decode: buffer shorter than the trailing length fields".to_string(),
        ));
    }

    let trailer_start = buf.len() - 2 * LEN_FIELD_SIZE;
    let first_len = BigEndian::read_u64(&buf[trailer_start..trailer_start + LEN_FIELD_SIZE]) as usize;
    let second_len = BigEndian::read_u64(&buf[trailer_start + LEN_FIELD_SIZE..]) as usize;

    if first_len.checked_add(second_len).and_then(|n| n.checked_add(2 * LEN_FIELD_SIZE)) != Some(buf.len()) {
        return Err(HxhimError::InputInvalid(
            "decode: length fields do not account for the full buffer".to_string(),
        ));
    }

    Ok((&buf[..first_len], &buf[first_len..first_len + second_len]))
}

/// Convenience check used by callers that only need to know whether a buffer
/// parses, without caring about its contents (e.g. validating a store's keys
/// against [`ErrorKind::InputInvalid`] during a scan).
pub fn is_well_formed(buf: &[u8]) -> bool {
    decode(buf).is_ok()
}

pub use ErrorKind as CodecErrorKind;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip_simple() {
        let key = encode(b"alice", b"age").unwrap();
        let (a, b) = decode(&key).unwrap();
        assert_eq!(a, b"alice");
        assert_eq!(b, b"age");
    }

    #[test]
    fn rejects_empty_components() {
        assert!(encode(b"", b"x").is_err());
        assert!(encode(b"x", b"").is_err());
    }

    #[test]
    fn rejects_truncated_buffer() {
        let mut key = encode(b"alice", b"age").unwrap();
        key.truncate(key.len() - 1);
        assert!(decode(&key).is_err());
    }

    #[test]
    fn same_first_forms_contiguous_range() {
        let k1 = encode(b"alice", b"age").unwrap();
        let k2 = encode(b"alice", b"city").unwrap();
        let k3 = encode(b"bob", b"age").unwrap();
        assert!(k1 < k3);
        assert!(k2 < k3);
        // both alice-prefixed keys sort before any bob-prefixed key
        assert!(k1.starts_with(b"alice") && k2.starts_with(b"alice"));
    }

    proptest! {
        #[test]
        fn prop_round_trip(a in proptest::collection::vec(any::<u8>(), 1..64),
                            b in proptest::collection::vec(any::<u8>(), 1..64)) {
            let key = encode(&a, &b).unwrap();
            let (da, db) = decode(&key).unwrap();
            prop_assert_eq!(da, a.as_slice());
            prop_assert_eq!(db, b.as_slice());
        }

        #[test]
        fn prop_order_by_second(a in proptest::collection::vec(any::<u8>(), 1..32),
                                 b1 in proptest::collection::vec(any::<u8>(), 1..32),
                                 b2 in proptest::collection::vec(any::<u8>(), 1..32)) {
            prop_assume!(b1 < b2);
            let k1 = encode(&a, &b1).unwrap();
            let k2 = encode(&a, &b2).unwrap();
            prop_assert!(k1 < k2);
        }

        #[test]
        fn prop_order_by_first(a1 in proptest::collection::vec(any::<u8>(), 1..32),
                                a2 in proptest::collection::vec(any::<u8>(), 1..32),
                                b in proptest::collection::vec(any::<u8>(), 1..32)) {
            prop_assume!(a1 < a2 && !a2.starts_with(a1.as_slice()));
            let k1 = encode(&a1, &b).unwrap();
            let k2 = encode(&a2, &b).unwrap();
            prop_assert!(k1 < k2);
        }
    }
}
