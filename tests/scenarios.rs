//! End-to-end scenarios over the public `Session` API (spec §8 Scenario
//! table, single-rank cases A-E; the two-rank case F lives in
//! `two_rank.rs`).

use hxhim::{ChannelFabric, Destination, GetOp, LocalBootstrap, Session, SessionTransport};
use hxhim_core::config::{ConfigChain, MapSource};
use hxhim_core::Triple;
use std::collections::HashMap;
use std::path::Path;

fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn open(dir: &Path, pairs: &[(&str, &str)]) -> Session {
    let mut kv = map(pairs);
    kv.entry("db_path".to_string()).or_insert_with(|| dir.to_string_lossy().into_owned());
    kv.entry("db_name".to_string()).or_insert_with(|| "hxhim".to_string());
    kv.entry("debug_level".to_string()).or_insert_with(|| "error".to_string());
    let chain = ConfigChain::from_sources(vec![Box::new(MapSource(kv))]);
    let bootstrap = LocalBootstrap::new(0, 1);
    let fabric = ChannelFabric::new();
    Session::open(&bootstrap, SessionTransport::Channel(fabric), &chain).expect("session open")
}

/// A: two PUTs, flush, one GET, flush -- the result graph carries the
/// flushed PUT acks plus the recovered value.
#[test]
fn scenario_a_put_then_get_recovers_value() {
    let dir = tempfile::tempdir().unwrap();
    let session = open(dir.path(), &[("create_new_db", "true")]);

    session.put(Triple::new("alice", "age", "30")).unwrap();
    session.put(Triple::new("alice", "city", "paris")).unwrap();
    let put_acks = session.flush_puts().unwrap();
    assert!(!put_acks.is_empty());
    let mut cursor = put_acks.cursor();
    assert!(cursor.first_server());
    loop {
        assert!(cursor.error().is_none(), "a PUT ack reported an error");
        if !cursor.next_server() {
            break;
        }
    }

    session.get(b"alice", b"age").unwrap();
    let get_chain = session.flush_gets().unwrap();
    let mut cursor = get_chain.cursor();
    assert!(cursor.first_server());
    assert!(cursor.first_kv());
    assert_eq!(cursor.get_kv().unwrap().value, b"30");
}

/// B: 100 PUTs (each fanned out to six physical records, spec §3 Permutation
/// fan-out) then a full ordered walk of the primary index with
/// `GetOp::First` followed by `GetOp::Next` calls seeded from the prior
/// key -- every physical record is visited exactly once, in strictly
/// increasing key order.
#[test]
fn scenario_b_ordered_walk_visits_every_record_once_in_key_order() {
    let dir = tempfile::tempdir().unwrap();
    let session = open(dir.path(), &[("create_new_db", "true")]);

    const TRIPLES: usize = 100;
    const RECORDS_PER_TRIPLE: usize = 6;
    for i in 0..TRIPLES {
        session.put(Triple::new(format!("u{i}"), "k", i.to_string())).unwrap();
    }
    session.flush_puts().unwrap();

    let mut keys: Vec<Vec<u8>> = Vec::new();
    let mut seed: Option<Vec<u8>> = None;
    let mut op = GetOp::First;
    for _ in 0..(TRIPLES * RECORDS_PER_TRIPLE) {
        session.get_op(seed.clone(), op).unwrap();
        let chain = session.flush_gets().unwrap();
        let mut cursor = chain.cursor();
        assert!(cursor.first_server());
        assert!(cursor.first_kv());
        let kv = cursor.get_kv().expect("a record at every step of the walk");
        keys.push(kv.key.to_vec());
        seed = Some(kv.key.to_vec());
        op = GetOp::Next;
    }

    assert_eq!(keys.len(), TRIPLES * RECORDS_PER_TRIPLE);
    let distinct: std::collections::HashSet<_> = keys.iter().collect();
    assert_eq!(distinct.len(), TRIPLES * RECORDS_PER_TRIPLE, "every record visited exactly once");
    assert!(keys.windows(2).all(|w| w[0] < w[1]), "walk visits keys in strictly increasing order");

    // One more Next past the last record is a miss: present entry, empty
    // value (spec §7 NotFound), not a message-level error.
    session.get_op(seed, GetOp::Next).unwrap();
    let chain = session.flush_gets().unwrap();
    let mut cursor = chain.cursor();
    cursor.first_server();
    cursor.first_kv();
    assert!(cursor.get_kv().unwrap().value.is_empty(), "walking past the last record is a NotFound, not an error");
}

/// C: a batch of PUTs that spans two destination databases on the same rank
/// -- the result graph carries one ack per destination, and every entry in
/// both batches succeeds. Destinations are named explicitly (`put_unsafe`)
/// so the split across two ack nodes is deterministic rather than dependent
/// on where the hash router happens to land (DESIGN.md Open Questions).
#[test]
fn scenario_c_batch_spanning_two_databases_acks_both() {
    let dir = tempfile::tempdir().unwrap();
    let session = open(dir.path(), &[("create_new_db", "true"), ("dbs_per_server", "2")]);

    let db0 = Destination { rank: 0, db_index: 0 };
    let db1 = Destination { rank: 0, db_index: 1 };
    for i in 0..5 {
        session.put_unsafe(Triple::new(format!("s{i}"), "p", "o"), db0).unwrap();
    }
    for i in 5..10 {
        session.put_unsafe(Triple::new(format!("s{i}"), "p", "o"), db1).unwrap();
    }

    let chain = session.flush_puts().unwrap();
    assert_eq!(chain.len(), 2, "one ack per destination database");

    let mut cursor = chain.cursor();
    let mut seen_dbs = std::collections::HashSet::new();
    assert!(cursor.first_server());
    loop {
        assert!(cursor.error().is_none());
        seen_dbs.insert(cursor.database_index().unwrap());
        if !cursor.next_server() {
            break;
        }
    }
    assert_eq!(seen_dbs, [0, 1].into_iter().collect());
}

/// D: PUT, DELETE the same (S, P), flush everything, then GET -- the value
/// comes back zero-length (spec §7 NotFound, not an error).
#[test]
fn scenario_d_delete_then_get_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let session = open(dir.path(), &[("create_new_db", "true")]);

    session.put(Triple::new("alice", "age", "30")).unwrap();
    session.delete(b"alice", b"age").unwrap();
    session.flush_all().unwrap();

    session.get(b"alice", b"age").unwrap();
    let chain = session.flush_gets().unwrap();
    let mut cursor = chain.cursor();
    cursor.first_server();
    cursor.first_kv();
    assert!(cursor.get_kv().unwrap().value.is_empty());
}

/// E: open, PUT, close without flushing, re-open against the same path, GET
/// -- the unflushed PUT never reached the store, so it's gone (spec §3
/// Lifecycles: "unflushed requests are dropped with their buffers").
#[test]
fn scenario_e_unflushed_put_does_not_survive_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let session = open(dir.path(), &[("create_new_db", "true")]);
        session.put(Triple::new("alice", "age", "30")).unwrap();
        session.close().unwrap();
    }

    let session = open(dir.path(), &[("create_new_db", "false")]);
    session.get(b"alice", b"age").unwrap();
    let chain = session.flush_gets().unwrap();
    let mut cursor = chain.cursor();
    cursor.first_server();
    cursor.first_kv();
    assert!(cursor.get_kv().unwrap().value.is_empty());
}
