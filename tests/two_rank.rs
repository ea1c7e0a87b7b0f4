//! Scenario F (spec §8): two ranks, one put on rank 0, one get on rank 1 --
//! the value crosses the channel-fabric transport and comes back on the
//! querying rank's result graph.

use hxhim::{ChannelFabric, LocalBootstrap, Session, SessionTransport};
use hxhim_core::config::{ConfigChain, MapSource};
use hxhim_core::Triple;
use std::collections::HashMap;
use std::path::Path;

fn open_rank(dir: &Path, rank: i32, rank_count: u32, fabric: ChannelFabric) -> Session {
    let mut kv = HashMap::new();
    kv.insert("db_path".to_string(), dir.to_string_lossy().into_owned());
    kv.insert("db_name".to_string(), "hxhim".to_string());
    kv.insert("debug_level".to_string(), "error".to_string());
    kv.insert("create_new_db".to_string(), "true".to_string());
    // Only rank 0 qualifies as a range server under this factor (spec §4.2):
    // rank 1 % 2 != 0, so rank 1 is a pure client.
    kv.insert("rangeserver_factor".to_string(), "2".to_string());
    let chain = ConfigChain::from_sources(vec![Box::new(MapSource(kv))]);
    let bootstrap = LocalBootstrap::new(rank, rank_count);
    Session::open(&bootstrap, SessionTransport::Channel(fabric), &chain).expect("session open")
}

#[test]
fn scenario_f_cross_rank_get_recovers_value_written_by_another_rank() {
    let dir = tempfile::tempdir().unwrap();
    let fabric = ChannelFabric::new();

    let rank0 = open_rank(dir.path(), 0, 2, fabric.clone());
    rank0.put(Triple::new("x", "y", "z")).unwrap();
    let acks = rank0.flush_puts().unwrap();
    assert!(!acks.is_empty());

    let rank1 = open_rank(dir.path(), 1, 2, fabric);
    assert_eq!(rank1.rank(), 1);
    rank1.get(b"x", b"y").unwrap();
    let chain = rank1.flush_gets().unwrap();
    let mut cursor = chain.cursor();
    assert!(cursor.first_server());
    assert!(cursor.first_kv());
    assert_eq!(cursor.get_kv().unwrap().value, b"z");

    rank1.close().unwrap();
    rank0.close().unwrap();
}
