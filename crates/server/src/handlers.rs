//! Range-server request handlers (spec §4.4): PUT, BPUT, GET/BGET (with the
//! EQ/NEXT/PREV/FIRST/LAST dispatch and the range-scan path), DELETE/BDELETE,
//! and COMMIT. Each handler takes the already-decoded request and the
//! resolved [`Index`] and returns the matching response [`Message`].

use hxhim_core::{DbIndex, GetOp, HxhimError, HxhimResult};
use hxhim_index::Index;
use hxhim_store::OrderedStore;
use hxhim_wire::{Header, KvEntry, Message};
use std::sync::Arc;

/// Handler-wide configuration that isn't per-request (spec §6 `value_append`).
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerConfig {
    pub value_append: bool,
}

/// Dispatch one decoded request against the index it targets.
pub fn handle(request: Message, index: &Index, config: HandlerConfig) -> Message {
    match request {
        Message::Put { header, key, value } => handle_put(header, key, value, index, config),
        Message::BPut { header, entries } => handle_bput(header, entries, index, config),
        Message::Get { header, op, key } => handle_get(header, op, key, index),
        Message::BGet { header, op, keys, num_recs } => handle_bget(header, op, keys, num_recs, index),
        Message::Delete { header, key } => handle_delete(header, key, index),
        Message::BDelete { header, keys } => handle_bdelete(header, keys, index),
        Message::Commit { header } => handle_commit(header, index),
        Message::Close { header } => Message::Recv { header, error: None },
        other => {
            // Response-side variants never reach a handler; a caller bug, not
            // a request-time error.
            let header = other.header().clone();
            Message::Recv { header, error: Some("handler received a response-shaped message".to_string()) }
        }
    }
}

fn local_db(index: &Index, db_index: DbIndex) -> HxhimResult<&Arc<dyn OrderedStore>> {
    index
        .local_db(db_index)
        .ok_or_else(|| HxhimError::Store(format!("index '{}' has no local database {db_index} on this rank", index.name())))
}

fn db_index_of(header: &Header) -> DbIndex {
    header.per_entry_db.first().copied().unwrap_or(0)
}

fn handle_put(header: Header, key: Vec<u8>, value: Vec<u8>, index: &Index, config: HandlerConfig) -> Message {
    let result = (|| -> HxhimResult<()> {
        let db = local_db(index, db_index_of(&header))?;
        let value = if config.value_append {
            append_to_existing(db, &key, value)?
        } else {
            value
        };
        db.put(&key, &value)?;
        index.partitioner().update_stat(&key);
        Ok(())
    })();
    Message::Recv { header, error: result.err().map(|e| e.to_string()) }
}

fn append_to_existing(db: &Arc<dyn OrderedStore>, key: &[u8], value: Vec<u8>) -> HxhimResult<Vec<u8>> {
    match db.get(key)? {
        Some(mut existing) => {
            existing.extend_from_slice(&value);
            Ok(existing)
        }
        None => Ok(value),
    }
}

fn handle_bput(header: Header, entries: Vec<KvEntry>, index: &Index, config: HandlerConfig) -> Message {
    let db_indices = per_entry_dbs(&header, entries.len());
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    // Grouped by destination local database, since a bulk PUT's entries may
    // target more than one local database (spec §4.3 Header.per_entry_db).
    for (db_index, group) in group_by_db(&db_indices, &entries) {
        let outcome = (|| -> HxhimResult<()> {
            let db = local_db(index, db_index)?;
            let mut batch = Vec::with_capacity(group.len());
            for entry in &group {
                let value = entry.value.clone().unwrap_or_default();
                let value = if config.value_append { append_to_existing(db, &entry.key, value)? } else { value };
                batch.push((entry.key.clone(), value));
            }
            db.batch_put(&batch)?;
            for (key, _) in &batch {
                index.partitioner().update_stat(key);
            }
            Ok(())
        })();
        match outcome {
            Ok(()) => succeeded += group.len(),
            Err(_) => failed += group.len(),
        }
    }
    let error = if failed > 0 && succeeded == 0 { Some("every entry in the batch failed".to_string()) } else { None };
    Message::RecvBulk { header, error, succeeded, failed }
}

fn handle_get(header: Header, op: GetOp, key: Option<Vec<u8>>, index: &Index) -> Message {
    let db_index = db_index_of(&header);
    let result = (|| -> HxhimResult<Option<Vec<u8>>> {
        let db = local_db(index, db_index)?;
        lookup(db.as_ref(), op, key.as_deref()).map(|entry| entry.map(|(_, v)| v))
    })();
    match result {
        Ok(value) => Message::RecvGet { header, error: None, key: key.unwrap_or_default(), value },
        Err(e) => Message::RecvGet { header, error: Some(e.to_string()), key: key.unwrap_or_default(), value: None },
    }
}

fn lookup(db: &dyn OrderedStore, op: GetOp, key: Option<&[u8]>) -> HxhimResult<Option<(Vec<u8>, Vec<u8>)>> {
    match op {
        GetOp::Eq => {
            let key = key.ok_or_else(|| HxhimError::InputInvalid("GetOp::Eq requires a key".to_string()))?;
            Ok(db.get(key)?.map(|v| (key.to_vec(), v)))
        }
        GetOp::Next => db.get_next(key),
        GetOp::Prev => db.get_prev(key),
        GetOp::First => db.get_next(None),
        GetOp::Last => db.get_prev(None),
    }
}

fn handle_bget(header: Header, op: GetOp, keys: Vec<Option<Vec<u8>>>, num_recs: usize, index: &Index) -> Message {
    let db_index = db_index_of(&header);

    // A single-key request with num_recs > 1 takes the distinct range-scan
    // code path (spec §4.4): walk forward from the seed, emitting up to
    // num_recs (key, value) pairs.
    if keys.len() == 1 && num_recs > 1 {
        let seed = keys[0].clone();
        let result = (|| -> HxhimResult<Vec<(Vec<u8>, Vec<u8>)>> {
            let db = local_db(index, db_index)?;
            let seed = match seed.clone() {
                Some(s) => s,
                None => match lookup(db.as_ref(), GetOp::First, None)? {
                    Some((k, _)) => k,
                    None => return Ok(Vec::new()),
                },
            };
            db.scan_forward(&seed, num_recs)
        })();
        return match result {
            Ok(pairs) => Message::RecvBGet {
                header,
                error: None,
                entries: pairs.into_iter().map(|(key, value)| KvEntry { key, value: Some(value) }).collect(),
            },
            Err(e) => Message::RecvBGet { header, error: Some(e.to_string()), entries: Vec::new() },
        };
    }

    let db = match local_db(index, db_index) {
        Ok(db) => db,
        Err(e) => return Message::RecvBGet { header, error: Some(e.to_string()), entries: Vec::new() },
    };

    // Each key resolves independently; a miss is a present-but-empty value,
    // never a message-level failure (spec §7).
    let entries = keys
        .into_iter()
        .map(|key| match lookup(db.as_ref(), op, key.as_deref()) {
            Ok(Some((k, v))) => KvEntry { key: k, value: Some(v) },
            Ok(None) => KvEntry { key: key_or_empty(&key), value: Some(Vec::new()) },
            Err(_) => KvEntry { key: key_or_empty(&key), value: None },
        })
        .collect();
    Message::RecvBGet { header, error: None, entries }
}

fn key_or_empty(key: &Option<Vec<u8>>) -> Vec<u8> {
    key.clone().unwrap_or_default()
}

fn handle_delete(header: Header, key: Vec<u8>, index: &Index) -> Message {
    let result = (|| -> HxhimResult<()> {
        let db = local_db(index, db_index_of(&header))?;
        db.delete(&key)
    })();
    Message::Recv { header, error: result.err().map(|e| e.to_string()) }
}

fn handle_bdelete(header: Header, keys: Vec<Vec<u8>>, index: &Index) -> Message {
    let db_indices = per_entry_dbs(&header, keys.len());
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let keyed_entries: Vec<KvEntry> = keys.into_iter().map(|key| KvEntry { key, value: None }).collect();
    for (db_index, group) in group_by_db(&db_indices, &keyed_entries) {
        let outcome = (|| -> HxhimResult<()> {
            let db = local_db(index, db_index)?;
            db.batch_delete(&group.iter().map(|e| e.key.clone()).collect::<Vec<_>>())
        })();
        match outcome {
            Ok(()) => succeeded += group.len(),
            Err(_) => failed += group.len(),
        }
    }
    let error = if failed > 0 && succeeded == 0 { Some("every entry in the batch failed".to_string()) } else { None };
    Message::RecvBulk { header, error, succeeded, failed }
}

fn handle_commit(header: Header, index: &Index) -> Message {
    // Commit every local database this rank hosts for the index -- the
    // request doesn't name a single db_index (spec §4.4 COMMIT).
    let mut first_error = None;
    for db_index in 0.. {
        match index.local_db(db_index) {
            Some(db) => {
                if let Err(e) = db.commit() {
                    first_error.get_or_insert(e.to_string());
                }
            }
            None => break,
        }
    }
    Message::Recv { header, error: first_error }
}

/// Per-entry target database indices, defaulting every entry to
/// `per_entry_db[0]` when the header carries only one (the common case of a
/// batch that lands entirely on one local database).
fn per_entry_dbs(header: &Header, count: usize) -> Vec<DbIndex> {
    if header.per_entry_db.len() == count {
        header.per_entry_db.clone()
    } else {
        let db = header.per_entry_db.first().copied().unwrap_or(0);
        vec![db; count]
    }
}

fn group_by_db(db_indices: &[DbIndex], entries: &[KvEntry]) -> Vec<(DbIndex, Vec<KvEntry>)> {
    let mut groups: Vec<(DbIndex, Vec<KvEntry>)> = Vec::new();
    for (db_index, entry) in db_indices.iter().zip(entries.iter()) {
        match groups.iter_mut().find(|(d, _)| d == db_index) {
            Some((_, bucket)) => bucket.push(entry.clone()),
            None => groups.push((*db_index, vec![entry.clone()])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxhim_core::{IndexType, KeyType};
    use hxhim_index::{IndexConfig, IndexRegistry, LocalDbSpec};
    use std::collections::HashMap;

    fn registry() -> (tempfile::TempDir, IndexRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let mut specs = HashMap::new();
        specs.insert("primary".to_string(), LocalDbSpec { db_path: dir.path().to_path_buf(), create_new: true });
        let config = IndexConfig {
            name: "primary".to_string(),
            index_type: IndexType::Primary,
            key_type: KeyType::Byte,
            rangeserver_factor: 1,
            dbs_per_server: 1,
            slice_size: 1024,
        };
        let registry = IndexRegistry::open(0, 1, config, vec![], &specs).unwrap();
        (dir, registry)
    }

    fn header() -> Header {
        Header { src: 0, dst: 0, index: "primary".to_string(), index_type: IndexType::Primary, per_entry_db: vec![0] }
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, registry) = registry();
        let index = registry.primary();

        let put_response = handle(Message::Put { header: header(), key: b"k".to_vec(), value: b"v".to_vec() }, &index, HandlerConfig::default());
        assert!(matches!(put_response, Message::Recv { error: None, .. }));

        let get_response = handle(Message::Get { header: header(), op: GetOp::Eq, key: Some(b"k".to_vec()) }, &index, HandlerConfig::default());
        match get_response {
            Message::RecvGet { value, .. } => assert_eq!(value, Some(b"v".to_vec())),
            _ => panic!("wrong response variant"),
        }
    }

    #[test]
    fn get_missing_key_is_empty_not_an_error() {
        let (_dir, registry) = registry();
        let index = registry.primary();
        let response = handle(Message::Get { header: header(), op: GetOp::Eq, key: Some(b"missing".to_vec()) }, &index, HandlerConfig::default());
        match response {
            Message::RecvGet { error, value, .. } => {
                assert!(error.is_none());
                assert_eq!(value, None);
            }
            _ => panic!("wrong response variant"),
        }
    }

    #[test]
    fn value_append_concatenates() {
        let (_dir, registry) = registry();
        let index = registry.primary();
        let config = HandlerConfig { value_append: true };
        handle(Message::Put { header: header(), key: b"k".to_vec(), value: b"a".to_vec() }, &index, config);
        handle(Message::Put { header: header(), key: b"k".to_vec(), value: b"b".to_vec() }, &index, config);
        let response = handle(Message::Get { header: header(), op: GetOp::Eq, key: Some(b"k".to_vec()) }, &index, config);
        match response {
            Message::RecvGet { value, .. } => assert_eq!(value, Some(b"ab".to_vec())),
            _ => panic!("wrong response variant"),
        }
    }

    #[test]
    fn delete_then_get_is_empty() {
        let (_dir, registry) = registry();
        let index = registry.primary();
        handle(Message::Put { header: header(), key: b"k".to_vec(), value: b"v".to_vec() }, &index, HandlerConfig::default());
        handle(Message::Delete { header: header(), key: b"k".to_vec() }, &index, HandlerConfig::default());
        let response = handle(Message::Get { header: header(), op: GetOp::Eq, key: Some(b"k".to_vec()) }, &index, HandlerConfig::default());
        match response {
            Message::RecvGet { value, .. } => assert_eq!(value, None),
            _ => panic!("wrong response variant"),
        }
    }

    #[test]
    fn bput_then_range_scan_recovers_in_order() {
        let (_dir, registry) = registry();
        let index = registry.primary();
        let entries: Vec<KvEntry> = (0u8..10).map(|i| KvEntry { key: vec![i], value: Some(vec![i]) }).collect();
        let response = handle(Message::BPut { header: header(), entries }, &index, HandlerConfig::default());
        assert!(matches!(response, Message::RecvBulk { succeeded: 10, failed: 0, .. }));

        let response = handle(
            Message::BGet { header: header(), op: GetOp::Next, keys: vec![Some(vec![0u8])], num_recs: 5 },
            &index,
            HandlerConfig::default(),
        );
        match response {
            Message::RecvBGet { entries, .. } => {
                let keys: Vec<u8> = entries.iter().map(|e| e.key[0]).collect();
                assert_eq!(keys, vec![0, 1, 2, 3, 4]);
            }
            _ => panic!("wrong response variant"),
        }
    }

    #[test]
    fn commit_succeeds_with_no_error() {
        let (_dir, registry) = registry();
        let index = registry.primary();
        let response = handle(Message::Commit { header: header() }, &index, HandlerConfig::default());
        assert!(matches!(response, Message::Recv { error: None, .. }));
    }
}
