//! The result graph and its bidirectional iterator (spec §4.6).
//!
//! A flush appends one response [`Message`] per destination server to the
//! session-wide graph and hands the caller a [`ResultChain`] snapshot of
//! everything accumulated since the last drain. The chain exposes two nested
//! cursors: one over response messages (`first_server`/`next_server`/
//! `valid_server`), one over the (key, value) entries inside whichever
//! response is current (`first_kv`/`next_kv`/`prev_kv`/`valid_kv`).

use hxhim_core::{DbIndex, Rank, WorkOp};
use hxhim_wire::{KvEntry, Message};
use parking_lot::Mutex;
use std::sync::Arc;

/// The session-wide, append-only store of response messages (spec §3 Result
/// node, §5 "The result graph is protected by a single session-wide mutex").
#[derive(Default)]
pub struct ResultGraph {
    nodes: Mutex<Vec<Arc<Message>>>,
}

impl ResultGraph {
    pub fn new() -> Self {
        ResultGraph::default()
    }

    /// Append one response message. Called by the PUT drainer and by every
    /// synchronous flush path.
    pub fn push(&self, message: Message) {
        self.nodes.lock().push(Arc::new(message));
    }

    /// Take everything accumulated so far as an owned [`ResultChain`],
    /// leaving the graph empty. This is what a flush call returns to its
    /// caller (spec §4.6 "a flush returns the head of a linked chain").
    pub fn drain(&self) -> ResultChain {
        let nodes = std::mem::take(&mut *self.nodes.lock());
        ResultChain { nodes }
    }

    /// Number of response messages currently buffered, for `stats()` (ambient
    /// observability, SPEC_FULL §AMBIENT STACK).
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An owned snapshot of response messages, independent of the graph they were
/// drained from. Destroying the chain destroys its nodes (spec §4.6
/// "Destroying the head destroys the whole chain and its buffers" -- `Drop`
/// does this for free once `Arc` refcounts reach zero).
pub struct ResultChain {
    nodes: Vec<Arc<Message>>,
}

impl ResultChain {
    /// An empty chain, e.g. for a flush that found nothing to drain.
    pub fn empty() -> Self {
        ResultChain { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A fresh cursor positioned before the first response (spec: callers
    /// must call [`ResultCursor::first_server`] before reading).
    pub fn cursor(&self) -> ResultCursor<'_> {
        ResultCursor { nodes: &self.nodes, server_idx: None, kv_idx: 0 }
    }
}

/// One (key, value) pair exposed by [`ResultCursor::get_kv`]. A zero-length
/// `value` (as opposed to `None`) means "no such key" (spec §7 NotFound).
#[derive(Debug, Clone)]
pub struct Kv<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Bidirectional cursor over a [`ResultChain`] (spec §4.6).
pub struct ResultCursor<'a> {
    nodes: &'a [Arc<Message>],
    /// `None` before the first `first_server()` call or after running off
    /// either end of the chain.
    server_idx: Option<usize>,
    kv_idx: usize,
}

impl<'a> ResultCursor<'a> {
    /// Move to the first response message. Returns `false` if the chain is empty.
    pub fn first_server(&mut self) -> bool {
        self.kv_idx = 0;
        if self.nodes.is_empty() {
            self.server_idx = None;
            return false;
        }
        self.server_idx = Some(0);
        true
    }

    /// Advance to the next response message. Returns `false` (and invalidates
    /// the cursor) once past the last one.
    pub fn next_server(&mut self) -> bool {
        self.kv_idx = 0;
        match self.server_idx {
            Some(i) if i + 1 < self.nodes.len() => {
                self.server_idx = Some(i + 1);
                true
            }
            _ => {
                self.server_idx = None;
                false
            }
        }
    }

    /// Whether the cursor currently sits on a response message.
    pub fn valid_server(&self) -> bool {
        self.server_idx.is_some()
    }

    fn current(&self) -> Option<&'a Message> {
        self.server_idx.map(|i| self.nodes[i].as_ref())
    }

    /// Entries inside the current response, in wire order. Single-reply
    /// variants are normalized to a one-element (or zero-element, on
    /// NotFound/error) slice so bulk and single paths share one iterator.
    fn current_entries(&self) -> Vec<KvEntry> {
        match self.current() {
            Some(Message::RecvGet { key, value, .. }) => {
                vec![KvEntry { key: key.clone(), value: value.clone() }]
            }
            Some(Message::RecvBGet { entries, .. }) => entries.clone(),
            _ => Vec::new(),
        }
    }

    /// Move to the first entry of the current response. Returns `false` if
    /// the response has no entries.
    pub fn first_kv(&mut self) -> bool {
        self.kv_idx = 0;
        !self.current_entries().is_empty()
    }

    /// Advance to the next entry. Past the last entry this sets the cursor
    /// invalid; subsequent [`Self::get_kv`] calls return `None` (spec §4.6
    /// boundary behavior).
    pub fn next_kv(&mut self) -> bool {
        let len = self.current_entries().len();
        if self.kv_idx + 1 < len {
            self.kv_idx += 1;
            true
        } else {
            self.kv_idx = len; // one past the end: valid_kv() now reports false
            false
        }
    }

    /// Step back one entry. At position 0 this is a no-op and still reports
    /// valid (spec §4.6 "`prev-kv` at position 0 stays at 0 and reports
    /// still-valid").
    pub fn prev_kv(&mut self) -> bool {
        if self.kv_idx > 0 {
            self.kv_idx -= 1;
        }
        self.valid_kv()
    }

    /// Whether the cursor currently sits on an entry.
    pub fn valid_kv(&self) -> bool {
        self.kv_idx < self.current_entries().len()
    }

    /// Read the current entry, or `None` if the cursor is not on one. A
    /// present-but-empty `value` means "no such key" (spec §7 NotFound) --
    /// the entry itself is still a valid cursor position.
    pub fn get_kv(&self) -> Option<Kv<'_>> {
        if !self.valid_kv() {
            return None;
        }
        match self.current()? {
            Message::RecvGet { key, value, .. } => Some(Kv { key, value: value.as_deref().unwrap_or(&[]) }),
            Message::RecvBGet { entries, .. } => {
                let entry = &entries[self.kv_idx];
                Some(Kv { key: &entry.key, value: entry.value.as_deref().unwrap_or(&[]) })
            }
            _ => None,
        }
    }

    /// The operation this response answers.
    pub fn op(&self) -> Option<WorkOp> {
        match self.current()? {
            Message::Recv { .. } => Some(WorkOp::Put),
            Message::RecvGet { .. } => Some(WorkOp::Get),
            Message::RecvBGet { .. } => Some(WorkOp::BGet),
            Message::RecvBulk { .. } => Some(WorkOp::BPut),
            _ => None,
        }
    }

    /// The message-level error, if any (per-entry failures inside a bulk
    /// reply are not surfaced here -- see spec §7 propagation policy).
    pub fn error(&self) -> Option<&'a str> {
        match self.current()? {
            Message::Recv { error, .. }
            | Message::RecvGet { error, .. }
            | Message::RecvBGet { error, .. }
            | Message::RecvBulk { error, .. } => error.as_deref(),
            _ => None,
        }
    }

    /// The rank that produced the current response.
    pub fn source_server(&self) -> Option<Rank> {
        self.current().map(|m| m.header().src)
    }

    /// The local database index the current response was served from (the
    /// first entry of `per_entry_db`; bulk responses spanning more than one
    /// local database are not expected to share a single cursor position).
    pub fn database_index(&self) -> Option<DbIndex> {
        self.current().and_then(|m| m.header().per_entry_db.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hxhim_core::IndexType;

    fn header(src: Rank) -> hxhim_wire::Header {
        hxhim_wire::Header { src, dst: 0, index: "primary".to_string(), index_type: IndexType::Primary, per_entry_db: vec![0] }
    }

    #[test]
    fn server_traversal_boundaries() {
        let graph = ResultGraph::new();
        graph.push(Message::Recv { header: header(1), error: None });
        graph.push(Message::Recv { header: header(2), error: None });
        let chain = graph.drain();
        assert!(graph.is_empty());

        let mut cursor = chain.cursor();
        assert!(cursor.first_server());
        assert_eq!(cursor.source_server(), Some(1));
        assert!(cursor.next_server());
        assert_eq!(cursor.source_server(), Some(2));
        assert!(!cursor.next_server());
        assert!(!cursor.valid_server());
    }

    #[test]
    fn kv_traversal_and_boundaries() {
        let graph = ResultGraph::new();
        graph.push(Message::RecvBGet {
            header: header(1),
            error: None,
            entries: vec![
                KvEntry { key: b"a".to_vec(), value: Some(b"1".to_vec()) },
                KvEntry { key: b"b".to_vec(), value: Some(b"2".to_vec()) },
            ],
        });
        let chain = graph.drain();
        let mut cursor = chain.cursor();
        cursor.first_server();

        assert!(cursor.first_kv());
        assert_eq!(cursor.get_kv().unwrap().key, b"a");
        // prev-kv at position 0 is a no-op and stays valid.
        assert!(cursor.prev_kv());
        assert_eq!(cursor.get_kv().unwrap().key, b"a");

        assert!(cursor.next_kv());
        assert_eq!(cursor.get_kv().unwrap().key, b"b");
        // next-kv past the last entry invalidates the cursor.
        assert!(!cursor.next_kv());
        assert!(!cursor.valid_kv());
        assert!(cursor.get_kv().is_none());
    }

    #[test]
    fn not_found_entry_has_no_value() {
        let graph = ResultGraph::new();
        graph.push(Message::RecvGet { header: header(1), error: None, key: b"missing".to_vec(), value: None });
        let chain = graph.drain();
        let mut cursor = chain.cursor();
        cursor.first_server();
        cursor.first_kv();
        assert!(cursor.valid_kv());
        assert!(cursor.get_kv().unwrap().value.is_empty());
    }
}
