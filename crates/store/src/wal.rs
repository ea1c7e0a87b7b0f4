//! A minimal append-only write-ahead log used by [`crate::mem::MemStore`] so data
//! survives `close`/reopen within one process (spec §3 Lifecycles, §8 scenario E).
//!
//! This is not a distributed or replicated log -- that is out of scope per §1
//! Non-goals -- it is the local durability primitive the teacher's
//! `durability::wal::writer` module plays for the full database, scaled down to
//! what a single `OrderedStore` backend needs: framed records, a checksum per
//! record, and a replay-on-open path.

use byteorder::{ByteOrder, LittleEndian};
use hxhim_core::{HxhimError, HxhimResult};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// One logical change to the store.
#[derive(Debug, Clone)]
pub enum WalRecord {
    /// Insert or overwrite `key` with `value`.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Remove `key`.
    Delete { key: Vec<u8> },
}

const TAG_PUT: u8 = 1;
const TAG_DELETE: u8 = 2;

/// Appends [`WalRecord`]s to a single page file: `len(u32le) ++ crc32(u32le) ++ payload`.
pub struct WalWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl WalWriter {
    /// Open (creating if absent) the WAL file at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> HxhimResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(WalWriter { file: BufWriter::new(file), path })
    }

    /// Append one record and flush it to the OS (not necessarily fsync'd --
    /// matching the teacher's `DurabilityMode::Batched` default rather than
    /// `Strict`, since this backend is a test/reference fixture, not the
    /// production engine).
    pub fn append(&mut self, record: &WalRecord) -> HxhimResult<()> {
        let payload = encode_record(record);
        let mut header = [0u8; 8];
        LittleEndian::write_u32(&mut header[0..4], payload.len() as u32);
        LittleEndian::write_u32(&mut header[4..8], crc32fast::hash(&payload));
        self.file.write_all(&header)?;
        self.file.write_all(&payload)?;
        self.file.flush()?;
        Ok(())
    }

    /// Path backing this writer, for diagnostics.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Replay every well-formed record in a WAL file in order. A truncated final
/// record (the on-disk tail of a crash mid-write) is dropped rather than
/// treated as corruption, since this backend has no separate recovery pass.
pub fn replay(path: impl AsRef<Path>) -> HxhimResult<Vec<WalRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    loop {
        let mut header = [0u8; 8];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(HxhimError::Io(e)),
        }
        let len = LittleEndian::read_u32(&header[0..4]) as usize;
        let expected_crc = LittleEndian::read_u32(&header[4..8]);

        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).is_err() {
            break; // truncated tail, stop replay here
        }
        if crc32fast::hash(&payload) != expected_crc {
            tracing::warn!(path = %path.display(), "WAL record failed checksum, stopping replay");
            break;
        }
        match decode_record(&payload) {
            Some(record) => records.push(record),
            None => break,
        }
    }

    Ok(records)
}

fn encode_record(record: &WalRecord) -> Vec<u8> {
    match record {
        WalRecord::Put { key, value } => {
            let mut buf = Vec::with_capacity(1 + 8 + key.len() + value.len());
            buf.push(TAG_PUT);
            write_len_prefixed(&mut buf, key);
            write_len_prefixed(&mut buf, value);
            buf
        }
        WalRecord::Delete { key } => {
            let mut buf = Vec::with_capacity(1 + 4 + key.len());
            buf.push(TAG_DELETE);
            write_len_prefixed(&mut buf, key);
            buf
        }
    }
}

fn decode_record(buf: &[u8]) -> Option<WalRecord> {
    let (&tag, rest) = buf.split_first()?;
    match tag {
        TAG_PUT => {
            let (key, rest) = read_len_prefixed(rest)?;
            let (value, _) = read_len_prefixed(rest)?;
            Some(WalRecord::Put { key: key.to_vec(), value: value.to_vec() })
        }
        TAG_DELETE => {
            let (key, _) = read_len_prefixed(rest)?;
            Some(WalRecord::Delete { key: key.to_vec() })
        }
        _ => None,
    }
}

fn write_len_prefixed(buf: &mut Vec<u8>, data: &[u8]) {
    let mut len_buf = [0u8; 4];
    LittleEndian::write_u32(&mut len_buf, data.len() as u32);
    buf.extend_from_slice(&len_buf);
    buf.extend_from_slice(data);
}

fn read_len_prefixed(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    if buf.len() < 4 {
        return None;
    }
    let len = LittleEndian::read_u32(&buf[0..4]) as usize;
    let rest = &buf[4..];
    if rest.len() < len {
        return None;
    }
    Some((&rest[..len], &rest[len..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_replay_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut w = WalWriter::open(&path).unwrap();
            w.append(&WalRecord::Put { key: b"a".to_vec(), value: b"1".to_vec() }).unwrap();
            w.append(&WalRecord::Put { key: b"b".to_vec(), value: b"2".to_vec() }).unwrap();
            w.append(&WalRecord::Delete { key: b"a".to_vec() }).unwrap();
        }
        let records = replay(&path).unwrap();
        assert_eq!(records.len(), 3);
        match &records[2] {
            WalRecord::Delete { key } => assert_eq!(key, b"a"),
            _ => panic!("expected delete"),
        }
    }

    #[test]
    fn missing_file_replays_empty() {
        let records = replay("/nonexistent/path/does-not-exist.wal").unwrap();
        assert!(records.is_empty());
    }
}
