//! The session manifest (spec §6 "Persisted state layout"): a small file
//! recording the index parameters a deployment was opened with, written by
//! the designated manifest-writing rank on close and cross-checked on a
//! later open against that rank's local store directory.

use hxhim_core::{HxhimError, HxhimResult, KeyType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The parameters spec §6 names: "key-type, db-type, rangeserver-factor,
/// slice-size, node-count".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub db_type: String,
    pub key_type: String,
    pub rangeserver_factor: u32,
    pub slice_size: u64,
    pub node_count: u32,
}

impl Manifest {
    pub fn new(db_type: &str, key_type: KeyType, rangeserver_factor: u32, slice_size: u64, node_count: u32) -> Self {
        Manifest {
            db_type: db_type.to_string(),
            key_type: format!("{key_type:?}").to_ascii_lowercase(),
            rangeserver_factor,
            slice_size,
            node_count,
        }
    }

    fn path(db_path: &Path) -> PathBuf {
        db_path.join("hxhim.manifest")
    }

    /// Persist this manifest under `db_path`.
    pub fn write(&self, db_path: &Path) -> HxhimResult<()> {
        std::fs::create_dir_all(db_path)?;
        let contents =
            serde_json::to_string_pretty(self).map_err(|e| HxhimError::Store(format!("failed to serialize manifest: {e}")))?;
        std::fs::write(Self::path(db_path), contents)?;
        Ok(())
    }

    /// Read a previously written manifest, if `db_path` has one.
    pub fn read(db_path: &Path) -> HxhimResult<Option<Manifest>> {
        match std::fs::read_to_string(Self::path(db_path)) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|e| HxhimError::Store(format!("failed to parse manifest: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HxhimError::Io(e)),
        }
    }

    /// Cross-check an on-disk manifest against the runtime configuration this
    /// rank is opening with; any mismatch aborts the open (spec §6).
    pub fn check(&self, runtime: &Manifest) -> HxhimResult<()> {
        if self != runtime {
            return Err(HxhimError::ManifestMismatch(format!(
                "on-disk manifest {self:?} does not match runtime configuration {runtime:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::new("memory", KeyType::Byte, 1, 1024, 4);
        manifest.write(dir.path()).unwrap();
        let read_back = Manifest::read(dir.path()).unwrap().unwrap();
        assert_eq!(manifest, read_back);
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Manifest::read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn mismatch_is_rejected() {
        let on_disk = Manifest::new("memory", KeyType::Byte, 1, 1024, 4);
        let runtime = Manifest::new("memory", KeyType::Byte, 2, 1024, 4);
        assert!(on_disk.check(&runtime).is_err());
    }
}
