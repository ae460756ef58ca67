//! Persisted discovery results (`<builddir>/.kiln/discovery.json`).
//!
//! The store keeps two views: the records loaded from the previous run,
//! read-only, and the records committed by the current run. Flushing
//! writes only the current view, so the file always mirrors exactly the
//! calls the last generation made.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::path::BuildPath;
use crate::discovery::{DiscoveryError, FindQuery, FindResult};

/// Bumped when the file layout changes; older files are discarded.
const STORE_VERSION: u32 = 1;

/// File name of the store inside the state directory.
pub const STORE_FILE: &str = "discovery.json";

/// The persisted outcome of one cached glob expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub query: FindQuery,
    pub allow_missing: bool,
    pub matches: Vec<BuildPath>,
    pub extra: Vec<BuildPath>,
    pub dirs: Vec<BuildPath>,
    pub fingerprint: String,
}

impl DiscoveryRecord {
    pub fn new(query: FindQuery, allow_missing: bool, result: &FindResult) -> Self {
        DiscoveryRecord {
            fingerprint: result.fingerprint(&query),
            query,
            allow_missing,
            matches: result.matches.clone(),
            extra: result.extra.clone(),
            dirs: result.dirs.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    /// Records keyed by [`FindQuery::key`]
    records: BTreeMap<String, DiscoveryRecord>,
    /// Description file path (relative to the source root) to SHA-256
    inputs: BTreeMap<String, String>,
}

/// The discovery store of one build directory.
#[derive(Debug)]
pub struct DiscoveryStore {
    path: PathBuf,
    previous: StoreFile,
    records: RwLock<BTreeMap<String, DiscoveryRecord>>,
    inputs: RwLock<BTreeMap<String, String>>,
}

impl DiscoveryStore {
    /// Open the store at `path`. A missing file is an empty store; a file
    /// that cannot be read or parsed is an error.
    pub fn open(path: &Path) -> Result<Self, DiscoveryError> {
        let previous = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let file: StoreFile = serde_json::from_str(&contents).map_err(|e| {
                    DiscoveryError::io(path, io::Error::new(io::ErrorKind::InvalidData, e))
                })?;
                if file.version == STORE_VERSION {
                    file
                } else {
                    tracing::debug!(
                        "discarding discovery store version {} at {}",
                        file.version,
                        path.display()
                    );
                    StoreFile::default()
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(DiscoveryError::io(path, e)),
        };

        tracing::debug!(
            "opened discovery store {} with {} records",
            path.display(),
            previous.records.len()
        );

        Ok(DiscoveryStore {
            path: path.to_path_buf(),
            previous,
            records: RwLock::new(BTreeMap::new()),
            inputs: RwLock::new(BTreeMap::new()),
        })
    }

    /// The store of `build_dir`.
    pub fn open_in(build_dir: &Path) -> Result<Self, DiscoveryError> {
        Self::open(&Self::path_in(build_dir))
    }

    pub fn path_in(build_dir: &Path) -> PathBuf {
        build_dir
            .join(crate::core::environment::STATE_DIR)
            .join(STORE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A record persisted by the previous run.
    pub fn previous(&self, key: &str) -> Option<&DiscoveryRecord> {
        self.previous.records.get(key)
    }

    /// All records persisted by the previous run.
    pub fn previous_records(&self) -> impl Iterator<Item = &DiscoveryRecord> {
        self.previous.records.values()
    }

    /// Description file hashes persisted by the previous run.
    pub fn previous_inputs(&self) -> &BTreeMap<String, String> {
        &self.previous.inputs
    }

    /// Commit a record for this run. Returns false if the key was already
    /// committed.
    pub fn commit(&self, key: String, record: DiscoveryRecord) -> bool {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records.insert(key, record).is_none()
    }

    /// Whether this run has committed `key`.
    pub fn is_committed(&self, key: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    pub fn committed_len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Record the content hash of a description file.
    pub fn record_input(&self, path: impl Into<String>, sha256: impl Into<String>) {
        let mut inputs = self.inputs.write().unwrap_or_else(|e| e.into_inner());
        inputs.insert(path.into(), sha256.into());
    }

    /// Write this run's records atomically.
    pub fn flush(&self) -> Result<(), DiscoveryError> {
        let file = StoreFile {
            version: STORE_VERSION,
            records: self
                .records
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone(),
            inputs: self.inputs.read().unwrap_or_else(|e| e.into_inner()).clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| DiscoveryError::io(&self.path, io::Error::new(io::ErrorKind::InvalidData, e)))?;

        crate::util::fs::write_atomic(&self.path, json.as_bytes())
            .map_err(|e| DiscoveryError::io(&self.path, e))?;

        tracing::debug!(
            "flushed {} discovery records to {}",
            file.records.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(pattern: &str, files: &[&str]) -> (String, DiscoveryRecord) {
        let query = FindQuery::new(BuildPath::source("src").unwrap(), pattern);
        let result = FindResult {
            matches: files.iter().map(|f| BuildPath::source(f).unwrap()).collect(),
            ..FindResult::default()
        };
        (query.key(), DiscoveryRecord::new(query, false, &result))
    }

    #[test]
    fn test_missing_store_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = DiscoveryStore::open_in(tmp.path()).unwrap();
        assert_eq!(store.previous_records().count(), 0);
        assert!(store.previous_inputs().is_empty());
    }

    #[test]
    fn test_flush_mirrors_current_run() {
        let tmp = TempDir::new().unwrap();
        let (k1, r1) = record("*.c", &["src/a.c"]);
        let (k2, r2) = record("*.h", &["src/a.h"]);

        let store = DiscoveryStore::open_in(tmp.path()).unwrap();
        assert!(store.commit(k1.clone(), r1.clone()));
        assert!(!store.commit(k1.clone(), r1.clone()));
        store.commit(k2.clone(), r2);
        store.record_input("kiln.toml", "abc");
        store.flush().unwrap();

        // Second run only makes the first call.
        let store = DiscoveryStore::open_in(tmp.path()).unwrap();
        assert_eq!(store.previous(&k1), Some(&r1));
        assert!(store.previous(&k2).is_some());
        assert_eq!(store.previous_inputs()["kiln.toml"], "abc");
        store.commit(k1.clone(), r1);
        store.flush().unwrap();

        let store = DiscoveryStore::open_in(tmp.path()).unwrap();
        assert!(store.previous(&k1).is_some());
        assert!(store.previous(&k2).is_none());
        assert!(store.previous_inputs().is_empty());
    }

    #[test]
    fn test_corrupt_store_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let path = DiscoveryStore::path_in(tmp.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = DiscoveryStore::open(&path).unwrap_err();
        assert!(matches!(err, DiscoveryError::Io { .. }));
    }
}
