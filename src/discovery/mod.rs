//! File discovery.
//!
//! Projects name their sources with glob queries rather than literal lists.
//! The [`resolver`] expands a query against the live source tree, the
//! [`cache`] memoizes expansions within a run and compares them with the
//! previous run, and the [`store`] persists those results in the build
//! directory so a later run (or `kiln check`) can tell when they went stale.

pub mod cache;
pub mod resolver;
pub mod store;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::path::{BuildPath, PathError};
use crate::util::hash::Fingerprint;

pub use cache::{DiscoveryCache, Divergence};
pub use store::{DiscoveryRecord, DiscoveryStore};

/// Errors raised while discovering files.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid glob pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error(transparent)]
    Path(#[from] PathError),
}

impl DiscoveryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DiscoveryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Which directory entries a query may return.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    #[serde(alias = "dir")]
    Directory,
    Any,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Any => "any",
        }
    }
}

/// The full signature of one glob expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindQuery {
    /// Base directories, relative to the source root, searched in order
    pub dirs: Vec<BuildPath>,
    pub pattern: String,
    /// Pattern for distribution-only files
    pub extra: Option<String>,
    pub kind: EntryKind,
    pub recursive: bool,
}

impl FindQuery {
    /// A non-recursive file query over one directory.
    pub fn new(dir: BuildPath, pattern: impl Into<String>) -> Self {
        FindQuery {
            dirs: vec![dir],
            pattern: pattern.into(),
            extra: None,
            kind: EntryKind::File,
            recursive: false,
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Stable identity of the query, used as the store key.
    pub fn key(&self) -> String {
        let mut fp = Fingerprint::new();
        self.hash_params(&mut fp);
        fp.finish_short()
    }

    pub(crate) fn hash_params(&self, fp: &mut Fingerprint) {
        fp.update_paths(&self.dirs)
            .update_str(&self.pattern)
            .update_opt(self.extra.as_deref())
            .update_str(self.kind.as_str())
            .update_bool(self.recursive);
    }
}

impl std::fmt::Display for FindQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dirs: Vec<&str> = self
            .dirs
            .iter()
            .map(|d| if d.is_root() { "." } else { d.suffix() })
            .collect();
        write!(f, "`{}` in {}", self.pattern, dirs.join(", "))
    }
}

/// Per-call switches that are not part of the query's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FindOptions {
    /// A missing base directory yields no entries instead of an error
    pub allow_missing: bool,
    /// Persist the result so staleness can be detected across runs
    pub cache: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        FindOptions {
            allow_missing: false,
            cache: true,
        }
    }
}

/// The outcome of one expansion. All paths are rooted at the source
/// directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindResult {
    pub matches: Vec<BuildPath>,
    /// Distribution-only entries
    pub extra: Vec<BuildPath>,
    /// Every directory traversed
    pub dirs: Vec<BuildPath>,
}

impl FindResult {
    /// Fingerprint of the result lists together with the query parameters.
    pub fn fingerprint(&self, query: &FindQuery) -> String {
        let mut matches: Vec<&BuildPath> = self.matches.iter().collect();
        let mut extra: Vec<&BuildPath> = self.extra.iter().collect();
        let mut dirs: Vec<&BuildPath> = self.dirs.iter().collect();
        matches.sort();
        extra.sort();
        dirs.sort();

        let mut fp = Fingerprint::new();
        query.hash_params(&mut fp);
        fp.update_paths(matches).update_paths(extra).update_paths(dirs);
        fp.finish()
    }
}
