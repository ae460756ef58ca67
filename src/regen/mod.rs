//! Regeneration trigger.
//!
//! Every emitted build file carries a rule that re-runs `kiln refresh`
//! when a description file changes or a directory a cached glob traversed
//! gains or loses entries. [`RegenTrigger::evaluate`] answers the same
//! question without a build tool, for `kiln check`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::environment::STATE_DIR;
use crate::core::path::BuildPath;
use crate::core::project::PROJECT_FILE;
use crate::discovery::store::STORE_FILE;
use crate::discovery::{resolver, DiscoveryError, DiscoveryStore, Divergence, FindQuery};
use crate::util::hash::sha256_file;
use crate::util::quote::shell_join;

/// What the regenerate step depends on, produces and runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenTrigger {
    /// Description files, rooted at the source directory
    pub descriptions: Vec<BuildPath>,
    /// Directories traversed by discovery, sorted
    pub dirs: Vec<BuildPath>,
    /// State the step rewrites besides the build file itself
    pub outputs: Vec<BuildPath>,
    /// Argument vector of the step
    pub command: Vec<String>,
}

impl RegenTrigger {
    pub fn new(
        src_dir: &Path,
        build_dir: &Path,
        kiln_exe: &Path,
        dirs: impl IntoIterator<Item = BuildPath>,
    ) -> Self {
        let mut dirs: Vec<BuildPath> = dirs.into_iter().collect();
        dirs.sort();
        dirs.dedup();

        let descriptions = BuildPath::source(PROJECT_FILE).into_iter().collect();
        let outputs = BuildPath::build(&format!("{}/{}", STATE_DIR, STORE_FILE))
            .into_iter()
            .collect();

        tracing::debug!(
            "regeneration watches {} and {} directories under {}",
            PROJECT_FILE,
            dirs.len(),
            src_dir.display()
        );

        RegenTrigger {
            descriptions,
            dirs,
            outputs,
            command: vec![
                kiln_exe.display().to_string(),
                "refresh".to_string(),
                build_dir.display().to_string(),
            ],
        }
    }

    /// Watch another description file. Its hash must be recorded in the
    /// store for [`RegenTrigger::evaluate`] to see changes.
    pub fn with_description(mut self, path: BuildPath) -> Self {
        if !self.descriptions.contains(&path) {
            self.descriptions.push(path);
        }
        self
    }

    /// Description files followed by directories.
    pub fn inputs(&self) -> impl Iterator<Item = &BuildPath> {
        self.descriptions.iter().chain(&self.dirs)
    }

    /// The command as one POSIX shell line.
    pub fn command_line(&self) -> String {
        shell_join(&self.command)
    }

    /// Compare the source tree with what the last generation recorded in
    /// `store`.
    ///
    /// Description files are compared by content hash, so touching one
    /// without changing it does not make the build stale. Every cached
    /// query is re-run against the live tree.
    pub fn evaluate(src_root: &Path, store: &DiscoveryStore) -> Result<RegenState, DiscoveryError> {
        let mut reasons = Vec::new();

        if store.previous_inputs().is_empty() {
            reasons.push(StaleReason::NotGenerated);
        }

        for (file, expected) in store.previous_inputs() {
            let path = src_root.join(file);
            match sha256_file(&path) {
                Ok(actual) if actual == *expected => {}
                Ok(_) => reasons.push(StaleReason::DescriptionChanged(PathBuf::from(file))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    reasons.push(StaleReason::DescriptionMissing(PathBuf::from(file)))
                }
                Err(e) => return Err(DiscoveryError::io(path, e)),
            }
        }

        for record in store.previous_records() {
            match resolver::find(src_root, &record.query, record.allow_missing) {
                Ok(live) if live.fingerprint(&record.query) == record.fingerprint => {}
                Ok(live) => reasons.push(StaleReason::DiscoveryChanged(Divergence::between(
                    &record.query,
                    record,
                    &live,
                ))),
                Err(e) => reasons.push(StaleReason::DiscoveryFailed {
                    query: record.query.clone(),
                    message: e.to_string(),
                }),
            }
        }

        Ok(if reasons.is_empty() {
            RegenState::Current
        } else {
            RegenState::Stale(reasons)
        })
    }
}

/// Whether the emitted build files still describe the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegenState {
    Current,
    Stale(Vec<StaleReason>),
}

impl RegenState {
    pub fn is_stale(&self) -> bool {
        matches!(self, RegenState::Stale(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// No generation has completed in this build directory
    NotGenerated,
    DescriptionChanged(PathBuf),
    DescriptionMissing(PathBuf),
    DiscoveryChanged(Divergence),
    DiscoveryFailed { query: FindQuery, message: String },
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::NotGenerated => write!(f, "build files were never generated"),
            StaleReason::DescriptionChanged(path) => write!(f, "{} changed", path.display()),
            StaleReason::DescriptionMissing(path) => write!(f, "{} was removed", path.display()),
            StaleReason::DiscoveryChanged(divergence) => write!(f, "{}", divergence),
            StaleReason::DiscoveryFailed { query, message } => {
                write!(f, "{} can no longer be resolved: {}", query, message)
            }
        }
    }
}
