//! Memoizing, staleness-tracking wrapper around the resolver.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use rayon::prelude::*;

use crate::core::path::BuildPath;
use crate::discovery::resolver;
use crate::discovery::store::{DiscoveryRecord, DiscoveryStore};
use crate::discovery::{DiscoveryError, FindOptions, FindQuery, FindResult};

/// A cached query whose live result no longer matches the stored record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Divergence {
    pub query: FindQuery,
    pub added: Vec<BuildPath>,
    pub removed: Vec<BuildPath>,
}

impl Divergence {
    pub(crate) fn between(query: &FindQuery, old: &DiscoveryRecord, new: &FindResult) -> Self {
        let old_set: BTreeSet<&BuildPath> = old.matches.iter().chain(&old.extra).collect();
        let new_set: BTreeSet<&BuildPath> = new.matches.iter().chain(&new.extra).collect();
        Divergence {
            query: query.clone(),
            added: new_set.difference(&old_set).map(|p| (*p).clone()).collect(),
            removed: old_set.difference(&new_set).map(|p| (*p).clone()).collect(),
        }
    }
}

impl std::fmt::Display for Divergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} changed", self.query)?;
        let added: Vec<&str> = self.added.iter().map(|p| p.suffix()).collect();
        let removed: Vec<&str> = self.removed.iter().map(|p| p.suffix()).collect();
        if !added.is_empty() {
            write!(f, " (added: {})", added.join(", "))?;
        }
        if !removed.is_empty() {
            write!(f, " (removed: {})", removed.join(", "))?;
        }
        Ok(())
    }
}

/// Discovery for one generation run.
///
/// Identical queries are resolved once per run. Cached queries are
/// compared against the record the previous run left in the store and
/// committed for the next one.
pub struct DiscoveryCache {
    src_root: PathBuf,
    store: DiscoveryStore,
    memo: RwLock<HashMap<FindQuery, Arc<FindResult>>>,
    divergences: RwLock<Vec<Divergence>>,
    /// When false every call behaves as `cache = false`
    persist: bool,
    parallel: bool,
}

impl DiscoveryCache {
    pub fn new(src_root: &Path, store: DiscoveryStore) -> Self {
        DiscoveryCache {
            src_root: src_root.to_path_buf(),
            store,
            memo: RwLock::new(HashMap::new()),
            divergences: RwLock::new(Vec::new()),
            persist: true,
            parallel: true,
        }
    }

    /// Apply the `[discovery]` section of the user config.
    pub fn with_config(mut self, config: &crate::util::config::DiscoveryConfig) -> Self {
        self.persist = config.cache;
        self.parallel = config.parallel;
        self
    }

    pub fn store(&self) -> &DiscoveryStore {
        &self.store
    }

    /// Give the store back for flushing.
    pub fn into_store(self) -> DiscoveryStore {
        self.store
    }

    /// Resolve `query`, consulting the in-run memo first.
    pub fn find(
        &self,
        query: &FindQuery,
        options: FindOptions,
    ) -> Result<Arc<FindResult>, DiscoveryError> {
        let memoized = self
            .memo
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(query)
            .cloned();

        let result = match memoized {
            Some(result) => result,
            None => {
                let live = Arc::new(resolver::find(&self.src_root, query, options.allow_missing)?);
                let mut memo = self.memo.write().unwrap_or_else(|e| e.into_inner());
                memo.entry(query.clone()).or_insert(live).clone()
            }
        };

        if options.cache && self.persist {
            self.record(query, options, &result);
        }
        Ok(result)
    }

    /// Resolve independent queries up front, in parallel when enabled.
    pub fn resolve_all<'a, I>(&self, queries: I) -> Result<(), DiscoveryError>
    where
        I: IntoIterator<Item = (&'a FindQuery, &'a FindOptions)>,
    {
        let mut seen = HashSet::new();
        let unique: Vec<(&FindQuery, FindOptions)> = queries
            .into_iter()
            .filter(|(q, o)| seen.insert((*q, **o)))
            .map(|(q, o)| (q, *o))
            .collect();

        tracing::debug!("resolving {} discovery queries", unique.len());

        if self.parallel {
            unique
                .par_iter()
                .try_for_each(|(q, o)| self.find(q, *o).map(|_| ()))
        } else {
            unique
                .iter()
                .try_for_each(|(q, o)| self.find(q, *o).map(|_| ()))
        }
    }

    fn record(&self, query: &FindQuery, options: FindOptions, result: &FindResult) {
        let key = query.key();
        if self.store.is_committed(&key) {
            return;
        }

        let record = DiscoveryRecord::new(query.clone(), options.allow_missing, result);
        match self.store.previous(&key) {
            Some(old) if old.fingerprint != record.fingerprint => {
                let divergence = Divergence::between(query, old, result);
                tracing::warn!("discovery results changed: {}", divergence);
                self.divergences
                    .write()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(divergence);
            }
            Some(_) => {}
            None => tracing::debug!("new discovery record for {}", query),
        }

        self.store.commit(key, record);
    }

    /// Queries whose results changed since the previous run, sorted.
    pub fn divergences(&self) -> Vec<Divergence> {
        let mut out = self
            .divergences
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        out.sort_by(|a, b| a.query.cmp(&b.query));
        out.dedup();
        out
    }

    /// Every directory any query of this run traversed, cached or not.
    pub fn traversed_dirs(&self) -> BTreeSet<BuildPath> {
        self.memo
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .flat_map(|r| r.dirs.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures;
    use tempfile::TempDir;

    fn hello_query() -> FindQuery {
        FindQuery::new(BuildPath::source("src/hello").unwrap(), "*.cpp").with_extra("*.hpp")
    }

    fn run(src: &Path, build: &Path, query: &FindQuery, options: FindOptions) -> Vec<Divergence> {
        let store = DiscoveryStore::open_in(build).unwrap();
        let cache = DiscoveryCache::new(src, store);
        cache.find(query, options).unwrap();
        let divergences = cache.divergences();
        cache.into_store().flush().unwrap();
        divergences
    }

    #[test]
    fn test_memoizes_within_run() {
        let src = TempDir::new().unwrap();
        fixtures::write_hello(src.path());
        let build = TempDir::new().unwrap();

        let cache = DiscoveryCache::new(src.path(), DiscoveryStore::open_in(build.path()).unwrap());
        let first = cache.find(&hello_query(), FindOptions::default()).unwrap();

        // A file appearing mid-run is not seen: the memo answers.
        std::fs::write(src.path().join("src/hello/c.cpp"), "").unwrap();
        let second = cache.find(&hello_query(), FindOptions::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.matches.len(), 2);
        assert_eq!(cache.store().committed_len(), 1);
    }

    #[test]
    fn test_detects_added_file_across_runs() {
        let src = TempDir::new().unwrap();
        fixtures::write_hello(src.path());
        let build = TempDir::new().unwrap();

        assert!(run(src.path(), build.path(), &hello_query(), FindOptions::default()).is_empty());
        assert!(run(src.path(), build.path(), &hello_query(), FindOptions::default()).is_empty());

        std::fs::write(src.path().join("src/hello/c.cpp"), "").unwrap();
        let divergences = run(src.path(), build.path(), &hello_query(), FindOptions::default());
        assert_eq!(divergences.len(), 1);
        assert_eq!(divergences[0].added, vec![BuildPath::source("src/hello/c.cpp").unwrap()]);
        assert!(divergences[0].removed.is_empty());

        // The record was replaced.
        assert!(run(src.path(), build.path(), &hello_query(), FindOptions::default()).is_empty());
    }

    #[test]
    fn test_uncached_query_never_persists() {
        let src = TempDir::new().unwrap();
        fixtures::write_hello(src.path());
        let build = TempDir::new().unwrap();

        let uncached = FindOptions {
            cache: false,
            ..FindOptions::default()
        };
        let headers = FindQuery::new(BuildPath::source("src/hello").unwrap(), "*.hpp");

        let store = DiscoveryStore::open_in(build.path()).unwrap();
        let cache = DiscoveryCache::new(src.path(), store);
        cache
            .resolve_all([
                (&hello_query(), &FindOptions::default()),
                (&headers, &uncached),
            ])
            .unwrap();
        assert_eq!(cache.traversed_dirs().len(), 1);
        cache.into_store().flush().unwrap();

        let store = DiscoveryStore::open_in(build.path()).unwrap();
        assert!(store.previous(&hello_query().key()).is_some());
        assert!(store.previous(&headers.key()).is_none());

        // Changing what the uncached query sees reports nothing.
        std::fs::write(src.path().join("src/hello/extra.hpp"), "").unwrap();
        assert!(run(src.path(), build.path(), &headers, uncached).is_empty());
    }

    #[test]
    fn test_config_disables_persistence() {
        let src = TempDir::new().unwrap();
        fixtures::write_hello(src.path());
        let build = TempDir::new().unwrap();

        let config = crate::util::config::DiscoveryConfig {
            cache: false,
            parallel: false,
        };
        let cache = DiscoveryCache::new(src.path(), DiscoveryStore::open_in(build.path()).unwrap())
            .with_config(&config);
        cache.find(&hello_query(), FindOptions::default()).unwrap();
        assert_eq!(cache.store().committed_len(), 0);
    }
}
