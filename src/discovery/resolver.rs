//! Glob expansion against the live source tree.
//!
//! Pure apart from reading the filesystem: no state, no caching.

use std::path::Path;

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::core::path::BuildPath;
use crate::discovery::{DiscoveryError, EntryKind, FindQuery, FindResult};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled glob. Patterns containing `/` match the path relative to the
/// base directory; others match the file name alone.
struct Matcher {
    pattern: Pattern,
    anchored: bool,
}

impl Matcher {
    fn new(pattern: &str) -> Result<Self, DiscoveryError> {
        Ok(Matcher {
            pattern: Pattern::new(pattern).map_err(|source| DiscoveryError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?,
            anchored: pattern.contains('/'),
        })
    }

    fn matches(&self, relative: &str, file_name: &str) -> bool {
        let candidate = if self.anchored { relative } else { file_name };
        self.pattern.matches_with(candidate, MATCH_OPTIONS)
    }
}

/// Expand `query` under `src_root`.
///
/// Entries are visited sorted by file name, base directories in the order
/// given. A missing base directory is an error unless `allow_missing` is
/// set.
pub fn find(
    src_root: &Path,
    query: &FindQuery,
    allow_missing: bool,
) -> Result<FindResult, DiscoveryError> {
    let primary = Matcher::new(&query.pattern)?;
    let extra = query.extra.as_deref().map(Matcher::new).transpose()?;

    let mut result = FindResult::default();
    for base in &query.dirs {
        let abs = base.to_path(src_root, src_root);
        match std::fs::metadata(&abs) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(DiscoveryError::io(
                    &abs,
                    std::io::Error::other("not a directory"),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && allow_missing => {
                tracing::debug!("skipping missing directory {}", abs.display());
                // Creating the directory later touches this ancestor.
                if let Some(ancestor) = nearest_existing_ancestor(src_root, base) {
                    result.dirs.push(ancestor);
                }
                continue;
            }
            Err(e) => return Err(DiscoveryError::io(&abs, e)),
        }

        result.dirs.push(base.clone());

        let max_depth = if query.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&abs)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name();

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(abs.as_path()).to_path_buf();
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                DiscoveryError::io(path, source)
            })?;

            let relative = entry
                .path()
                .strip_prefix(&abs)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let file_name = entry.file_name().to_string_lossy();
            let is_dir = entry.path().is_dir();
            let path = base.join(&relative)?;

            if is_dir && query.recursive {
                result.dirs.push(path.clone());
            }

            let kind_ok = match query.kind {
                EntryKind::File => !is_dir,
                EntryKind::Directory => is_dir,
                EntryKind::Any => true,
            };
            if !kind_ok {
                continue;
            }

            if primary.matches(&relative, &file_name) {
                result.matches.push(path);
            } else if extra
                .as_ref()
                .is_some_and(|m| m.matches(&relative, &file_name))
            {
                result.extra.push(path);
            }
        }
    }

    tracing::debug!(
        "{}: {} matches, {} extra, {} dirs",
        query,
        result.matches.len(),
        result.extra.len(),
        result.dirs.len()
    );
    Ok(result)
}

fn nearest_existing_ancestor(src_root: &Path, path: &BuildPath) -> Option<BuildPath> {
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.to_path(src_root, src_root).is_dir() {
            return Some(dir);
        }
        current = dir.parent();
    }
    None
}
