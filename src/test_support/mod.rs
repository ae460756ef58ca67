//! Test utilities for kiln unit tests.
//!
//! Fixtures build real source trees under a `TempDir`; discovery walks the
//! filesystem, so there is nothing to mock.
//!
//! # Example
//!
//! ```rust,ignore
//! use kiln::test_support::fixtures;
//!
//! #[test]
//! fn test_example() {
//!     let tmp = tempfile::TempDir::new().unwrap();
//!     fixtures::write_hello(tmp.path());
//!     // Configure and inspect the build directory...
//! }
//! ```

pub mod fixtures;

use std::path::Path;

use crate::backend::{Artifact, BackendId, BackendRegistry, EmitContext};
use crate::discovery::{DiscoveryCache, DiscoveryStore};
use crate::graph::FrozenGraph;
use crate::regen::RegenTrigger;

pub use fixtures::*;

/// Assemble and freeze the project at `src`, using a throwaway store.
pub fn frozen_graph(src: &Path) -> FrozenGraph {
    let project = crate::core::Project::load(&src.join(crate::core::PROJECT_FILE)).unwrap();
    let store_dir = tempfile::TempDir::new().unwrap();
    let cache = DiscoveryCache::new(src, DiscoveryStore::open_in(store_dir.path()).unwrap());
    crate::graph::assemble(&project, &cache)
        .unwrap()
        .finalize()
        .unwrap()
}

/// Render `graph` with one backend into memory.
pub fn emit(backend: BackendId, graph: &FrozenGraph, src: &Path, build: &Path) -> Artifact {
    let trigger = RegenTrigger::new(
        src,
        build,
        Path::new("/usr/bin/kiln"),
        std::iter::empty(),
    );
    let context = EmitContext {
        src_dir: src.to_path_buf(),
        build_dir: build.to_path_buf(),
    };
    let registry = BackendRegistry::new();
    let mut artifacts = registry
        .get(backend)
        .unwrap()
        .emit(graph, &trigger, &context)
        .unwrap();
    artifacts.remove(0)
}
