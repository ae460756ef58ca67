//! kiln - a meta-build system
//!
//! kiln reads a `kiln.toml` project description, discovers source files
//! through cached glob queries, lowers the project into a dependency graph
//! and emits a Makefile, a Ninja file or an MSBuild project that
//! regenerates itself when the description or the globbed directories
//! change. kiln never compiles anything itself.

pub mod backend;
pub mod core;
pub mod discovery;
pub mod error;
pub mod graph;
pub mod ops;
pub mod regen;
pub mod util;

/// Test utilities for kiln unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides project fixtures that write real source
/// trees into temporary directories.
#[cfg(test)]
pub mod test_support;

pub use backend::{BackendId, BackendRegistry, Emitter};
pub use core::{BuildPath, Project, Rule, Target};
pub use error::{Error, Result};
pub use graph::{BuildGraph, FrozenGraph};
pub use regen::{RegenState, RegenTrigger};
