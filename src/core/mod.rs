//! Core data structures for kiln.
//!
//! - Root-anchored paths ([`BuildPath`])
//! - Rules and command templates
//! - Graph targets
//! - The project description and its toolchain
//! - The persisted build-directory environment

pub mod environment;
pub mod path;
pub mod project;
pub mod rule;
pub mod target;
pub mod toolchain;

pub use environment::Environment;
pub use path::{BuildPath, Root};
pub use project::{Project, PROJECT_FILE};
pub use rule::{CommandTemplate, Rule};
pub use target::{LinkKind, Target, TargetKind};
pub use toolchain::Toolchain;
