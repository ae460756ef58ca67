//! Backend emitters.
//!
//! A backend lowers a [`FrozenGraph`] plus its [`RegenTrigger`] into the
//! build file of one tool. Every backend keeps the same promises:
//!
//! - explicit and implicit edges are dependencies the tool checks for
//!   staleness
//! - order-only edges order the build but never force a rebuild
//! - implicit outputs are known to the tool without appearing in commands
//! - phony targets aggregate without producing a file
//! - the build file regenerates itself through `kiln refresh`
//!
//! Where the formats differ (see [`Capabilities`]) each emitter works
//! around the gap in its own way, or rejects the graph up front with
//! [`EmitError::UnsupportedConstruct`].
//!
//! # Usage
//!
//! ```ignore
//! use kiln::backend::{BackendId, BackendRegistry};
//!
//! let registry = BackendRegistry::new();
//! let ninja = registry.get(BackendId::Ninja).unwrap();
//! let artifacts = ninja.emit(&graph, &trigger, &context)?;
//! kiln::backend::write_artifacts(&artifacts)?;
//! ```

pub mod capabilities;
pub mod make;
pub mod msbuild;
pub mod ninja;
pub mod registry;
pub mod writer;

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::core::path::{BuildPath, Root};
use crate::core::rule::{Fragment, Rule};
use crate::core::target::Target;
use crate::graph::assemble::ALL_TARGET;
use crate::graph::{EdgeKind, FrozenGraph, NodeId};
use crate::regen::RegenTrigger;
use crate::util::diagnostic::{suggestions, Diagnostic};

pub use capabilities::{BackendId, BackendIdParseError, Capabilities, Construct};
pub use registry::{get_backend_summaries, BackendRegistry, BackendSummary};
pub use writer::write_artifacts;

/// Errors producing or writing build files.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("the {backend} backend cannot express {construct} (in `{target}`)")]
    UnsupportedConstruct {
        backend: BackendId,
        construct: Construct,
        target: String,
    },

    #[error("failed to write {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EmitError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            EmitError::UnsupportedConstruct { .. } => Diagnostic::error(self.to_string())
                .with_suggestion(suggestions::OTHER_BACKEND),
            EmitError::Io { path, source } => Diagnostic::error(self.to_string())
                .with_context(source.to_string())
                .with_location(path),
        }
    }
}

/// Where the generated files go and what they build from.
#[derive(Debug, Clone)]
pub struct EmitContext {
    pub src_dir: PathBuf,
    pub build_dir: PathBuf,
}

/// A generated file, not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub contents: String,
}

/// A build file generator.
pub trait Emitter: Send + Sync {
    fn id(&self) -> BackendId;

    fn capabilities(&self) -> Capabilities {
        Capabilities::for_backend(self.id())
    }

    /// Render `graph`. Fails before producing anything if the graph uses a
    /// construct this backend cannot express.
    fn emit(
        &self,
        graph: &FrozenGraph,
        trigger: &RegenTrigger,
        context: &EmitContext,
    ) -> Result<Vec<Artifact>, EmitError>;
}

/// A target's dependencies sorted by how the build file must list them.
#[derive(Debug, Default)]
pub(crate) struct Prerequisites<'a> {
    /// Files named on the command line
    pub explicit: Vec<&'a BuildPath>,
    /// Files that trigger a rebuild without being named
    pub implicit: Vec<&'a BuildPath>,
    pub order_only: Vec<&'a BuildPath>,
    /// Phony targets depended upon for staleness
    pub phony: Vec<&'a Target>,
    pub phony_order_only: Vec<&'a Target>,
}

impl<'a> Prerequisites<'a> {
    pub fn of(graph: &'a FrozenGraph, id: NodeId) -> Self {
        let mut out = Prerequisites::default();
        for input in graph.inputs(id) {
            if let Some(phony) = input.phony() {
                match input.kind {
                    EdgeKind::OrderOnly => out.phony_order_only.push(phony),
                    _ => out.phony.push(phony),
                }
                continue;
            }
            let list = match input.kind {
                EdgeKind::Explicit => &mut out.explicit,
                EdgeKind::Implicit => &mut out.implicit,
                EdgeKind::OrderOnly => &mut out.order_only,
            };
            list.extend(input.paths());
        }
        out
    }

    /// Every staleness-relevant file, explicit first.
    pub fn dependencies(&self) -> impl Iterator<Item = &'a BuildPath> + '_ {
        self.explicit.iter().chain(&self.implicit).copied()
    }
}

/// Build-directory parents of a target's outputs, sorted.
pub(crate) fn output_dirs(target: &Target) -> BTreeSet<BuildPath> {
    target
        .all_outputs()
        .filter(|o| o.root() == Root::Build)
        .filter_map(BuildPath::parent)
        .filter(|d| !d.is_root())
        .collect()
}

/// Expand a rule's command for one target, rendering each path with
/// `path` and each variable value verbatim.
pub(crate) fn expand_command(
    rule: &Rule,
    target: &Target,
    inputs: &[&BuildPath],
    path: impl Fn(&BuildPath) -> String,
) -> String {
    let render = |paths: Vec<&BuildPath>| {
        paths.into_iter().map(&path).collect::<Vec<_>>().join(" ")
    };
    let mut out = String::new();
    for fragment in rule.command.fragments() {
        match fragment {
            Fragment::Literal(text) => out.push_str(text),
            Fragment::Inputs => out.push_str(&render(inputs.to_vec())),
            Fragment::Outputs => out.push_str(&render(target.outputs.iter().collect())),
            Fragment::Var(name) => {
                out.push_str(target.variables.get(name).map(String::as_str).unwrap_or(""))
            }
        }
    }
    // Empty variables leave trailing blanks behind.
    out.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// The target a bare invocation of the build tool should build: `all` when
/// the project has one, otherwise the last target in dependency order.
pub(crate) fn default_target(graph: &FrozenGraph) -> Option<&Target> {
    graph
        .lookup(ALL_TARGET)
        .and_then(|id| graph.target(id))
        .or_else(|| graph.targets().last().map(|(_, t)| t))
}

/// The target or rule description with `{out}` filled in.
pub(crate) fn describe(rule: &Rule, target: &Target) -> Option<String> {
    let template = target.description.as_deref().or(rule.description.as_deref())?;
    let outputs: Vec<&str> = target.outputs.iter().map(|o| o.suffix()).collect();
    Some(template.replace("{out}", &outputs.join(" ")))
}
