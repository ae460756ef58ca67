//! The backend-agnostic build graph.
//!
//! Nodes are either plain files (sources, prebuilt objects) or targets.
//! Edges run from a dependency to the target that depends on it and carry
//! an [`EdgeKind`]. The graph is built up with `add_*`, checked with
//! [`BuildGraph::validate`] and frozen with [`BuildGraph::finalize`], after
//! which nothing can change it.

pub mod assemble;
mod frozen;
mod validate;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use thiserror::Error;

use crate::core::path::BuildPath;
use crate::core::rule::{expand_output_pattern, Rule};
use crate::core::target::Target;
use crate::util::diagnostic::{suggestions, Diagnostic};

pub use assemble::assemble;
pub use frozen::{FrozenGraph, Input, InputRef};

/// Index of a node in the graph arena.
pub type NodeId = NodeIndex;

/// How a dependency participates in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    /// On the command line, and a change forces a rebuild
    Explicit,
    /// Not on the command line, but a change forces a rebuild
    Implicit,
    /// Must exist first, never forces a rebuild
    OrderOnly,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Explicit => "explicit",
            EdgeKind::Implicit => "implicit",
            EdgeKind::OrderOnly => "order-only",
        }
    }
}

/// A graph node.
#[derive(Debug, Clone)]
pub enum Node {
    File(BuildPath),
    Target(Target),
}

impl Node {
    /// Human readable name: the target name or the file path.
    pub fn label(&self) -> String {
        match self {
            Node::File(path) => path.to_string(),
            Node::Target(target) => target.name.clone(),
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Node::Target(t) => Some(t),
            Node::File(_) => None,
        }
    }
}

/// Errors building or checking a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate {kind} `{name}`")]
    DuplicateIdentity { kind: &'static str, name: String },

    #[error("`{referrer}` refers to unknown {kind} `{name}`")]
    UnknownReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },

    #[error("dependency cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("target `{target}` is invalid: {reason}")]
    InvalidTarget { target: String, reason: &'static str },
}

impl GraphError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            GraphError::CycleDetected { path } => Diagnostic::error("dependency cycle detected")
                .with_context(path.join(" -> "))
                .with_suggestion(suggestions::BREAK_CYCLE),

            GraphError::UnknownReference { .. } => Diagnostic::error(self.to_string())
                .with_suggestion(suggestions::UNKNOWN_REFERENCE),

            GraphError::DuplicateIdentity { kind, name } => Diagnostic::error(self.to_string())
                .with_suggestion(format!("give each {} a distinct name; `{}` is used twice", kind, name)),

            GraphError::InvalidTarget { .. } => Diagnostic::error(self.to_string()),
        }
    }
}

/// A mutable build graph, exclusively owned by one generation run.
#[derive(Debug, Default)]
pub struct BuildGraph {
    graph: DiGraph<Node, EdgeKind>,
    /// Target name to node
    names: HashMap<String, NodeId>,
    /// File path to node; outputs map to their producing target
    files: HashMap<BuildPath, NodeId>,
    rules: BTreeMap<String, Rule>,
    /// Files shipped with the project but not built from
    distribution: BTreeSet<BuildPath>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule. Rules are immutable once added.
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), GraphError> {
        if self.rules.contains_key(&rule.name) {
            return Err(GraphError::DuplicateIdentity {
                kind: "rule",
                name: rule.name,
            });
        }
        tracing::debug!("rule `{}`: {}", rule.name, rule.command);
        self.rules.insert(rule.name.clone(), rule);
        Ok(())
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// The node for a raw file path, creating it if needed. A path that is
    /// the output of a target resolves to that target.
    pub fn add_source(&mut self, path: BuildPath) -> NodeId {
        if let Some(&id) = self.files.get(&path) {
            return id;
        }
        let id = self.graph.add_node(Node::File(path.clone()));
        self.files.insert(path, id);
        id
    }

    /// Add a target.
    ///
    /// Fails if the name or any output is already taken, if a non-phony
    /// target names an unknown rule or has no outputs, or if a phony
    /// target has a rule or outputs. The rule's implicit outputs are
    /// expanded onto the target and its implicit inputs become implicit
    /// edges.
    pub fn add_target(&mut self, mut target: Target) -> Result<NodeId, GraphError> {
        if self.names.contains_key(&target.name) {
            return Err(GraphError::DuplicateIdentity {
                kind: "target",
                name: target.name,
            });
        }

        let mut implicit_inputs = Vec::new();
        if target.is_phony() {
            if target.rule.is_some() || target.all_outputs().next().is_some() {
                return Err(GraphError::InvalidTarget {
                    target: target.name,
                    reason: "phony targets have no rule and no outputs",
                });
            }
        } else {
            let rule_name = target.rule.clone().ok_or_else(|| GraphError::InvalidTarget {
                target: target.name.clone(),
                reason: "only phony targets may omit a rule",
            })?;
            let rule = self
                .rules
                .get(&rule_name)
                .ok_or_else(|| GraphError::UnknownReference {
                    kind: "rule",
                    name: rule_name.clone(),
                    referrer: target.name.clone(),
                })?;
            let primary = target
                .primary_output()
                .cloned()
                .ok_or_else(|| GraphError::InvalidTarget {
                    target: target.name.clone(),
                    reason: "a target with a rule needs at least one output",
                })?;

            for pattern in &rule.implicit_outputs {
                let path = expand_output_pattern(pattern, &primary);
                if !target.all_outputs().any(|o| *o == path) {
                    target.implicit_outputs.push(path);
                }
            }
            implicit_inputs = rule.implicit_inputs.clone();
        }

        let mut seen = BTreeSet::new();
        for output in target.all_outputs() {
            let claimed = self
                .files
                .get(output)
                .is_some_and(|&id| matches!(self.graph[id], Node::Target(_)));
            if claimed || !seen.insert(output) {
                return Err(GraphError::DuplicateIdentity {
                    kind: "output",
                    name: output.to_string(),
                });
            }
        }

        let name = target.name.clone();
        let outputs: Vec<BuildPath> = target.all_outputs().cloned().collect();
        let id = self.graph.add_node(Node::Target(target));
        self.names.insert(name.clone(), id);

        for output in outputs {
            // A file seen earlier as a raw source is now produced here; its
            // existing consumers come to depend on this target through it.
            if let Some(&file) = self.files.get(&output) {
                self.graph.add_edge(id, file, EdgeKind::Explicit);
            }
            self.files.insert(output, id);
        }

        for input in implicit_inputs {
            let from = self.add_source(input);
            self.add_edge(from, id, EdgeKind::Implicit)?;
        }

        tracing::debug!("target `{}` added", name);
        Ok(id)
    }

    /// Add a dependency edge. `to` must be a target.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<(), GraphError> {
        if self.graph.node_weight(from).is_none() {
            return Err(GraphError::UnknownReference {
                kind: "node",
                name: format!("#{}", from.index()),
                referrer: self.label_or_index(to),
            });
        }
        match self.graph.node_weight(to) {
            Some(Node::Target(_)) => {}
            Some(Node::File(path)) => {
                return Err(GraphError::UnknownReference {
                    kind: "target",
                    name: path.to_string(),
                    referrer: self.graph[from].label(),
                })
            }
            None => {
                return Err(GraphError::UnknownReference {
                    kind: "node",
                    name: format!("#{}", to.index()),
                    referrer: self.graph[from].label(),
                })
            }
        }

        let exists = self
            .graph
            .edges_connecting(from, to)
            .any(|e| *e.weight() == kind);
        if !exists {
            self.graph.add_edge(from, to, kind);
        }
        Ok(())
    }

    /// Add a file input to a target.
    pub fn add_input(&mut self, to: NodeId, path: BuildPath, kind: EdgeKind) -> Result<(), GraphError> {
        let from = self.add_source(path);
        self.add_edge(from, to, kind)
    }

    /// Record files that ship with the project without being built from.
    pub fn add_distribution(&mut self, paths: impl IntoIterator<Item = BuildPath>) {
        self.distribution.extend(paths);
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn target(&self, id: NodeId) -> Option<&Target> {
        self.graph.node_weight(id).and_then(Node::as_target)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies of `id` in the order their edges were added.
    fn dependencies(&self, id: NodeId) -> Vec<(NodeId, EdgeKind)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id, Direction::Incoming)
            .map(|e| (e.id(), e.source(), *e.weight()))
            .collect();
        edges.sort_by_key(|(edge, _, _)| *edge);
        edges.into_iter().map(|(_, from, kind)| (from, kind)).collect()
    }

    fn label_or_index(&self, id: NodeId) -> String {
        self.graph
            .node_weight(id)
            .map(Node::label)
            .unwrap_or_else(|| format!("#{}", id.index()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rule::CommandTemplate;
    use crate::core::target::TargetKind;

    fn rule(name: &str, command: &str) -> Rule {
        Rule::new(name, CommandTemplate::parse(command).unwrap())
    }

    fn build(p: &str) -> BuildPath {
        BuildPath::build(p).unwrap()
    }

    #[test]
    fn test_duplicate_identities() {
        let mut graph = BuildGraph::new();
        graph.add_rule(rule("cc", "cc {in} -o {out}")).unwrap();
        assert!(matches!(
            graph.add_rule(rule("cc", "x")),
            Err(GraphError::DuplicateIdentity { kind: "rule", .. })
        ));

        let a = Target::new("a", TargetKind::Object)
            .with_rule("cc")
            .with_output(build("a.o"));
        graph.add_target(a.clone()).unwrap();
        assert!(matches!(
            graph.add_target(a),
            Err(GraphError::DuplicateIdentity { kind: "target", .. })
        ));

        let b = Target::new("b", TargetKind::Object)
            .with_rule("cc")
            .with_output(build("a.o"));
        assert!(matches!(
            graph.add_target(b),
            Err(GraphError::DuplicateIdentity { kind: "output", .. })
        ));
    }

    #[test]
    fn test_unknown_references() {
        let mut graph = BuildGraph::new();
        let t = Target::new("a", TargetKind::Custom)
            .with_rule("nope")
            .with_output(build("a"));
        assert!(matches!(
            graph.add_target(t),
            Err(GraphError::UnknownReference { kind: "rule", .. })
        ));

        let file = graph.add_source(BuildPath::source("x.c").unwrap());
        let other = graph.add_source(BuildPath::source("y.c").unwrap());
        assert!(matches!(
            graph.add_edge(file, other, EdgeKind::Explicit),
            Err(GraphError::UnknownReference { kind: "target", .. })
        ));
        assert!(matches!(
            graph.add_edge(file, NodeIndex::new(99), EdgeKind::Explicit),
            Err(GraphError::UnknownReference { kind: "node", .. })
        ));
    }

    #[test]
    fn test_phony_shape() {
        let mut graph = BuildGraph::new();
        graph.add_rule(rule("cc", "cc")).unwrap();
        let bad = Target::phony("all").with_rule("cc");
        assert!(matches!(
            graph.add_target(bad),
            Err(GraphError::InvalidTarget { .. })
        ));
        let no_outputs = Target::new("x", TargetKind::Custom).with_rule("cc");
        assert!(matches!(
            graph.add_target(no_outputs),
            Err(GraphError::InvalidTarget { .. })
        ));
        graph.add_target(Target::phony("all")).unwrap();
    }

    #[test]
    fn test_rule_implicit_outputs_and_inputs() {
        let mut graph = BuildGraph::new();
        graph
            .add_rule(
                rule("gen", "gen {in} {out}")
                    .with_implicit_output("{out}.h")
                    .with_implicit_input(BuildPath::source("tools/gen.py").unwrap()),
            )
            .unwrap();
        let id = graph
            .add_target(
                Target::new("code", TargetKind::Custom)
                    .with_rule("gen")
                    .with_output(build("code.c")),
            )
            .unwrap();

        let target = graph.target(id).unwrap();
        assert_eq!(target.implicit_outputs, vec![build("code.c.h")]);
        let deps = graph.dependencies(id);
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].1, EdgeKind::Implicit);

        // The implicit output is claimed too.
        assert_eq!(graph.add_source(build("code.c.h")), id);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = BuildGraph::new();
        let all = graph.add_target(Target::phony("all")).unwrap();
        let src = BuildPath::source("a.c").unwrap();
        graph.add_input(all, src.clone(), EdgeKind::Explicit).unwrap();
        graph.add_input(all, src.clone(), EdgeKind::Explicit).unwrap();
        graph.add_input(all, src, EdgeKind::OrderOnly).unwrap();
        assert_eq!(graph.dependencies(all).len(), 2);
    }
}
