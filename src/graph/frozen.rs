//! The immutable, validated graph handed to emitters.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::DiGraph;

use super::{BuildGraph, EdgeKind, GraphError, Node, NodeId};
use crate::core::path::BuildPath;
use crate::core::rule::Rule;
use crate::core::target::Target;
use crate::util::hash::Fingerprint;

/// What an input edge points at.
#[derive(Debug, Clone, Copy)]
pub enum InputRef<'a> {
    /// A file nothing in the graph produces
    File(&'a BuildPath),
    /// A target; its explicit outputs are the files consumed
    Target(&'a Target),
}

/// One dependency of a target.
#[derive(Debug, Clone, Copy)]
pub struct Input<'a> {
    pub node: NodeId,
    pub kind: EdgeKind,
    pub source: InputRef<'a>,
}

impl<'a> Input<'a> {
    /// Files this input contributes. Phony targets contribute none.
    pub fn paths(&self) -> Vec<&'a BuildPath> {
        match self.source {
            InputRef::File(path) => vec![path],
            InputRef::Target(t) => t.outputs.iter().collect(),
        }
    }

    /// The phony target behind this input, if any.
    pub fn phony(&self) -> Option<&'a Target> {
        match self.source {
            InputRef::Target(t) if t.is_phony() => Some(t),
            _ => None,
        }
    }
}

/// A validated graph with a fingerprint per target.
#[derive(Debug)]
pub struct FrozenGraph {
    graph: DiGraph<Node, EdgeKind>,
    names: HashMap<String, NodeId>,
    files: HashMap<BuildPath, NodeId>,
    rules: BTreeMap<String, Rule>,
    distribution: BTreeSet<BuildPath>,
    order: Vec<NodeId>,
    fingerprints: HashMap<NodeId, String>,
}

impl BuildGraph {
    /// Validate and freeze the graph, computing target fingerprints.
    ///
    /// A fingerprint covers the target's kind, rule command, outputs and
    /// variables, and the fingerprints (or paths, for plain files) of its
    /// inputs, so it changes whenever anything upstream does.
    pub fn finalize(self) -> Result<FrozenGraph, GraphError> {
        let order = self.topo_order()?;
        let mut fingerprints: HashMap<NodeId, String> = HashMap::new();

        for &id in &order {
            let deps = self.dependencies(id);
            match &self.graph[id] {
                Node::Target(target) => {
                    let mut fp = Fingerprint::new();
                    fp.update_str(target.kind.as_str())
                        .update_opt(
                            target
                                .rule
                                .as_deref()
                                .and_then(|r| self.rules.get(r))
                                .map(|r| r.command.as_str()),
                        )
                        .update_paths(&target.outputs)
                        .update_paths(&target.implicit_outputs)
                        .update_str(&target.variables.len().to_string());
                    for (name, value) in &target.variables {
                        fp.update_str(name).update_str(value);
                    }
                    fp.update_str(&deps.len().to_string());
                    for (dep, kind) in &deps {
                        fp.update_str(kind.as_str());
                        match (&self.graph[*dep], fingerprints.get(dep)) {
                            (_, Some(upstream)) => fp.update_str(upstream),
                            (Node::File(path), None) => fp.update_path(path),
                            (Node::Target(t), None) => fp.update_str(&t.name),
                        };
                    }
                    fingerprints.insert(id, fp.finish());
                }
                Node::File(_) => {
                    // A claimed file stands for the target producing it.
                    let producer = deps
                        .iter()
                        .find(|(dep, _)| matches!(self.graph[*dep], Node::Target(_)))
                        .and_then(|(dep, _)| fingerprints.get(dep).cloned());
                    if let Some(fp) = producer {
                        fingerprints.insert(id, fp);
                    }
                }
            }
        }

        tracing::debug!(
            "finalized graph: {} nodes, {} edges, {} rules",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.rules.len()
        );

        Ok(FrozenGraph {
            graph: self.graph,
            names: self.names,
            files: self.files,
            rules: self.rules,
            distribution: self.distribution,
            order,
            fingerprints,
        })
    }
}

impl FrozenGraph {
    /// Targets in dependency order.
    pub fn targets(&self) -> impl Iterator<Item = (NodeId, &Target)> {
        self.order
            .iter()
            .filter_map(|&id| self.graph[id].as_target().map(|t| (id, t)))
    }

    pub fn target(&self, id: NodeId) -> Option<&Target> {
        self.graph.node_weight(id).and_then(Node::as_target)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(id)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// The inputs of a target in the order they were added. A claimed file
    /// resolves to its producing target.
    pub fn inputs(&self, id: NodeId) -> Vec<Input<'_>> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id, petgraph::Direction::Incoming)
            .map(|e| {
                use petgraph::visit::EdgeRef;
                (e.id(), e.source(), *e.weight())
            })
            .collect();
        edges.sort_by_key(|(edge, _, _)| *edge);

        let mut seen = BTreeSet::new();
        edges
            .into_iter()
            .filter_map(|(_, from, kind)| {
                let (node, source) = match &self.graph[from] {
                    Node::Target(t) => (from, InputRef::Target(t)),
                    Node::File(path) => match self.files.get(path) {
                        Some(&producer) if producer != from => {
                            (producer, InputRef::Target(self.target(producer)?))
                        }
                        _ => (from, InputRef::File(path)),
                    },
                };
                seen.insert((node, kind)).then_some(Input { node, kind, source })
            })
            .collect()
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// All rules, sorted by name.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    /// Rules referenced by at least one target, sorted by name.
    pub fn used_rules(&self) -> Vec<&Rule> {
        let used: BTreeSet<&str> = self
            .targets()
            .filter_map(|(_, t)| t.rule.as_deref())
            .collect();
        used.into_iter().filter_map(|name| self.rules.get(name)).collect()
    }

    pub fn fingerprint(&self, id: NodeId) -> Option<&str> {
        self.fingerprints.get(&id).map(String::as_str)
    }

    /// The target producing `path`.
    pub fn producer(&self, path: &BuildPath) -> Option<&Target> {
        self.files.get(path).and_then(|&id| self.target(id))
    }

    /// Files shipped with the project but not built from, sorted.
    pub fn distribution(&self) -> impl Iterator<Item = &BuildPath> {
        self.distribution.iter()
    }

    /// Every path the graph mentions: files and outputs.
    pub fn paths(&self) -> impl Iterator<Item = &BuildPath> {
        self.graph.node_weights().flat_map(|node| match node {
            Node::File(path) => vec![path],
            Node::Target(t) => t.all_outputs().collect(),
        })
    }

    pub fn target_count(&self) -> usize {
        self.targets().count()
    }
}
