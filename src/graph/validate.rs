//! Cycle detection and dependency ordering.

use super::{BuildGraph, GraphError, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

struct Frame {
    node: NodeId,
    deps: Vec<NodeId>,
    next: usize,
}

impl BuildGraph {
    /// Check the graph is acyclic. On failure the error carries one cycle,
    /// each element depending on the next, first element repeated last.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.topo_order().map(|_| ())
    }

    /// Every node after everything it depends on. Roots are visited in
    /// insertion order and dependencies in edge order, so the result is
    /// deterministic.
    pub(crate) fn topo_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let count = self.graph.node_count();
        let mut marks = vec![Mark::Unvisited; count];
        let mut order = Vec::with_capacity(count);

        for root in self.graph.node_indices() {
            if marks[root.index()] != Mark::Unvisited {
                continue;
            }
            marks[root.index()] = Mark::Active;
            let mut stack = vec![self.frame(root)];

            while let Some(frame) = stack.last_mut() {
                if frame.next < frame.deps.len() {
                    let dep = frame.deps[frame.next];
                    frame.next += 1;
                    match marks[dep.index()] {
                        Mark::Done => {}
                        Mark::Active => return Err(self.cycle_error(&stack, dep)),
                        Mark::Unvisited => {
                            marks[dep.index()] = Mark::Active;
                            stack.push(self.frame(dep));
                        }
                    }
                } else {
                    let node = frame.node;
                    marks[node.index()] = Mark::Done;
                    order.push(node);
                    stack.pop();
                }
            }
        }

        Ok(order)
    }

    fn frame(&self, node: NodeId) -> Frame {
        Frame {
            node,
            deps: self.dependencies(node).into_iter().map(|(id, _)| id).collect(),
            next: 0,
        }
    }

    fn cycle_error(&self, stack: &[Frame], closing: NodeId) -> GraphError {
        let start = stack
            .iter()
            .position(|f| f.node == closing)
            .unwrap_or(0);
        let mut path: Vec<String> = stack[start..]
            .iter()
            .map(|f| self.graph[f.node].label())
            .collect();
        path.push(self.graph[closing].label());
        GraphError::CycleDetected { path }
    }
}
