//! Reverse-mode automatic differentiation implementation.
//!
//! The backward pass computes gradients by:
//! 1. Building a topological ordering of nodes reachable from the root
//! 2. Traversing that order from the root towards the leaves, adding each
//!    node's local contributions into its parents' `grad`

use tracing::{instrument, trace};

use crate::node::{Graph, ValueId};
use crate::ops::local_gradients;

/// Order the nodes reachable from `root` so that every node comes before all
/// of its parents. The root is first.
///
/// This is a depth-first postorder over parent edges, reversed. A visited
/// bitset sized to the arena makes nodes reachable along several paths appear
/// once. The traversal uses an explicit stack, so long accumulation chains
/// (e.g. a dot product over thousands of terms) do not exhaust the call stack.
pub fn topological_order(graph: &Graph, root: ValueId) -> Vec<ValueId> {
    let mut visited = vec![false; graph.len()];
    let mut order = Vec::new();
    // (node, parents already pushed)
    let mut stack = vec![(root, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            order.push(id);
            continue;
        }
        if visited[id.0] {
            continue;
        }
        visited[id.0] = true;
        stack.push((id, true));

        // Reverse so the first operand is explored first.
        for parent in graph.node(id).op.parents().rev() {
            if !visited[parent.0] {
                stack.push((parent, false));
            }
        }
    }

    order.reverse();
    order
}

impl Graph {
    /// Compute d(root)/d(node) for every node reachable from `root`.
    ///
    /// Seeds `root.grad = 1` and then applies each node's local rule in
    /// topological order. Gradients are accumulated with `+=`; nodes that
    /// were not reset with [`Graph::zero_grad`] keep contributions from
    /// earlier calls.
    ///
    /// The graph must be acyclic, which holds for any graph built through
    /// [`crate::Tape`].
    #[instrument(level = "debug", skip(self), fields(nodes = self.len()))]
    pub fn backward(&mut self, root: ValueId) {
        let order = topological_order(self, root);
        trace!(reachable = order.len(), "topological order built");

        self.nodes[root.0].grad = 1.0;

        for id in order {
            let out = &self.nodes[id.0];
            let out_grad = out.grad;

            // Nothing flows out of a node no consumer reached.
            if out_grad == 0.0 {
                continue;
            }

            let contributions = local_gradients(&self.nodes, out);
            for (parent, local) in contributions.into_iter().flatten() {
                // Chain rule: parent.grad += d(out)/d(parent) * out.grad
                self.nodes[parent.0].grad += local * out_grad;
            }
        }
    }
}
