//! Core data structures for the computation graph.
//!
//! Nodes live in a [`Graph`] arena and are addressed by [`ValueId`] handles.
//! A node may only reference nodes that were created before it, so the graph
//! is acyclic by construction.

use tracing::trace;

use crate::error::GraphError;
use crate::tape::{Detached, Fragment, Remap, Tape};

/// Handle to a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) usize);

impl ValueId {
    /// Position of the node in its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The operation that produced a node, together with the handles of its parents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    /// An input or parameter. Has no parents.
    Leaf,
    /// Addition: a + b
    Add(ValueId, ValueId),
    /// Subtraction: a - b
    Sub(ValueId, ValueId),
    /// Multiplication: a * b
    Mul(ValueId, ValueId),
    /// Division: a / b
    Div(ValueId, ValueId),
    /// Negation: -a
    Neg(ValueId),
    /// Power with constant exponent: base^exponent
    Pow { base: ValueId, exponent: f64 },
    /// Exponential: exp(a)
    Exp(ValueId),
    /// Natural logarithm: ln(a)
    Log(ValueId),
    /// Rectified linear unit: max(0, a)
    Relu(ValueId),
    /// Logistic sigmoid: 1 / (1 + exp(-a))
    Sigmoid(ValueId),
    /// Hyperbolic tangent.
    Tanh(ValueId),
}

impl Op {
    /// Parents of this node, in operand order.
    pub fn parents(&self) -> impl DoubleEndedIterator<Item = ValueId> {
        let pair = match *self {
            Op::Leaf => [None, None],
            Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::Div(a, b) => [Some(a), Some(b)],
            Op::Neg(a)
            | Op::Pow { base: a, .. }
            | Op::Exp(a)
            | Op::Log(a)
            | Op::Relu(a)
            | Op::Sigmoid(a)
            | Op::Tanh(a) => [Some(a), None],
        };
        pair.into_iter().flatten()
    }

    /// Short lowercase tag, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Leaf => "leaf",
            Op::Add(..) => "add",
            Op::Sub(..) => "sub",
            Op::Mul(..) => "mul",
            Op::Div(..) => "div",
            Op::Neg(_) => "neg",
            Op::Pow { .. } => "pow",
            Op::Exp(_) => "exp",
            Op::Log(_) => "log",
            Op::Relu(_) => "relu",
            Op::Sigmoid(_) => "sigmoid",
            Op::Tanh(_) => "tanh",
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Op::Leaf)
    }

    /// Rewrite every parent handle through `f`.
    pub(crate) fn map_parents(self, f: impl Fn(ValueId) -> ValueId) -> Op {
        match self {
            Op::Leaf => Op::Leaf,
            Op::Add(a, b) => Op::Add(f(a), f(b)),
            Op::Sub(a, b) => Op::Sub(f(a), f(b)),
            Op::Mul(a, b) => Op::Mul(f(a), f(b)),
            Op::Div(a, b) => Op::Div(f(a), f(b)),
            Op::Neg(a) => Op::Neg(f(a)),
            Op::Pow { base, exponent } => Op::Pow {
                base: f(base),
                exponent,
            },
            Op::Exp(a) => Op::Exp(f(a)),
            Op::Log(a) => Op::Log(f(a)),
            Op::Relu(a) => Op::Relu(f(a)),
            Op::Sigmoid(a) => Op::Sigmoid(f(a)),
            Op::Tanh(a) => Op::Tanh(f(a)),
        }
    }
}

/// A single scalar in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Forward value.
    pub scalar: f64,
    /// Accumulated gradient of the last backward root with respect to this node.
    pub grad: f64,
    /// The operation that produced this node.
    pub op: Op,
}

impl Node {
    pub(crate) fn new(scalar: f64, op: Op) -> Self {
        Node {
            scalar,
            grad: 0.0,
            op,
        }
    }
}

/// Arena of scalar nodes.
///
/// Every arithmetic method on [`Tape`] appends exactly one node. Nothing is
/// evaluated lazily: the forward value is computed when the node is recorded,
/// and gradients are only touched by [`Graph::backward`], [`Graph::zero_grad`]
/// and [`Graph::zero_grads`].
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    /// Bumped by every [`Graph::truncate`] that drops nodes.
    pub(crate) generation: u64,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Graph {
            nodes: Vec::with_capacity(capacity),
            generation: 0,
        }
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node.
    ///
    /// # Panics
    /// If `id` does not belong to this graph.
    pub fn node(&self, id: ValueId) -> &Node {
        &self.nodes[id.0]
    }

    /// Borrow a node, returning `None` for a handle past the end of the arena.
    pub fn get(&self, id: ValueId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn grad(&self, id: ValueId) -> f64 {
        self.nodes[id.0].grad
    }

    /// Overwrite the forward value of a node.
    ///
    /// Only meaningful for leaves: downstream nodes keep the scalar they were
    /// recorded with until the forward pass is rebuilt.
    pub fn set_scalar(&mut self, id: ValueId, scalar: f64) {
        self.nodes[id.0].scalar = scalar;
    }

    /// Reset the gradient of every listed node to zero.
    pub fn zero_grad(&mut self, ids: &[ValueId]) {
        for id in ids {
            self.nodes[id.0].grad = 0.0;
        }
    }

    /// Reset the gradient of every node in the arena.
    pub fn zero_grads(&mut self) {
        for node in &mut self.nodes {
            node.grad = 0.0;
        }
    }

    /// Drop every node created at or after position `len`.
    ///
    /// Handles to dropped nodes become invalid, and so do fragments forked
    /// before the call. Use with the value of [`Graph::len`] taken before
    /// building a throw-away forward pass.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.nodes.len() {
            return;
        }
        trace!(from = self.nodes.len(), to = len, "truncating graph");
        self.nodes.truncate(len);
        self.generation += 1;
    }

    /// Number of truncations that actually dropped nodes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a private recording that reads this graph but does not mutate it.
    pub fn fork(&self) -> Fragment<'_> {
        Fragment::new(self)
    }

    /// Append the nodes of a detached fragment and return the handle remapping
    /// for values the fragment produced.
    ///
    /// Fragments forked from the same base can be merged one after another;
    /// each is shifted past the nodes merged before it.
    pub fn merge(&mut self, fragment: Detached) -> Result<Remap, GraphError> {
        let base_len = fragment.base_len;
        if fragment.generation != self.generation {
            return Err(GraphError::TruncatedSinceFork {
                forked: fragment.generation,
                current: self.generation,
            });
        }
        if self.nodes.len() < base_len {
            return Err(GraphError::StaleFragment {
                base_len,
                graph_len: self.nodes.len(),
            });
        }
        let remap = Remap::new(base_len, self.nodes.len() - base_len);
        self.nodes.reserve(fragment.nodes.len());
        for node in fragment.nodes {
            self.nodes.push(Node {
                op: node.op.map_parents(|id| remap.apply(id)),
                ..node
            });
        }
        Ok(remap)
    }
}

impl Tape for Graph {
    fn scalar(&self, id: ValueId) -> f64 {
        self.nodes[id.0].scalar
    }

    fn record(&mut self, scalar: f64, op: Op) -> ValueId {
        let id = ValueId(self.nodes.len());
        self.nodes.push(Node::new(scalar, op));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parents_order() {
        let a = ValueId(0);
        let b = ValueId(1);
        assert_eq!(Op::Div(a, b).parents().collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(Op::Relu(b).parents().collect::<Vec<_>>(), vec![b]);
        assert_eq!(Op::Leaf.parents().count(), 0);
    }

    #[test]
    fn test_leaf_starts_with_zero_grad() {
        let mut g = Graph::new();
        let x = g.leaf(3.5);
        assert_eq!(g.scalar(x), 3.5);
        assert_eq!(g.grad(x), 0.0);
        assert!(g.node(x).op.is_leaf());
    }

    #[test]
    fn test_zero_grad_subset() {
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let y = g.leaf(3.0);
        let z = g.mul(x, y);
        g.backward(z);

        g.zero_grad(&[x]);
        assert_eq!(g.grad(x), 0.0);
        assert_eq!(g.grad(y), 2.0);

        g.zero_grads();
        assert_eq!(g.grad(y), 0.0);
        assert_eq!(g.grad(z), 0.0);
    }

    #[test]
    fn test_truncate_keeps_parameters() {
        let mut g = Graph::new();
        let w = g.leaf(1.5);
        let mark = g.len();
        let two = g.leaf(2.0);
        let _ = g.mul(w, two);
        assert_eq!(g.len(), 3);

        g.truncate(mark);
        assert_eq!(g.len(), 1);
        assert_eq!(g.scalar(w), 1.5);
        assert!(g.get(two).is_none());
        assert_eq!(g.generation(), 1);

        // Nothing to drop: the generation stays.
        g.truncate(5);
        assert_eq!(g.generation(), 1);
    }
}
