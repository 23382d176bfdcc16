//! Recording interface shared by [`Graph`] and [`Fragment`].
//!
//! A [`Fragment`] lets several threads record nodes at once: each worker reads
//! existing scalars through a shared `&Graph` and appends new nodes to its own
//! buffer. Detached fragments are merged back with [`Graph::merge`], which
//! shifts fragment-local handles past the nodes merged before them.

use crate::node::{Graph, Node, Op, ValueId};
use crate::ops::forward;

/// Something nodes can be recorded into.
///
/// Every arithmetic method appends one node whose scalar is the forward value
/// and returns its handle.
pub trait Tape {
    /// Forward value of an existing node.
    fn scalar(&self, id: ValueId) -> f64;

    /// Append a node with a precomputed forward value.
    fn record(&mut self, scalar: f64, op: Op) -> ValueId;

    /// Create an input or parameter.
    fn leaf(&mut self, scalar: f64) -> ValueId {
        self.record(scalar, Op::Leaf)
    }

    /// Evaluate `op` on existing nodes and record the result.
    fn apply(&mut self, op: Op) -> ValueId {
        let scalar = forward(&op, |id| self.scalar(id));
        self.record(scalar, op)
    }

    fn add(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.apply(Op::Add(a, b))
    }

    fn sub(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.apply(Op::Sub(a, b))
    }

    fn mul(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.apply(Op::Mul(a, b))
    }

    fn div(&mut self, a: ValueId, b: ValueId) -> ValueId {
        self.apply(Op::Div(a, b))
    }

    fn neg(&mut self, a: ValueId) -> ValueId {
        self.apply(Op::Neg(a))
    }

    fn powf(&mut self, base: ValueId, exponent: f64) -> ValueId {
        self.apply(Op::Pow { base, exponent })
    }

    fn exp(&mut self, a: ValueId) -> ValueId {
        self.apply(Op::Exp(a))
    }

    fn log(&mut self, a: ValueId) -> ValueId {
        self.apply(Op::Log(a))
    }

    fn relu(&mut self, a: ValueId) -> ValueId {
        self.apply(Op::Relu(a))
    }

    fn sigmoid(&mut self, a: ValueId) -> ValueId {
        self.apply(Op::Sigmoid(a))
    }

    fn tanh(&mut self, a: ValueId) -> ValueId {
        self.apply(Op::Tanh(a))
    }
}

/// A private recording on top of a frozen base graph.
#[derive(Debug)]
pub struct Fragment<'g> {
    base: &'g Graph,
    nodes: Vec<Node>,
}

impl<'g> Fragment<'g> {
    pub(crate) fn new(base: &'g Graph) -> Self {
        Fragment {
            base,
            nodes: Vec::new(),
        }
    }

    /// Number of nodes recorded so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Release the borrow of the base graph so the fragment can be sent back
    /// to the thread that owns the graph.
    pub fn detach(self) -> Detached {
        Detached {
            base_len: self.base.len(),
            generation: self.base.generation,
            nodes: self.nodes,
        }
    }
}

impl Tape for Fragment<'_> {
    fn scalar(&self, id: ValueId) -> f64 {
        let base_len = self.base.len();
        if id.0 < base_len {
            self.base.nodes[id.0].scalar
        } else {
            self.nodes[id.0 - base_len].scalar
        }
    }

    fn record(&mut self, scalar: f64, op: Op) -> ValueId {
        let id = ValueId(self.base.len() + self.nodes.len());
        self.nodes.push(Node::new(scalar, op));
        id
    }
}

/// Nodes recorded by a [`Fragment`], ready for [`Graph::merge`].
#[derive(Debug, Clone)]
pub struct Detached {
    pub(crate) base_len: usize,
    pub(crate) generation: u64,
    pub(crate) nodes: Vec<Node>,
}

impl Detached {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Translation from fragment-local handles to merged arena handles.
///
/// Handles below the fragment's base length refer to pre-existing nodes and
/// are left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remap {
    base_len: usize,
    shift: usize,
}

impl Remap {
    pub(crate) fn new(base_len: usize, shift: usize) -> Self {
        Remap { base_len, shift }
    }

    pub fn apply(&self, id: ValueId) -> ValueId {
        if id.0 < self.base_len {
            id
        } else {
            ValueId(id.0 + self.shift)
        }
    }

    /// True when merging moved no handles.
    pub fn is_identity(&self) -> bool {
        self.shift == 0
    }
}
