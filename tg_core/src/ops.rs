//! Forward values and local gradient rules for each operation.
//!
//! The backward pass multiplies every local gradient by the output node's
//! gradient and adds the product to the matching parent (chain rule, one edge
//! at a time).

use crate::node::{Node, Op, ValueId};

/// Compute the forward value of `op`, reading operand scalars through `scalar`.
pub(crate) fn forward<F>(op: &Op, scalar: F) -> f64
where
    F: Fn(ValueId) -> f64,
{
    match *op {
        // Leaves carry their own value; record() is handed it directly.
        Op::Leaf => 0.0,
        Op::Add(a, b) => scalar(a) + scalar(b),
        Op::Sub(a, b) => scalar(a) - scalar(b),
        Op::Mul(a, b) => scalar(a) * scalar(b),
        Op::Div(a, b) => scalar(a) / scalar(b),
        Op::Neg(a) => -scalar(a),
        Op::Pow { base, exponent } => scalar(base).powf(exponent),
        Op::Exp(a) => scalar(a).exp(),
        Op::Log(a) => scalar(a).ln(),
        Op::Relu(a) => scalar(a).max(0.0),
        Op::Sigmoid(a) => 1.0 / (1.0 + (-scalar(a)).exp()),
        Op::Tanh(a) => scalar(a).tanh(),
    }
}

/// Local derivatives of a node with respect to its parents.
///
/// Returns up to two `(parent, d(out)/d(parent))` pairs. A `None` slot means
/// the edge contributes nothing (leaves, and ReLU with a non-positive input).
pub(crate) fn local_gradients(nodes: &[Node], out: &Node) -> [Option<(ValueId, f64)>; 2] {
    let val = |id: ValueId| nodes[id.0].scalar;

    match out.op {
        Op::Leaf => [None, None],

        // z = a + b: dz/da = 1, dz/db = 1
        Op::Add(a, b) => [Some((a, 1.0)), Some((b, 1.0))],

        // z = a - b: dz/da = 1, dz/db = -1
        Op::Sub(a, b) => [Some((a, 1.0)), Some((b, -1.0))],

        // z = a * b: dz/da = b, dz/db = a
        Op::Mul(a, b) => [Some((a, val(b))), Some((b, val(a)))],

        // z = a / b: dz/da = 1/b, dz/db = -a/b^2
        Op::Div(a, b) => {
            let (av, bv) = (val(a), val(b));
            [Some((a, 1.0 / bv)), Some((b, -av / (bv * bv)))]
        }

        Op::Neg(a) => [Some((a, -1.0)), None],

        // z = a^c: dz/da = c * a^(c-1)
        Op::Pow { base, exponent } => [Some((base, exponent * val(base).powf(exponent - 1.0))), None],

        // z = exp(a): dz/da = exp(a) = z
        Op::Exp(a) => [Some((a, out.scalar)), None],

        Op::Log(a) => [Some((a, 1.0 / val(a))), None],

        Op::Relu(a) => {
            if val(a) > 0.0 {
                [Some((a, 1.0)), None]
            } else {
                [None, None]
            }
        }

        // z = sigmoid(a): dz/da = z * (1 - z)
        Op::Sigmoid(a) => [Some((a, out.scalar * (1.0 - out.scalar))), None],

        // z = tanh(a): dz/da = 1 - z^2
        Op::Tanh(a) => [Some((a, 1.0 - out.scalar * out.scalar)), None],
    }
}
