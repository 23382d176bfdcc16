//! # tg_core - Scalar Reverse-mode Automatic Differentiation
//!
//! This crate records scalar computations into an arena-backed graph and
//! computes gradients via reverse accumulation (backpropagation).
//!
//! ## Quick Start
//!
//! ```
//! use tg_core::{Graph, Tape};
//!
//! let mut g = Graph::new();
//! let x = g.leaf(2.0);
//! let y = g.leaf(3.0);
//!
//! // z = x * y + exp(x)
//! let xy = g.mul(x, y);
//! let ex = g.exp(x);
//! let z = g.add(xy, ex);
//! assert!((g.scalar(z) - (6.0 + 2.0_f64.exp())).abs() < 1e-10);
//!
//! g.backward(z);
//! // dz/dx = y + exp(x), dz/dy = x
//! assert!((g.grad(x) - (3.0 + 2.0_f64.exp())).abs() < 1e-10);
//! assert!((g.grad(y) - 2.0).abs() < 1e-10);
//! ```
//!
//! ## Supported Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Arithmetic | [`Tape::add`], [`Tape::sub`], [`Tape::mul`], [`Tape::div`], [`Tape::neg`] |
//! | Power | [`Tape::powf`] (x^c for constant c) |
//! | Transcendental | [`Tape::exp`], [`Tape::log`], [`Tape::tanh`] |
//! | Activations | [`Tape::relu`], [`Tape::sigmoid`] |
//!
//! ## Architecture
//!
//! - **[`Graph`]**: arena of [`Node`]s addressed by [`ValueId`]. Nodes only
//!   reference earlier nodes, so the graph is acyclic.
//! - **[`Fragment`]**: a private recording on top of a shared `&Graph`, used by
//!   concurrent workers and merged back with [`Graph::merge`].
//! - **[`Graph::backward`]**: seeds the root with 1 and accumulates into every
//!   reachable node. Gradients persist until [`Graph::zero_grad`].
//! - **[`Sgd`]**: in-place parameter updates.

mod backward;
mod error;
mod finite_diff;
mod node;
mod ops;
mod optim;
mod tape;

pub use backward::topological_order;
pub use error::GraphError;
pub use finite_diff::{check_gradients, finite_diff_grad, max_grad_error};
pub use node::{Graph, Node, Op, ValueId};
pub use optim::Sgd;
pub use tape::{Detached, Fragment, Remap, Tape};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_arithmetic() {
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let y = g.leaf(3.0);

        let sum = g.add(x, y);
        assert!((g.scalar(sum) - 5.0).abs() < 1e-10);

        let diff = g.sub(x, y);
        assert!((g.scalar(diff) - (-1.0)).abs() < 1e-10);

        let prod = g.mul(x, y);
        assert!((g.scalar(prod) - 6.0).abs() < 1e-10);

        let quot = g.div(x, y);
        assert!((g.scalar(quot) - (2.0 / 3.0)).abs() < 1e-10);

        let neg = g.neg(x);
        assert!((g.scalar(neg) - (-2.0)).abs() < 1e-10);
    }

    #[test]
    fn test_transcendental_functions() {
        let mut g = Graph::new();
        let x = g.leaf(1.0);

        let e = g.exp(x);
        let l = g.log(x);
        let t = g.tanh(x);
        let s = g.sigmoid(x);
        assert!((g.scalar(e) - 1.0_f64.exp()).abs() < 1e-10);
        assert!((g.scalar(l) - 0.0).abs() < 1e-10);
        assert!((g.scalar(t) - 1.0_f64.tanh()).abs() < 1e-10);
        assert!((g.scalar(s) - 1.0 / (1.0 + (-1.0_f64).exp())).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_add() {
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let y = g.leaf(3.0);
        let z = g.add(x, y);

        g.backward(z);
        assert!((g.grad(x) - 1.0).abs() < 1e-10);
        assert!((g.grad(y) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_mul() {
        // dz/dx = y, dz/dy = x
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let y = g.leaf(3.0);
        let z = g.mul(x, y);

        g.backward(z);
        assert!((g.grad(x) - 3.0).abs() < 1e-10);
        assert!((g.grad(y) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_div() {
        // dz/dx = 1/y, dz/dy = -x/y^2
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let y = g.leaf(4.0);
        let z = g.div(x, y);

        g.backward(z);
        assert!((g.grad(x) - 0.25).abs() < 1e-10);
        assert!((g.grad(y) - (-2.0 / 16.0)).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_exp() {
        let mut g = Graph::new();
        let x = g.leaf(1.0);
        let z = g.exp(x);

        g.backward(z);
        assert!((g.grad(x) - 1.0_f64.exp()).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_relu() {
        let mut g = Graph::new();
        let pos = g.leaf(1.5);
        let neg = g.leaf(-1.5);
        let zero = g.leaf(0.0);
        let a = g.relu(pos);
        let b = g.relu(neg);
        let c = g.relu(zero);
        let ab = g.add(a, b);
        let z = g.add(ab, c);

        g.backward(z);
        assert_eq!(g.grad(pos), 1.0);
        assert_eq!(g.grad(neg), 0.0);
        assert_eq!(g.grad(zero), 0.0);
    }

    #[test]
    fn test_gradient_sigmoid() {
        let mut g = Graph::new();
        let x = g.leaf(0.0);
        let z = g.sigmoid(x);

        g.backward(z);
        // sigmoid(0) = 0.5, derivative 0.25
        assert!((g.grad(x) - 0.25).abs() < 1e-10);
    }

    #[test]
    fn test_gradient_powf_and_log() {
        let mut g = Graph::new();
        let x = g.leaf(2.0);
        let cube = g.powf(x, 3.0);
        let ln = g.log(x);
        let z = g.add(cube, ln);

        g.backward(z);
        // 3x^2 + 1/x
        assert!((g.grad(x) - 12.5).abs() < 1e-10);
    }

    #[test]
    fn test_leaf_backward_is_noop() {
        let mut g = Graph::new();
        let x = g.leaf(7.0);
        let other = g.leaf(1.0);

        g.backward(x);
        assert_eq!(g.grad(x), 1.0);
        assert_eq!(g.grad(other), 0.0);
    }

    #[test]
    fn test_reused_variable() {
        // z = x * x, dz/dx = 2x
        let mut g = Graph::new();
        let x = g.leaf(3.0);
        let z = g.mul(x, x);

        g.backward(z);
        assert!((g.grad(x) - 6.0).abs() < 1e-10);
    }

    #[test]
    fn test_diamond_graph() {
        // z = (x + y) * (x - y) = x^2 - y^2
        let mut g = Graph::new();
        let x = g.leaf(3.0);
        let y = g.leaf(2.0);
        let a = g.add(x, y);
        let b = g.sub(x, y);
        let z = g.mul(a, b);

        g.backward(z);
        assert!((g.grad(x) - 6.0).abs() < 1e-10);
        assert!((g.grad(y) - (-4.0)).abs() < 1e-10);
    }

    #[test]
    fn test_sanity_scenario() {
        // x = -4
        // z = 2x + 2 + x
        // q = relu(z) + z*x
        // h = relu(z*z)
        // y = h + q + q*x
        let mut g = Graph::new();
        let x = g.leaf(-4.0);
        let two = g.leaf(2.0);

        let two_x = g.mul(two, x);
        let z = g.add(two_x, two);
        let z = g.add(z, x);

        let rz = g.relu(z);
        let zx = g.mul(z, x);
        let q = g.add(rz, zx);

        let zz = g.mul(z, z);
        let h = g.relu(zz);

        let hq = g.add(h, q);
        let qx = g.mul(q, x);
        let y = g.add(hq, qx);

        assert!((g.scalar(y) - (-20.0)).abs() < 1e-10);
        g.backward(y);
        assert!((g.grad(x) - 46.0).abs() < 1e-10);
    }

    #[test]
    fn test_finite_diff_random_graph() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let x_val: f64 = rng.gen_range(-2.0..2.0);
        // positive for log
        let y_val: f64 = rng.gen_range(0.5..2.0);

        // exp(x) * log(y) + tanh(x * y)
        let build = |g: &mut Graph, v: &[ValueId]| {
            let ex = g.exp(v[0]);
            let ly = g.log(v[1]);
            let prod = g.mul(ex, ly);
            let xy = g.mul(v[0], v[1]);
            let t = g.tanh(xy);
            g.add(prod, t)
        };

        let (analytic, numeric) = check_gradients(build, &[x_val, y_val], 1e-7);
        assert!(
            max_grad_error(&analytic, &numeric) < 1e-5,
            "autodiff={analytic:?}, fd={numeric:?}"
        );
    }
}
