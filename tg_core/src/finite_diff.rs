//! Finite difference utilities for gradient verification.
//!
//! Provides numerical gradients for checking the backward pass against the
//! forward values recorded in a [`Graph`].

use crate::node::{Graph, ValueId};
use crate::Tape;

/// Compute gradients using central finite differences.
///
/// # Arguments
/// * `f` - Function that takes a slice of variable values and returns a scalar
/// * `point` - The point at which to compute gradients
/// * `eps` - Step size for finite differences (typically 1e-7 to 1e-5)
///
/// # Example
/// ```
/// use tg_core::finite_diff_grad;
///
/// // f(x, y) = x^2 + y^2
/// let f = |v: &[f64]| v[0] * v[0] + v[1] * v[1];
/// let grads = finite_diff_grad(f, &[3.0, 4.0], 1e-7);
///
/// assert!((grads[0] - 6.0).abs() < 1e-5);
/// assert!((grads[1] - 8.0).abs() < 1e-5);
/// ```
pub fn finite_diff_grad<F>(f: F, point: &[f64], eps: f64) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut perturbed = point.to_vec();

    (0..point.len())
        .map(|i| {
            // Central difference: (f(x + eps) - f(x - eps)) / (2 * eps)
            perturbed[i] = point[i] + eps;
            let f_plus = f(&perturbed);
            perturbed[i] = point[i] - eps;
            let f_minus = f(&perturbed);
            perturbed[i] = point[i];
            (f_plus - f_minus) / (2.0 * eps)
        })
        .collect()
}

/// Build a graph with `build` at `point`, run backward from its output and
/// return `(autodiff, numeric)` gradients with respect to the input leaves.
///
/// `build` receives a fresh graph and one leaf per coordinate of `point`.
/// The numeric side rebuilds the graph for every perturbation.
pub fn check_gradients<F>(build: F, point: &[f64], eps: f64) -> (Vec<f64>, Vec<f64>)
where
    F: Fn(&mut Graph, &[ValueId]) -> ValueId,
{
    let evaluate = |values: &[f64]| {
        let mut g = Graph::new();
        let inputs: Vec<_> = values.iter().map(|&v| g.leaf(v)).collect();
        let out = build(&mut g, &inputs);
        (g, inputs, out)
    };

    let (mut g, inputs, out) = evaluate(point);
    g.backward(out);
    let analytic = inputs.iter().map(|&id| g.grad(id)).collect();

    let numeric = finite_diff_grad(
        |values| {
            let (g, _, out) = evaluate(values);
            g.scalar(out)
        },
        point,
        eps,
    );

    (analytic, numeric)
}

/// Compute the maximum absolute difference between two gradient vectors.
///
/// # Panics
/// If the vectors differ in length.
pub fn max_grad_error(grad1: &[f64], grad2: &[f64]) -> f64 {
    assert_eq!(grad1.len(), grad2.len());
    grad1
        .iter()
        .zip(grad2)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max)
}
