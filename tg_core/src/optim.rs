//! Gradient-descent update over parameter nodes.

use std::collections::HashMap;

use tracing::debug;

use crate::node::{Graph, ValueId};

/// SGD optimizer with optional momentum.
///
/// Updates are applied to the scalars of parameter nodes in place, so the
/// same handles stay valid across training iterations.
#[derive(Debug, Clone)]
pub struct Sgd {
    /// Learning rate.
    pub lr: f64,
    /// Momentum coefficient. Zero disables velocity tracking.
    pub momentum: f64,
    /// Velocity per parameter node.
    velocities: HashMap<ValueId, f64>,
}

impl Sgd {
    pub fn new(lr: f64) -> Self {
        Sgd {
            lr,
            momentum: 0.0,
            velocities: HashMap::new(),
        }
    }

    pub fn with_momentum(lr: f64, momentum: f64) -> Self {
        Sgd {
            lr,
            momentum,
            velocities: HashMap::new(),
        }
    }

    /// Move every parameter against its accumulated gradient.
    pub fn step(&mut self, graph: &mut Graph, params: &[ValueId]) {
        for &id in params {
            let grad = graph.grad(id);
            let update = if self.momentum > 0.0 {
                // v = momentum * v + grad; param -= lr * v
                let velocity = self.velocities.entry(id).or_insert(0.0);
                *velocity = self.momentum * *velocity + grad;
                *velocity
            } else {
                grad
            };
            let node = &mut graph.nodes[id.0];
            node.scalar -= self.lr * update;
        }
        debug!(params = params.len(), lr = self.lr, "sgd step");
    }

    /// Reset the gradients of `params` before the next forward pass.
    pub fn zero_grad(&self, graph: &mut Graph, params: &[ValueId]) {
        graph.zero_grad(params);
    }

    /// Forget accumulated velocities.
    pub fn reset(&mut self) {
        self.velocities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Tape;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_sgd_step() {
        let mut g = Graph::new();
        let params: Vec<_> = [1.0, 2.0, 3.0].iter().map(|&v| g.leaf(v)).collect();
        for (&p, grad) in params.iter().zip([0.1, 0.2, 0.3]) {
            g.nodes[p.0].grad = grad;
        }

        let mut opt = Sgd::new(0.1);
        opt.step(&mut g, &params);

        // param = param - 0.1 * grad
        let expected = [0.99, 1.98, 2.97];
        for (&p, e) in params.iter().zip(expected) {
            assert_abs_diff_eq!(g.scalar(p), e, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sgd_with_momentum() {
        let mut g = Graph::new();
        let w = g.leaf(1.0);
        let mut opt = Sgd::with_momentum(0.1, 0.9);

        // First step: v = 1, w = 1 - 0.1 = 0.9
        g.nodes[w.0].grad = 1.0;
        opt.step(&mut g, &[w]);
        assert_abs_diff_eq!(g.scalar(w), 0.9, epsilon = 1e-12);

        // Second step: v = 0.9 + 1 = 1.9, w = 0.9 - 0.19 = 0.71
        opt.step(&mut g, &[w]);
        assert_abs_diff_eq!(g.scalar(w), 0.71, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_grad_then_step_is_noop() {
        let mut g = Graph::new();
        let w = g.leaf(4.0);
        let loss = g.mul(w, w);
        g.backward(loss);

        let mut opt = Sgd::new(0.5);
        opt.zero_grad(&mut g, &[w]);
        opt.step(&mut g, &[w]);
        assert_eq!(g.scalar(w), 4.0);
    }

    #[test]
    fn test_descends_quadratic() {
        // minimise (w - 3)^2
        let mut g = Graph::new();
        let w = g.leaf(0.0);
        let three = g.leaf(3.0);
        let mark = g.len();
        let mut opt = Sgd::new(0.1);

        for _ in 0..100 {
            opt.zero_grad(&mut g, &[w]);
            let diff = g.sub(w, three);
            let loss = g.powf(diff, 2.0);
            g.backward(loss);
            opt.step(&mut g, &[w]);
            g.truncate(mark);
        }

        assert_abs_diff_eq!(g.scalar(w), 3.0, epsilon = 1e-6);
        assert_eq!(g.len(), mark);
    }
}
