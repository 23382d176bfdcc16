//! End-to-end training tests.
//!
//! Parameters live as leaves at the front of a [`Graph`]; every iteration
//! records a throw-away forward pass on top of them, runs backward, applies an
//! SGD step and truncates the graph back to the parameters.

use approx::assert_abs_diff_eq;
use tg_core::{Graph, Sgd, Tape};
use tg_tensor::grad::{self, AddGrad, MatMulGrad};
use tg_tensor::prelude::*;

// ============================================================================
// Test Utilities
// ============================================================================

fn pool(workers: usize) -> Executor {
    Executor::new(&ExecutorConfig::new().workers(workers)).unwrap()
}

/// Column inputs `[4, 2, 1]` and targets of `y = 2 * x0 - 3 * x1`.
fn regression_data() -> (Tensor, Tensor) {
    let xs = Tensor::new(
        vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0],
        vec![4, 2, 1],
    )
    .unwrap()
    .with_batched(true);
    let ys = Tensor::new(vec![2.0, -3.0, -1.0, 1.0], vec![4, 1, 1])
        .unwrap()
        .with_batched(true);
    (xs, ys)
}

fn assert_close(actual: &[f64], expected: &[f64], tol: f64, name: &str) {
    assert_eq!(actual.len(), expected.len(), "{name}: length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() < tol,
            "{name}[{i}]: expected {e}, got {a} (diff {})",
            (a - e).abs()
        );
    }
}

// ============================================================================
// Training loop
// ============================================================================

#[test]
fn test_linear_regression_converges() {
    let exec = pool(3);
    let (xs, ys) = regression_data();

    let mut g = Graph::new();
    let mut w = grad::track(&mut g, &Tensor::new(vec![0.0, 0.0], vec![1, 2]).unwrap());
    let params = w.grad_ids().unwrap().to_vec();
    let base = g.len();
    let mut sgd = Sgd::new(0.1);

    let predict = |tape: &mut dyn Tape, inputs: &[&Tensor]| -> Result<Tensor> {
        grad::matmul(tape, &w, inputs[0])
    };

    let mut first_loss = None;
    let mut last_loss = f64::INFINITY;
    for _ in 0..300 {
        sgd.zero_grad(&mut g, &params);

        let pred = exec.run_tracked(&mut g, &predict, &[&xs]).unwrap();
        let residual = grad::sub(&mut g, &pred, &ys).unwrap();
        let squared = grad::mul(&mut g, &residual, &residual).unwrap();
        let loss = grad::mean(&mut g, &squared).unwrap();

        last_loss = loss.item().unwrap();
        first_loss.get_or_insert(last_loss);
        g.backward(loss.grad_ids().unwrap()[0]);
        sgd.step(&mut g, &params);
        g.truncate(base);
    }
    w.sync_from(&g);

    // Mean of [4, 9, 1, 1]
    assert_eq!(first_loss, Some(3.75));
    assert!(last_loss < 1e-8, "loss did not converge: {last_loss}");
    assert_close(w.data(), &[2.0, -3.0], 1e-4, "w");
    assert_eq!(g.len(), base);
}

#[test]
fn test_momentum_training_on_plain_graph() {
    // Same problem, recorded directly on the graph without batching.
    let (xs, ys) = regression_data();
    let mut g = Graph::new();
    let mut w = grad::track(&mut g, &Tensor::new(vec![0.5, 0.5], vec![1, 2]).unwrap());
    let params = w.grad_ids().unwrap().to_vec();
    let base = g.len();
    let mut sgd = Sgd::with_momentum(0.05, 0.9);

    for _ in 0..400 {
        sgd.zero_grad(&mut g, &params);
        let mut terms = Vec::new();
        for i in 0..4 {
            let x = xs.select(0, i).unwrap();
            let y = ys.select(0, i).unwrap();
            let pred = grad::matmul(&mut g, &w, &x).unwrap();
            let residual = grad::sub(&mut g, &pred, &y).unwrap();
            terms.push(grad::mul(&mut g, &residual, &residual).unwrap());
        }
        let total = terms
            .iter()
            .skip(1)
            .try_fold(terms[0].clone(), |acc, t| grad::add(&mut g, &acc, t))
            .unwrap();
        let loss = grad::sum(&mut g, &total).unwrap();
        g.backward(loss.grad_ids().unwrap()[0]);
        sgd.step(&mut g, &params);
        g.truncate(base);
    }
    w.sync_from(&g);

    assert_abs_diff_eq!(w.data()[0], 2.0, epsilon = 1e-4);
    assert_abs_diff_eq!(w.data()[1], -3.0, epsilon = 1e-4);
}

// ============================================================================
// Tracked batching
// ============================================================================

#[test]
fn test_run_tracked_matches_sequential_recording() {
    let a = init::range(&[3, 2, 2], true).unwrap();
    let b = init::identity(&[3, 2, 2], true).unwrap();

    let mut batched = Graph::new();
    let out = pool(3).run_tracked(&mut batched, &MatMulGrad, &[&a, &b]).unwrap();

    let mut sequential = Graph::new();
    let mut ids = Vec::new();
    let mut data = Vec::new();
    for i in 0..3 {
        let ai = a.select(0, i).unwrap();
        let bi = b.select(0, i).unwrap();
        let part = grad::matmul(&mut sequential, &ai, &bi).unwrap();
        ids.extend_from_slice(part.grad_ids().unwrap());
        data.extend_from_slice(part.data());
    }

    assert_eq!(out.dims(), &[3, 2, 2]);
    assert!(out.is_batched());
    assert_eq!(out.data(), data.as_slice());
    assert_eq!(out.grad_ids().unwrap(), ids.as_slice());
    assert_eq!(batched.len(), sequential.len());
}

#[test]
fn test_run_tracked_ids_do_not_depend_on_workers() {
    let a = init::range(&[8, 2, 3], true).unwrap();
    let b = init::ones(&[8, 2, 3], true).unwrap();

    let record = |workers: usize| {
        let mut g = Graph::new();
        let out = pool(workers).run_tracked(&mut g, &AddGrad, &[&a, &b]).unwrap();
        (g.len(), out)
    };

    let (len1, single) = record(1);
    let (len4, many) = record(4);
    assert_eq!(len1, len4);
    assert_eq!(single.grad_ids(), many.grad_ids());
    assert_eq!(single.data(), many.data());
}

#[test]
fn test_batched_gradients_equal_unbatched() {
    // d sum(W @ x_i) / dW accumulated over a batch equals the gradient of the
    // unrolled loop.
    let (xs, _) = regression_data();
    let w0 = Tensor::new(vec![0.3, -0.7], vec![1, 2]).unwrap();

    let mut g1 = Graph::new();
    let w1 = grad::track(&mut g1, &w0);
    let forward = |tape: &mut dyn Tape, inputs: &[&Tensor]| -> Result<Tensor> {
        grad::matmul(tape, &w1, inputs[0])
    };
    let out = pool(2).run_tracked(&mut g1, &forward, &[&xs]).unwrap();
    let loss = grad::sum(&mut g1, &out).unwrap();
    g1.backward(loss.grad_ids().unwrap()[0]);

    let mut g2 = Graph::new();
    let w2 = grad::track(&mut g2, &w0);
    let mut total: Option<Tensor> = None;
    for i in 0..4 {
        let part = grad::matmul(&mut g2, &w2, &xs.select(0, i).unwrap()).unwrap();
        total = Some(match total {
            Some(acc) => grad::add(&mut g2, &acc, &part).unwrap(),
            None => part,
        });
    }
    let loss2 = grad::sum(&mut g2, &total.unwrap()).unwrap();
    g2.backward(loss2.grad_ids().unwrap()[0]);

    assert_eq!(loss.item(), loss2.item());
    // Column sums of the inputs: x0 totals 4, x1 totals 3.
    let grads = w1.grad_values(&g1).unwrap();
    assert_close(grads.data(), &[4.0, 3.0], 1e-12, "dW");
    assert_close(grads.data(), w2.grad_values(&g2).unwrap().data(), 1e-12, "dW parity");
}

#[test]
fn test_failed_tracked_batch_leaves_graph_untouched() {
    let a = init::range(&[4, 2], true).unwrap();
    let mut g = Graph::new();
    g.leaf(1.0);

    let flaky = |tape: &mut dyn Tape, inputs: &[&Tensor]| -> Result<Tensor> {
        let out = grad::map(tape, inputs[0], UnaryKind::Exp)?;
        if inputs[0].get(&[0])? > 1.0 {
            return inputs[0].select(0, 9);
        }
        Ok(out)
    };

    // Batched range restarts per element, so every element is [0, 1].
    assert!(pool(2).run_tracked(&mut g, &flaky, &[&a]).is_ok());
    assert_eq!(g.len(), 1 + 4 * 4);

    let plain = init::range(&[4, 2], false).unwrap();
    let before = g.len();
    let err = pool(2).run_tracked(&mut g, &flaky, &[&plain]).unwrap_err();
    assert_eq!(err.failed_indices(), vec![1, 2, 3]);
    assert_eq!(g.len(), before);
}
