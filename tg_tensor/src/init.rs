//! Tensor initializers.
//!
//! Every initializer takes a `batched` flag. When it is set, `dims[0]` is the
//! batch count and each batch element of shape `dims[1..]` is built on its own
//! (so `range` restarts at zero for every element).

use rand::Rng;

use crate::error::{Result, TensorError};
use crate::exec::Executor;
use crate::layout::concat;
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Build a tensor with `fill`, either once or once per batch element.
fn build<F>(dims: &[usize], batched: bool, fill: F) -> Result<Tensor>
where
    F: Fn(&Shape) -> Result<Tensor> + Sync,
{
    let shape = Shape::from(dims);
    shape.validate()?;
    if !batched {
        return fill(&shape);
    }

    let (&count, element) = dims
        .split_first()
        .ok_or_else(|| TensorError::incompatible("init", "a batched tensor needs a batch axis"))?;
    let element = Shape::from(element);
    let parts = Executor::global().fan_out(count, |_| fill(&element)?.unsqueeze(0))?;
    Ok(concat(&parts, 0)?.with_batched(true))
}

pub fn full(dims: &[usize], value: f64, batched: bool) -> Result<Tensor> {
    build(dims, batched, |shape| {
        Tensor::new(vec![value; shape.numel()], shape.clone())
    })
}

pub fn zeros(dims: &[usize], batched: bool) -> Result<Tensor> {
    full(dims, 0.0, batched)
}

pub fn ones(dims: &[usize], batched: bool) -> Result<Tensor> {
    full(dims, 1.0, batched)
}

/// Values `0, 1, 2, ...` in row-major order.
pub fn range(dims: &[usize], batched: bool) -> Result<Tensor> {
    build(dims, batched, |shape| {
        Tensor::new((0..shape.numel()).map(|v| v as f64).collect(), shape.clone())
    })
}

/// Identity matrix; `dims` is `[n, n]`, or `[batch, n, n]` when batched.
pub fn identity(dims: &[usize], batched: bool) -> Result<Tensor> {
    build(dims, batched, |shape| match *shape.dims() {
        [n, m] if n == m => {
            let mut data = vec![0.0; n * n];
            for i in 0..n {
                data[i * n + i] = 1.0;
            }
            Tensor::new(data, shape.clone())
        }
        _ => Err(TensorError::incompatible(
            "identity",
            format!("expected a square matrix, got {shape}"),
        )),
    })
}

/// Values drawn uniformly from `[low, high)`.
///
/// Draws happen on the caller's thread in row-major order, so a seeded `rng`
/// gives the same tensor regardless of the executor.
pub fn random_uniform<R>(dims: &[usize], low: f64, high: f64, batched: bool, rng: &mut R) -> Result<Tensor>
where
    R: Rng,
{
    if !(low.is_finite() && high.is_finite() && (high - low).is_finite()) {
        return Err(TensorError::incompatible(
            "random_uniform",
            format!("range [{low}, {high}) must be finite with a finite width"),
        ));
    }
    if low >= high {
        return Err(TensorError::incompatible(
            "random_uniform",
            format!("empty range [{low}, {high})"),
        ));
    }
    let shape = Shape::from(dims);
    shape.validate()?;
    if batched && shape.is_scalar() {
        return Err(TensorError::incompatible("init", "a batched tensor needs a batch axis"));
    }
    let data = (0..shape.numel()).map(|_| rng.gen_range(low..high)).collect();
    Ok(Tensor::new(data, shape)?.with_batched(batched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_constant_initializers() {
        let z = zeros(&[2, 3], false).unwrap();
        assert!(z.data().iter().all(|&v| v == 0.0));
        assert!(!z.is_batched());

        let o = ones(&[2, 2, 2], true).unwrap();
        assert_eq!(o.batch_size(), Some(2));
        assert_eq!(o.sum_all().unwrap(), 8.0);

        let f = full(&[], 3.5, false).unwrap();
        assert_eq!(f.item(), Some(3.5));
    }

    #[test]
    fn test_batched_range_restarts_per_element() {
        let r = range(&[3, 2, 2], true).unwrap();
        assert_eq!(r.dims(), &[3, 2, 2]);
        assert_eq!(
            r.data(),
            &[0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0, 0.0, 1.0, 2.0, 3.0]
        );

        let flat = range(&[3, 2, 2], false).unwrap();
        assert_eq!(flat.data().last(), Some(&11.0));
    }

    #[test]
    fn test_identity() {
        let eye = identity(&[3, 3], false).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(eye.get(&[i, j]).unwrap(), expected);
            }
        }

        let batch = identity(&[2, 2, 2], true).unwrap();
        assert_eq!(batch.data(), &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);

        assert!(identity(&[2, 3], false).is_err());
    }

    #[test]
    fn test_random_uniform_bounds_and_seed() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = random_uniform(&[4, 5], -1.0, 1.0, false, &mut rng).unwrap();
        assert!(a.data().iter().all(|&v| (-1.0..1.0).contains(&v)));

        let mut rng = StdRng::seed_from_u64(7);
        let b = random_uniform(&[4, 5], -1.0, 1.0, false, &mut rng).unwrap();
        assert_eq!(a, b);

        assert!(random_uniform(&[2], 1.0, 1.0, false, &mut rng).is_err());
    }

    #[test]
    fn test_random_uniform_rejects_unsampleable_ranges() {
        let mut rng = StdRng::seed_from_u64(3);
        let bad = [
            (f64::NAN, 1.0),
            (0.0, f64::INFINITY),
            (f64::NEG_INFINITY, 0.0),
            // Finite bounds whose width overflows.
            (-f64::MAX, f64::MAX),
        ];
        for (low, high) in bad {
            assert!(
                matches!(
                    random_uniform(&[2], low, high, false, &mut rng),
                    Err(TensorError::ShapeIncompatible { op: "random_uniform", .. })
                ),
                "[{low}, {high}) accepted"
            );
        }
        assert!(random_uniform(&[2], -1e300, 1e300, false, &mut rng).is_ok());
    }

    #[test]
    fn test_invalid_shapes() {
        assert!(matches!(zeros(&[2, 0], false), Err(TensorError::InvalidShape(_))));
        assert!(zeros(&[], true).is_err());
    }
}
