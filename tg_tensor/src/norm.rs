//! Rescaling operations: L2 normalization and batch standardization.
//!
//! A tensor whose norm is zero has no direction; normalizing it returns zeros
//! rather than dividing by zero. Standardization likewise maps a feature with
//! zero spread across the batch to zero.

use std::cmp::Ordering;

use crate::error::{Result, TensorError};
use crate::exec::{Executor, Operation};
use crate::layout::concat;
use crate::reduce::{mean_axis, norm_all, std_axis};
use crate::tensor::Tensor;

fn unit(t: &Tensor, norm: f64) -> Result<Tensor> {
    let norm = if norm == 0.0 { 1.0 } else { norm };
    let data = t.data().iter().map(|x| x / norm).collect();
    Ok(Tensor::new(data, t.shape().clone())?.with_batched(t.is_batched()))
}

/// Divide `t` by its L2 norm.
pub fn normalize(exec: &Executor, t: &Tensor) -> Result<Tensor> {
    unit(t, norm_all(exec, t)?)
}

/// Divide every slice along `axis` by that slice's own L2 norm.
///
/// The axis is moved to the front, each slice is rescaled as its own job,
/// and the result is moved back.
pub fn normalize_axis(exec: &Executor, t: &Tensor, axis: usize) -> Result<Tensor> {
    t.shape().check_axis(axis)?;
    let ndim = t.ndim();
    let to_front: Vec<usize> = std::iter::once(axis)
        .chain((0..ndim).filter(|&i| i != axis))
        .collect();
    let back: Vec<usize> = (0..ndim)
        .map(|i| match i.cmp(&axis) {
            Ordering::Less => i + 1,
            Ordering::Equal => 0,
            Ordering::Greater => i,
        })
        .collect();

    let moved = t.permute(&to_front)?;
    let parts = exec.fan_out(moved.dims()[0], |k| {
        let slice = moved.select(0, k)?;
        let norm = slice.data().iter().map(|x| x * x).sum::<f64>().sqrt();
        unit(&slice, norm)?.unsqueeze(0)
    })?;

    Ok(concat(&parts, 0)?.permute(&back)?.with_batched(t.is_batched()))
}

/// Z-score every batch element against the batch: `(x[i] - mean) / std`,
/// where `mean` and `std` are taken over axis 0.
///
/// Positions whose standard deviation is zero become zero.
pub fn standardize(exec: &Executor, t: &Tensor) -> Result<Tensor> {
    if !t.is_batched() {
        return Err(TensorError::incompatible(
            "standardize",
            format!("expected a batched tensor, got unbatched {}", t.shape()),
        ));
    }
    let mean = mean_axis(exec, t, 0)?;
    let std = std_axis(exec, t, 0)?;

    let zscore = |inputs: &[&Tensor]| -> Result<Tensor> {
        let x = inputs[0];
        let data = x
            .data()
            .iter()
            .zip(mean.data())
            .zip(std.data())
            .map(|((&x, &m), &s)| if s == 0.0 { 0.0 } else { (x - m) / s })
            .collect();
        Tensor::new(data, x.shape().clone())
    };
    exec.run(&zscore, &[t])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Normalize;

impl Operation for Normalize {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        normalize(Executor::global(), inputs[0])
    }

    fn name(&self) -> &'static str {
        "normalize"
    }
}

/// Per-slice normalization; `axis` is relative to the input it receives.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeAxis {
    pub axis: usize,
}

impl Operation for NormalizeAxis {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        normalize_axis(Executor::global(), inputs[0], self.axis)
    }

    fn name(&self) -> &'static str {
        "normalize_axis"
    }
}

/// Batch standardization. The input must be marked batched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Standardize;

impl Operation for Standardize {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        standardize(Executor::global(), inputs[0])
    }

    fn name(&self) -> &'static str {
        "standardize"
    }
}

impl Tensor {
    /// Rescale the whole tensor to unit L2 norm.
    pub fn normalize(&self) -> Result<Tensor> {
        Normalize.execute(&[self])
    }

    /// Rescale every batch element to unit L2 norm independently.
    pub fn normalize_batched(&self) -> Result<Tensor> {
        Executor::global().run(&Normalize, &[self])
    }

    pub fn normalize_axis(&self, axis: usize) -> Result<Tensor> {
        NormalizeAxis { axis }.execute(&[self])
    }

    pub fn standardize(&self) -> Result<Tensor> {
        Standardize.execute(&[self])
    }
}
