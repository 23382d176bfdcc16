//! Whole-tensor and axis-collapsing reductions.
//!
//! Both kinds split the work with [`Executor::fan_out`] and combine partial
//! results in job order, so a reduction returns the same bits on every run
//! with a given pool.
//!
//! Variance is the population variance (divide by `N`).

use crate::error::{Result, TensorError};
use crate::exec::{Executor, Operation};
use crate::tensor::Tensor;

/// Below this many elements per chunk a whole-tensor reduction stays on one job.
const MIN_CHUNK: usize = 1024;

/// Split `0..len` into contiguous ranges, one per job.
fn chunks(exec: &Executor, len: usize) -> (usize, usize) {
    let jobs = (len / MIN_CHUNK).clamp(1, exec.workers().max(1));
    let chunk = len.div_ceil(jobs);
    (jobs, chunk)
}

fn chunked_sum<F>(exec: &Executor, data: &[f64], term: F) -> Result<f64>
where
    F: Fn(f64) -> f64 + Sync,
{
    let (jobs, chunk) = chunks(exec, data.len());
    let partials = exec.fan_out(jobs, |c| {
        let start = (c * chunk).min(data.len());
        let end = ((c + 1) * chunk).min(data.len());
        Ok(data[start..end].iter().map(|&x| term(x)).sum::<f64>())
    })?;
    Ok(partials.into_iter().sum())
}

pub fn sum_all(exec: &Executor, t: &Tensor) -> Result<f64> {
    chunked_sum(exec, t.data(), |x| x)
}

pub fn mean_all(exec: &Executor, t: &Tensor) -> Result<f64> {
    Ok(sum_all(exec, t)? / t.numel() as f64)
}

pub fn var_all(exec: &Executor, t: &Tensor) -> Result<f64> {
    let mean = mean_all(exec, t)?;
    Ok(chunked_sum(exec, t.data(), |x| (x - mean) * (x - mean))? / t.numel() as f64)
}

pub fn std_all(exec: &Executor, t: &Tensor) -> Result<f64> {
    Ok(var_all(exec, t)?.sqrt())
}

/// Euclidean (L2) norm of every element taken together.
pub fn norm_all(exec: &Executor, t: &Tensor) -> Result<f64> {
    Ok(chunked_sum(exec, t.data(), |x| x * x)?.sqrt())
}

/// Sum `term(slice)` over every slice along `axis`, one job per slice.
fn collapse<F>(exec: &Executor, t: &Tensor, axis: usize, term: F) -> Result<Tensor>
where
    F: Fn(usize, f64) -> f64 + Sync,
{
    t.shape().check_axis(axis)?;
    let extent = t.dims()[axis];

    let partials = exec.fan_out(extent, |k| {
        let slice = t.select(axis, k)?;
        Ok(slice
            .data()
            .iter()
            .enumerate()
            .map(|(i, &x)| term(i, x))
            .collect::<Vec<_>>())
    })?;

    let mut acc = vec![0.0; t.numel() / extent];
    for partial in partials {
        for (a, p) in acc.iter_mut().zip(partial) {
            *a += p;
        }
    }

    Ok(Tensor::new(acc, t.shape().without_axis(axis))?.with_batched(t.is_batched() && axis != 0))
}

fn divide(t: Tensor, n: usize) -> Result<Tensor> {
    t.scale(1.0 / n as f64)
        .map(|out| out.with_batched(t.is_batched()))
}

pub fn sum_axis(exec: &Executor, t: &Tensor, axis: usize) -> Result<Tensor> {
    collapse(exec, t, axis, |_, x| x)
}

pub fn mean_axis(exec: &Executor, t: &Tensor, axis: usize) -> Result<Tensor> {
    let summed = sum_axis(exec, t, axis)?;
    divide(summed, t.dims()[axis])
}

pub fn var_axis(exec: &Executor, t: &Tensor, axis: usize) -> Result<Tensor> {
    let mean = mean_axis(exec, t, axis)?;
    let m = mean.data();
    let squared = collapse(exec, t, axis, |i, x| (x - m[i]) * (x - m[i]))?;
    divide(squared, t.dims()[axis])
}

pub fn std_axis(exec: &Executor, t: &Tensor, axis: usize) -> Result<Tensor> {
    let var = var_axis(exec, t, axis)?;
    let data = var.data().iter().map(|v| v.sqrt()).collect();
    Ok(Tensor::new(data, var.shape().clone())?.with_batched(var.is_batched()))
}

impl Tensor {
    pub fn sum_all(&self) -> Result<f64> {
        sum_all(Executor::global(), self)
    }

    pub fn mean_all(&self) -> Result<f64> {
        mean_all(Executor::global(), self)
    }

    pub fn var_all(&self) -> Result<f64> {
        var_all(Executor::global(), self)
    }

    pub fn std_all(&self) -> Result<f64> {
        std_all(Executor::global(), self)
    }

    pub fn norm_all(&self) -> Result<f64> {
        norm_all(Executor::global(), self)
    }

    /// Collapse `axis` by summation.
    pub fn sum_axis(&self, axis: usize) -> Result<Tensor> {
        sum_axis(Executor::global(), self, axis)
    }

    pub fn mean_axis(&self, axis: usize) -> Result<Tensor> {
        mean_axis(Executor::global(), self, axis)
    }

    pub fn var_axis(&self, axis: usize) -> Result<Tensor> {
        var_axis(Executor::global(), self, axis)
    }

    pub fn std_axis(&self, axis: usize) -> Result<Tensor> {
        std_axis(Executor::global(), self, axis)
    }
}

/// Batched form of the axis reductions: `axis` is relative to each batch
/// element, so `SumAxis { axis: 0 }` run over a `(B, R, C)` tensor sums the
/// `R` rows of every element and yields `(B, C)`.
macro_rules! axis_operation {
    ($(#[$doc:meta])* $name:ident, $func:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name {
            pub axis: usize,
        }

        impl Operation for $name {
            fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
                TensorError::check_arity(inputs, 1, "1")?;
                $func(Executor::global(), inputs[0], self.axis)
            }

            fn name(&self) -> &'static str {
                $label
            }
        }
    };
}

axis_operation!(SumAxis, sum_axis, "sum_axis");
axis_operation!(MeanAxis, mean_axis, "mean_axis");
axis_operation!(
    /// Population variance along an axis.
    VarAxis,
    var_axis,
    "var_axis"
);
axis_operation!(StdAxis, std_axis, "std_axis");
