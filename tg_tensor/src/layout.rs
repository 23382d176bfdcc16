//! Axis manipulation: select, unsqueeze, concat and permute.
//!
//! Every operation copies into a fresh contiguous buffer and moves node
//! handles along with values, so tracked tensors stay tracked.

use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Product of the extents before and after `axis`.
fn outer_inner(dims: &[usize], axis: usize) -> (usize, usize) {
    let outer = dims[..axis].iter().product();
    let inner = dims[axis + 1..].iter().product();
    (outer, inner)
}

/// Gather `len`-long runs starting at each offset, for values and handles alike.
fn gather_runs<T: Copy>(src: &[T], starts: impl Iterator<Item = usize>, len: usize) -> Vec<T> {
    let mut out = Vec::new();
    for start in starts {
        out.extend_from_slice(&src[start..start + len]);
    }
    out
}

impl Tensor {
    /// Fix the coordinate of `axis` at `index`, dropping that axis.
    ///
    /// `select(0, i)` on a rank-1 tensor gives a scalar.
    pub fn select(&self, axis: usize, index: usize) -> Result<Tensor> {
        self.shape().check_axis(axis)?;
        let extent = self.dims()[axis];
        if index >= extent {
            return Err(TensorError::IndexOutOfBounds {
                axis,
                index,
                extent,
            });
        }

        let (outer, inner) = outer_inner(self.dims(), axis);
        let starts = || (0..outer).map(move |o| (o * extent + index) * inner);

        let data = gather_runs(self.data(), starts(), inner);
        let grad = self.grad_ids().map(|g| gather_runs(g, starts(), inner));
        let batched = self.is_batched() && axis != 0;

        Ok(Tensor::from_parts(
            self.shape().without_axis(axis),
            data,
            grad,
            batched,
        ))
    }

    /// Insert a length-1 axis at position `axis` (which may equal the rank).
    pub fn unsqueeze(&self, axis: usize) -> Result<Tensor> {
        if axis > self.ndim() {
            return Err(TensorError::InvalidAxis {
                axis,
                rank: self.ndim() + 1,
            });
        }
        let mut dims = self.dims().to_vec();
        dims.insert(axis, 1);
        Ok(Tensor::from_parts(
            Shape::new(dims),
            self.data().to_vec(),
            self.grad_vec().cloned(),
            self.is_batched() && axis != 0,
        ))
    }

    /// Reorder axes: output axis `i` is input axis `perm[i]`.
    pub fn permute(&self, perm: &[usize]) -> Result<Tensor> {
        let ndim = self.ndim();
        let mut seen = vec![false; ndim];
        if perm.len() != ndim {
            return Err(TensorError::incompatible(
                "permute",
                format!("permutation {perm:?} for rank {ndim}"),
            ));
        }
        for &p in perm {
            self.shape().check_axis(p)?;
            if std::mem::replace(&mut seen[p], true) {
                return Err(TensorError::incompatible(
                    "permute",
                    format!("axis {p} repeated in {perm:?}"),
                ));
            }
        }

        let new_shape = Shape::new(perm.iter().map(|&i| self.dims()[i]).collect());
        let src_strides = self.strides();
        // Position in the source of each destination element, in destination order.
        let sources: Vec<usize> = new_shape
            .indices()
            .map(|dst| {
                perm.iter()
                    .zip(&dst)
                    .map(|(&axis, &i)| src_strides.0[axis] * i)
                    .sum()
            })
            .collect();

        let data = sources.iter().map(|&s| self.data()[s]).collect();
        let grad = self
            .grad_ids()
            .map(|g| sources.iter().map(|&s| g[s]).collect());
        let batched = self.is_batched() && perm.first() == Some(&0);

        Ok(Tensor::from_parts(new_shape, data, grad, batched))
    }

    /// Swap the two axes of a matrix.
    pub fn transpose(&self) -> Result<Tensor> {
        if self.ndim() != 2 {
            return Err(TensorError::incompatible(
                "transpose",
                format!("expected a matrix, got {}", self.shape()),
            ));
        }
        self.permute(&[1, 0])
    }
}

/// Join tensors along an existing axis.
///
/// All tensors must share rank and every extent except `axis`, and be either
/// all tracked or all untracked.
pub fn concat(tensors: &[Tensor], axis: usize) -> Result<Tensor> {
    let first = tensors
        .first()
        .ok_or_else(|| TensorError::incompatible("concat", "no tensors"))?;
    first.shape().check_axis(axis)?;

    for (i, t) in tensors.iter().enumerate().skip(1) {
        let compatible = t.ndim() == first.ndim()
            && t.dims()
                .iter()
                .zip(first.dims())
                .enumerate()
                .all(|(d, (a, b))| d == axis || a == b);
        if !compatible {
            return Err(TensorError::incompatible(
                "concat",
                format!(
                    "tensor {i} has shape {} but tensor 0 has {} (axis {axis})",
                    t.shape(),
                    first.shape()
                ),
            ));
        }
        if t.is_tracked() != first.is_tracked() {
            return Err(TensorError::incompatible(
                "concat",
                format!("tensor {i} tracking differs from tensor 0"),
            ));
        }
    }

    let mut dims = first.dims().to_vec();
    dims[axis] = tensors.iter().map(|t| t.dims()[axis]).sum();
    let (outer, inner) = outer_inner(first.dims(), axis);

    let total = dims.iter().product();
    let mut data = Vec::with_capacity(total);
    let mut grad = first.is_tracked().then(|| Vec::with_capacity(total));

    for o in 0..outer {
        for t in tensors {
            let run = t.dims()[axis] * inner;
            let range = o * run..(o + 1) * run;
            data.extend_from_slice(&t.data()[range.clone()]);
            if let (Some(dst), Some(src)) = (grad.as_mut(), t.grad_ids()) {
                dst.extend_from_slice(&src[range]);
            }
        }
    }

    let batched = tensors.iter().all(Tensor::is_batched);
    Ok(Tensor::from_parts(Shape::new(dims), data, grad, batched))
}
