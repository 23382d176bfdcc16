//! Shape and stride utilities for tensors.
//!
//! Storage is always contiguous row-major: the last axis varies fastest.
//! [`flat_index`] and [`unravel`] convert between coordinates and positions in
//! the flat buffer and are exact inverses for every in-range position.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TensorError};

/// A tensor shape (dimensions).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(pub Vec<usize>);

impl Shape {
    /// Create a new shape from dimensions.
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Create a scalar shape (0-dimensional).
    pub fn scalar() -> Self {
        Shape(vec![])
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Get dimension at index.
    pub fn dim(&self, idx: usize) -> usize {
        self.0[idx]
    }

    /// Get dimensions as slice.
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements. A scalar has one.
    ///
    /// Assumes a shape that passed [`Shape::validate`]; use
    /// [`Shape::checked_numel`] for anything else.
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Element count, or `None` if it does not fit in a `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    /// Check if this is a scalar (0-dim tensor).
    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }

    /// Fail with `InvalidShape` if any extent is zero or the element count
    /// overflows `usize`.
    pub fn validate(&self) -> Result<()> {
        if self.0.contains(&0) {
            return Err(TensorError::InvalidShape(format!(
                "{self}: every extent must be positive"
            )));
        }
        if self.checked_numel().is_none() {
            return Err(TensorError::InvalidShape(format!(
                "{self}: element count overflows usize"
            )));
        }
        Ok(())
    }

    /// Fail with `InvalidAxis` unless `axis < ndim`.
    pub fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.ndim() {
            return Err(TensorError::InvalidAxis {
                axis,
                rank: self.ndim(),
            });
        }
        Ok(())
    }

    /// Compute row-major (C-contiguous) strides for this shape.
    pub fn strides(&self) -> Strides {
        let ndim = self.0.len();
        let mut strides = vec![1usize; ndim];
        for i in (0..ndim.saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        Strides(strides)
    }

    /// Flat position of `coords`, checking rank and every coordinate.
    pub fn checked_flat_index(&self, coords: &[usize]) -> Result<usize> {
        if coords.len() != self.ndim() {
            return Err(TensorError::DimensionMismatch {
                expected: self.ndim(),
                actual: coords.len(),
            });
        }
        for (axis, (&index, &extent)) in coords.iter().zip(&self.0).enumerate() {
            if index >= extent {
                return Err(TensorError::IndexOutOfBounds {
                    axis,
                    index,
                    extent,
                });
            }
        }
        Ok(self.strides().index(coords))
    }

    /// Iterate over every coordinate tuple in row-major order.
    pub fn indices(&self) -> Indices<'_> {
        Indices::new(self)
    }

    /// This shape with `axis` removed.
    pub(crate) fn without_axis(&self, axis: usize) -> Shape {
        let mut dims = self.0.clone();
        dims.remove(axis);
        Shape(dims)
    }
}

/// Flat position of `coords` in a row-major buffer of the given shape.
///
/// Only the rank is checked; use [`Shape::checked_flat_index`] when the
/// coordinates come from outside.
pub fn flat_index(coords: &[usize], shape: &Shape) -> Result<usize> {
    if coords.len() != shape.ndim() {
        return Err(TensorError::DimensionMismatch {
            expected: shape.ndim(),
            actual: coords.len(),
        });
    }
    Ok(shape.strides().index(coords))
}

/// Coordinates of flat position `flat` in a row-major buffer of the given shape.
///
/// Fails with `InvalidShape` for a shape [`Shape::validate`] rejects and with
/// `IndexOutOfBounds` (on axis 0) when `flat` is past the last element.
pub fn unravel(flat: usize, shape: &Shape) -> Result<Vec<usize>> {
    shape.validate()?;
    let numel = shape.numel();
    if flat >= numel {
        let extent = shape.0.first().copied().unwrap_or(1);
        return Err(TensorError::IndexOutOfBounds {
            axis: 0,
            index: flat / (numel / extent),
            extent,
        });
    }

    let mut coords = vec![0; shape.ndim()];
    let mut rest = flat;
    for i in (0..shape.ndim()).rev() {
        coords[i] = rest % shape.0[i];
        rest /= shape.0[i];
    }
    Ok(coords)
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.0)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        if self.0.len() == 1 {
            write!(f, ",")?;
        }
        write!(f, ")")
    }
}

impl From<Vec<usize>> for Shape {
    fn from(v: Vec<usize>) -> Self {
        Shape(v)
    }
}

impl From<&[usize]> for Shape {
    fn from(s: &[usize]) -> Self {
        Shape(s.to_vec())
    }
}

/// Tensor strides (step size in each dimension).
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Strides(pub Vec<usize>);

impl Strides {
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Compute flat index from multi-dimensional indices.
    pub fn index(&self, indices: &[usize]) -> usize {
        debug_assert_eq!(self.0.len(), indices.len());
        self.0.iter().zip(indices).map(|(s, i)| s * i).sum()
    }
}

/// Row-major iterator over all coordinate tuples of a shape.
///
/// A scalar shape yields one empty tuple.
pub struct Indices<'a> {
    shape: &'a Shape,
    current: Vec<usize>,
    done: bool,
}

impl<'a> Indices<'a> {
    fn new(shape: &'a Shape) -> Self {
        Indices {
            shape,
            current: vec![0; shape.ndim()],
            done: shape.0.contains(&0),
        }
    }
}

impl Iterator for Indices<'_> {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let result = self.current.clone();

        // Odometer increment, rightmost axis first.
        self.done = true;
        for i in (0..self.shape.ndim()).rev() {
            self.current[i] += 1;
            if self.current[i] < self.shape.dim(i) {
                self.done = false;
                break;
            }
            self.current[i] = 0;
        }

        Some(result)
    }
}
