//! The dense row-major tensor type.

use serde::{Deserialize, Serialize};
use tg_core::{Graph, Remap, ValueId};

use crate::error::{Result, TensorError};
use crate::shape::{Shape, Strides};

/// A contiguous row-major `f64` tensor.
///
/// A tensor optionally carries one graph node per element (`grad`). Such a
/// tensor is *tracked*: its `data` mirrors the scalars of those nodes at the
/// time it was built, and operations from [`crate::grad`] extend the graph
/// instead of only computing numbers.
///
/// When `batched` is set, axis 0 is the batch axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TensorRepr")]
pub struct Tensor {
    shape: Shape,
    data: Vec<f64>,
    #[serde(skip)]
    grad: Option<Vec<ValueId>>,
    #[serde(default)]
    batched: bool,
}

#[derive(Deserialize)]
struct TensorRepr {
    shape: Shape,
    data: Vec<f64>,
    #[serde(default)]
    batched: bool,
}

impl TryFrom<TensorRepr> for Tensor {
    type Error = TensorError;

    fn try_from(repr: TensorRepr) -> Result<Self> {
        Ok(Tensor::new(repr.data, repr.shape)?.with_batched(repr.batched))
    }
}

impl Tensor {
    /// Create an untracked tensor, validating the shape and data length.
    pub fn new(data: Vec<f64>, shape: impl Into<Shape>) -> Result<Self> {
        let shape = shape.into();
        shape.validate()?;
        if data.len() != shape.numel() {
            return Err(TensorError::DataLength {
                shape: shape.to_string(),
                expected: shape.numel(),
                actual: data.len(),
            });
        }
        Ok(Tensor {
            shape,
            data,
            grad: None,
            batched: false,
        })
    }

    /// A rank-0 tensor holding one value.
    pub fn scalar(value: f64) -> Self {
        Tensor {
            shape: Shape::scalar(),
            data: vec![value],
            grad: None,
            batched: false,
        }
    }

    /// Assemble a tensor whose invariants the caller already upholds.
    pub(crate) fn from_parts(
        shape: Shape,
        data: Vec<f64>,
        grad: Option<Vec<ValueId>>,
        batched: bool,
    ) -> Self {
        debug_assert_eq!(data.len(), shape.numel());
        debug_assert!(grad.as_ref().map_or(true, |g| g.len() == data.len()));
        Tensor {
            shape,
            data,
            grad,
            batched,
        }
    }

    /// Attach one node handle per element.
    pub fn with_grad(mut self, grad: Vec<ValueId>) -> Result<Self> {
        if grad.len() != self.data.len() {
            return Err(TensorError::DataLength {
                shape: self.shape.to_string(),
                expected: self.data.len(),
                actual: grad.len(),
            });
        }
        self.grad = Some(grad);
        Ok(self)
    }

    pub fn with_batched(mut self, batched: bool) -> Self {
        self.batched = batched;
        self
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn strides(&self) -> Strides {
        self.shape.strides()
    }

    /// Flat row-major data.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    pub fn is_batched(&self) -> bool {
        self.batched
    }

    /// Length of the batch axis, or `None` for an unbatched tensor.
    pub fn batch_size(&self) -> Option<usize> {
        if self.batched {
            self.shape.0.first().copied()
        } else {
            None
        }
    }

    /// Read one element; coordinates are checked against the shape.
    pub fn get(&self, coords: &[usize]) -> Result<f64> {
        let flat = self.shape.checked_flat_index(coords)?;
        Ok(self.data[flat])
    }

    /// Overwrite one element.
    ///
    /// Only the plain value changes; a tracked tensor keeps its node handle,
    /// so use this for untracked tensors.
    pub fn set(&mut self, coords: &[usize], value: f64) -> Result<()> {
        let flat = self.shape.checked_flat_index(coords)?;
        self.data[flat] = value;
        Ok(())
    }

    /// The value of a rank-0 tensor, or of a one-element tensor.
    pub fn item(&self) -> Option<f64> {
        match self.data.as_slice() {
            [v] => Some(*v),
            _ => None,
        }
    }

    pub fn is_tracked(&self) -> bool {
        self.grad.is_some()
    }

    /// Node handles, one per element, if this tensor is tracked.
    pub fn grad_ids(&self) -> Option<&[ValueId]> {
        self.grad.as_deref()
    }

    pub(crate) fn grad_vec(&self) -> Option<&Vec<ValueId>> {
        self.grad.as_ref()
    }

    /// Node handle at `coords`.
    pub fn node_at(&self, coords: &[usize]) -> Result<Option<ValueId>> {
        let flat = self.shape.checked_flat_index(coords)?;
        Ok(self.grad.as_ref().map(|g| g[flat]))
    }

    /// Drop the node handles, keeping the values.
    pub fn detach(mut self) -> Self {
        self.grad = None;
        self
    }

    /// Re-read every element from its node's scalar.
    ///
    /// Used after an optimizer step has moved the parameter nodes. Untracked
    /// tensors are left unchanged.
    pub fn sync_from(&mut self, graph: &Graph) {
        if let Some(grad) = &self.grad {
            for (value, &id) in self.data.iter_mut().zip(grad) {
                *value = graph.node(id).scalar;
            }
        }
    }

    /// A tensor of the accumulated gradients of this tensor's nodes.
    pub fn grad_values(&self, graph: &Graph) -> Option<Tensor> {
        let grad = self.grad.as_ref()?;
        let data = grad.iter().map(|&id| graph.grad(id)).collect();
        Some(Tensor::from_parts(self.shape.clone(), data, None, self.batched))
    }

    /// Translate node handles recorded in a graph fragment to their merged
    /// positions.
    pub fn remap_grad(&mut self, remap: &Remap) {
        if remap.is_identity() {
            return;
        }
        if let Some(grad) = &mut self.grad {
            for id in grad.iter_mut() {
                *id = remap.apply(*id);
            }
        }
    }
}
