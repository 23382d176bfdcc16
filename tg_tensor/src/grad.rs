//! Gradient-tracked tensor operations.
//!
//! These functions work on the node handles of tracked tensors and record one
//! scalar sub-graph per output element into a [`Tape`]. The output tensor's
//! `data` holds the forward values of its nodes. Untracked inputs are lifted
//! to fresh leaves first.
//!
//! Every operation also has a [`TrackedOperation`] form (`MatMulGrad`,
//! `AddGrad`, ...) for [`crate::Executor::run_tracked`].

use tg_core::{Tape, ValueId};

use crate::error::{Result, TensorError};
use crate::exec::TrackedOperation;
use crate::ops::{matmul_dims, same_shape, UnaryKind};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Create one leaf per element and return the tracked copy of `t`.
///
/// Always makes new leaves, even if `t` is already tracked.
#[doc(alias = "gradify")]
pub fn track<T: Tape + ?Sized>(tape: &mut T, t: &Tensor) -> Tensor {
    let ids = t.data().iter().map(|&v| tape.leaf(v)).collect();
    Tensor::from_parts(t.shape().clone(), t.data().to_vec(), Some(ids), t.is_batched())
}

/// Node handles of `t`, creating leaves if it is untracked.
fn lift<T: Tape + ?Sized>(tape: &mut T, t: &Tensor) -> Vec<ValueId> {
    match t.grad_ids() {
        Some(ids) => ids.to_vec(),
        None => t.data().iter().map(|&v| tape.leaf(v)).collect(),
    }
}

/// Assemble a tracked tensor whose data are the scalars of `ids`.
fn from_nodes<T: Tape + ?Sized>(tape: &T, shape: Shape, ids: Vec<ValueId>) -> Tensor {
    let data = ids.iter().map(|&id| tape.scalar(id)).collect();
    Tensor::from_parts(shape, data, Some(ids), false)
}

/// Tracked matrix product.
///
/// Each output cell is a running sum of products seeded with the first
/// product, so its value equals [`Tensor::matmul`] exactly.
pub fn matmul<T: Tape + ?Sized>(tape: &mut T, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let (m, k, n) = matmul_dims(a, b)?;
    let av = lift(tape, a);
    let bv = lift(tape, b);

    let mut out = Vec::with_capacity(m * n);
    for i in 0..m {
        for j in 0..n {
            let mut acc = tape.mul(av[i * k], bv[j]);
            for p in 1..k {
                let prod = tape.mul(av[i * k + p], bv[p * n + j]);
                acc = tape.add(acc, prod);
            }
            out.push(acc);
        }
    }
    Ok(from_nodes(tape, Shape::new(vec![m, n]), out))
}

fn zip_nodes<T, F>(tape: &mut T, op: &'static str, a: &Tensor, b: &Tensor, f: F) -> Result<Tensor>
where
    T: Tape + ?Sized,
    F: Fn(&mut T, ValueId, ValueId) -> ValueId,
{
    same_shape(op, a, b)?;
    let av = lift(tape, a);
    let bv = lift(tape, b);
    let out = av.into_iter().zip(bv).map(|(x, y)| f(tape, x, y)).collect();
    Ok(from_nodes(tape, a.shape().clone(), out))
}

pub fn add<T: Tape + ?Sized>(tape: &mut T, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    zip_nodes(tape, "add", a, b, |t, x, y| t.add(x, y))
}

pub fn sub<T: Tape + ?Sized>(tape: &mut T, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    zip_nodes(tape, "sub", a, b, |t, x, y| t.sub(x, y))
}

/// Elementwise product.
pub fn mul<T: Tape + ?Sized>(tape: &mut T, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    zip_nodes(tape, "mul", a, b, |t, x, y| t.mul(x, y))
}

pub fn div<T: Tape + ?Sized>(tape: &mut T, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    zip_nodes(tape, "div", a, b, |t, x, y| t.div(x, y))
}

/// Apply a unary function to every element.
pub fn map<T: Tape + ?Sized>(tape: &mut T, a: &Tensor, kind: UnaryKind) -> Result<Tensor> {
    let av = lift(tape, a);
    let out = av
        .into_iter()
        .map(|x| match kind {
            UnaryKind::Neg => tape.neg(x),
            UnaryKind::Exp => tape.exp(x),
            UnaryKind::Log => tape.log(x),
            UnaryKind::Relu => tape.relu(x),
            UnaryKind::Sigmoid => tape.sigmoid(x),
            UnaryKind::Tanh => tape.tanh(x),
        })
        .collect();
    Ok(from_nodes(tape, a.shape().clone(), out))
}

fn sum_node<T: Tape + ?Sized>(tape: &mut T, a: &Tensor) -> Result<ValueId> {
    let av = lift(tape, a);
    let (&first, rest) = av
        .split_first()
        .ok_or_else(|| TensorError::incompatible("sum", "empty tensor"))?;
    Ok(rest.iter().fold(first, |acc, &x| tape.add(acc, x)))
}

/// Sum of all elements as a rank-0 tracked tensor.
pub fn sum<T: Tape + ?Sized>(tape: &mut T, a: &Tensor) -> Result<Tensor> {
    let total = sum_node(tape, a)?;
    Ok(from_nodes(tape, Shape::scalar(), vec![total]))
}

/// Mean of all elements as a rank-0 tracked tensor.
pub fn mean<T: Tape + ?Sized>(tape: &mut T, a: &Tensor) -> Result<Tensor> {
    let total = sum_node(tape, a)?;
    let count = tape.leaf(a.numel() as f64);
    let out = tape.div(total, count);
    Ok(from_nodes(tape, Shape::scalar(), vec![out]))
}

macro_rules! tracked_binary {
    ($(#[$doc:meta])* $name:ident, $func:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl TrackedOperation for $name {
            fn record(&self, tape: &mut dyn Tape, inputs: &[&Tensor]) -> Result<Tensor> {
                TensorError::check_arity(inputs, 2, "2")?;
                $func(tape, inputs[0], inputs[1])
            }

            fn name(&self) -> &'static str {
                stringify!($func)
            }
        }
    };
}

tracked_binary!(
    /// Tracked form of [`crate::ops::MatMul`].
    MatMulGrad,
    matmul
);
tracked_binary!(AddGrad, add);
tracked_binary!(SubGrad, sub);
tracked_binary!(MulGrad, mul);
tracked_binary!(DivGrad, div);

#[derive(Debug, Clone, Copy)]
pub struct MapGrad(pub UnaryKind);

impl TrackedOperation for MapGrad {
    fn record(&self, tape: &mut dyn Tape, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        map(tape, inputs[0], self.0)
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SumGrad;

impl TrackedOperation for SumGrad {
    fn record(&self, tape: &mut dyn Tape, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        sum(tape, inputs[0])
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}
