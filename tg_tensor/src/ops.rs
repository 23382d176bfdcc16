//! Plain (untracked) tensor operations.
//!
//! Each operation is a small struct implementing [`Operation`], so the same
//! value can be applied directly or handed to [`crate::Executor::run`] to map
//! it over a batch.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TensorError};
use crate::exec::{Executor, Operation};
use crate::shape::Shape;
use crate::tensor::Tensor;

/// Elementwise unary functions shared by plain and tracked tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryKind {
    Neg,
    Exp,
    Log,
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryKind {
    pub fn apply(self, x: f64) -> f64 {
        match self {
            UnaryKind::Neg => -x,
            UnaryKind::Exp => x.exp(),
            UnaryKind::Log => x.ln(),
            UnaryKind::Relu => x.max(0.0),
            UnaryKind::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            UnaryKind::Tanh => x.tanh(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryKind::Neg => "neg",
            UnaryKind::Exp => "exp",
            UnaryKind::Log => "log",
            UnaryKind::Relu => "relu",
            UnaryKind::Sigmoid => "sigmoid",
            UnaryKind::Tanh => "tanh",
        }
    }
}

/// View a rank-1 or rank-2 operand as a matrix.
///
/// A vector on the left becomes a row `(1, K)`; on the right a column `(K, 1)`.
fn as_matrix(t: &Tensor, left: bool) -> Result<(usize, usize)> {
    match *t.dims() {
        [k] if left => Ok((1, k)),
        [k] => Ok((k, 1)),
        [r, c] => Ok((r, c)),
        _ => Err(TensorError::incompatible(
            "matmul",
            format!("expected a vector or matrix, got {}", t.shape()),
        )),
    }
}

/// Validate matmul operands; returns `(m, k, n)`.
pub(crate) fn matmul_dims(a: &Tensor, b: &Tensor) -> Result<(usize, usize, usize)> {
    let (m, k) = as_matrix(a, true)?;
    let (k2, n) = as_matrix(b, false)?;
    if k != k2 {
        return Err(TensorError::incompatible(
            "matmul",
            format!("{} @ {}: inner dimensions {k} and {k2} differ", a.shape(), b.shape()),
        ));
    }
    Ok((m, k, n))
}

/// Fail unless `a` and `b` have identical shapes.
pub(crate) fn same_shape(op: &'static str, a: &Tensor, b: &Tensor) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(TensorError::incompatible(
            op,
            format!("{} vs {}", a.shape(), b.shape()),
        ));
    }
    Ok(())
}

fn zip_with<F>(op: &'static str, a: &Tensor, b: &Tensor, f: F) -> Result<Tensor>
where
    F: Fn(f64, f64) -> f64,
{
    same_shape(op, a, b)?;
    let data = a.data().iter().zip(b.data()).map(|(&x, &y)| f(x, y)).collect();
    Tensor::new(data, a.shape().clone())
}

/// Matrix product. Output is always 2-D.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatMul;

impl Operation for MatMul {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 2, "2")?;
        let (a, b) = (inputs[0], inputs[1]);
        let (m, k, n) = matmul_dims(a, b)?;
        let (ad, bd) = (a.data(), b.data());

        let mut data = Vec::with_capacity(m * n);
        for i in 0..m {
            for j in 0..n {
                // Seed with the first product; k >= 1 for any valid shape.
                let mut acc = ad[i * k] * bd[j];
                for p in 1..k {
                    acc += ad[i * k + p] * bd[p * n + j];
                }
                data.push(acc);
            }
        }
        Tensor::new(data, Shape::new(vec![m, n]))
    }

    fn name(&self) -> &'static str {
        "matmul"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl Operation for Add {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 2, "2")?;
        zip_with("add", inputs[0], inputs[1], |x, y| x + y)
    }

    fn name(&self) -> &'static str {
        "add"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sub;

impl Operation for Sub {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 2, "2")?;
        zip_with("sub", inputs[0], inputs[1], |x, y| x - y)
    }

    fn name(&self) -> &'static str {
        "sub"
    }
}

/// Elementwise (Hadamard) product.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mul;

impl Operation for Mul {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 2, "2")?;
        zip_with("mul", inputs[0], inputs[1], |x, y| x * y)
    }

    fn name(&self) -> &'static str {
        "mul"
    }
}

/// Multiply every element by a constant.
#[derive(Debug, Clone, Copy)]
pub struct ScalarMul(pub f64);

impl Operation for ScalarMul {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        let t = inputs[0];
        let data = t.data().iter().map(|&x| x * self.0).collect();
        Tensor::new(data, t.shape().clone())
    }

    fn name(&self) -> &'static str {
        "scalar_mul"
    }
}

/// Apply a unary function to every element.
#[derive(Debug, Clone, Copy)]
pub struct Map(pub UnaryKind);

impl Operation for Map {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        let t = inputs[0];
        let data = t.data().iter().map(|&x| self.0.apply(x)).collect();
        Tensor::new(data, t.shape().clone())
    }

    fn name(&self) -> &'static str {
        self.0.name()
    }
}

/// Gram matrix `A @ A^T` of a 2-D tensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gram;

impl Operation for Gram {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 1, "1")?;
        let a = inputs[0];
        MatMul.execute(&[a, &a.transpose()?])
    }

    fn name(&self) -> &'static str {
        "gram"
    }
}

/// Apply `op(onto[i], arg)` to every batch element of `onto`.
///
/// `arg` must have the shape of one element, `onto.dims()[1..]`.
pub fn broadcast<O>(exec: &Executor, op: &O, onto: &Tensor, arg: &Tensor) -> Result<Tensor>
where
    O: Operation + ?Sized,
{
    if onto.dims().get(1..) != Some(arg.dims()) {
        return Err(TensorError::incompatible(
            "broadcast",
            format!("cannot apply {} to the elements of {}", arg.shape(), onto.shape()),
        ));
    }
    let apply = |inputs: &[&Tensor]| -> Result<Tensor> { op.execute(&[inputs[0], arg]) };
    exec.run(&apply, &[onto])
}

/// A binary operation with its second input shared across the batch.
///
/// Inputs are `[onto, arg]`; see [`broadcast`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Broadcast<O>(pub O);

pub type BroadcastAdd = Broadcast<Add>;
pub type BroadcastSub = Broadcast<Sub>;

impl<O: Operation> Operation for Broadcast<O> {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        TensorError::check_arity(inputs, 2, "2")?;
        broadcast(Executor::global(), &self.0, inputs[0], inputs[1])
    }

    fn name(&self) -> &'static str {
        "broadcast"
    }
}

impl Tensor {
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        MatMul.execute(&[self, other])
    }

    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        Add.execute(&[self, other])
    }

    pub fn sub(&self, other: &Tensor) -> Result<Tensor> {
        Sub.execute(&[self, other])
    }

    pub fn mul(&self, other: &Tensor) -> Result<Tensor> {
        Mul.execute(&[self, other])
    }

    pub fn scale(&self, factor: f64) -> Result<Tensor> {
        ScalarMul(factor).execute(&[self])
    }

    pub fn map(&self, kind: UnaryKind) -> Result<Tensor> {
        Map(kind).execute(&[self])
    }

    pub fn gram(&self) -> Result<Tensor> {
        Gram.execute(&[self])
    }

    /// `self[i] + arg` for every batch element.
    pub fn broadcast_add(&self, arg: &Tensor) -> Result<Tensor> {
        Broadcast(Add).execute(&[self, arg])
    }

    /// `self[i] - arg` for every batch element.
    pub fn broadcast_sub(&self, arg: &Tensor) -> Result<Tensor> {
        Broadcast(Sub).execute(&[self, arg])
    }
}
