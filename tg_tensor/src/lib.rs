//! # tg_tensor - Strided Tensors with Batched Execution
//!
//! Dense row-major `f64` tensors, plain and gradient-tracked tensor operations,
//! reductions, and an executor that maps an operation over the leading (batch)
//! axis on a worker pool while keeping results in batch order.
//!
//! ## Overview
//!
//! - [`Shape`], [`flat_index`] and [`unravel`] - the storage model
//! - [`Tensor`] - data plus optional per-element [`tg_core::ValueId`] handles
//! - [`ops`], [`reduce`] and [`norm`] - plain operations, each an [`Operation`]
//! - [`grad`] - operations that record into a [`tg_core::Tape`]
//! - [`Executor`] - batched execution over axis 0
//!
//! ## Example
//!
//! ```
//! use tg_tensor::prelude::*;
//! use tg_tensor::ops::MatMul;
//!
//! // Three independent 2x2 matrices, stacked along the batch axis.
//! let a = init::range(&[3, 2, 2], true).unwrap();
//! let eye = init::identity(&[3, 2, 2], true).unwrap();
//!
//! let out = Executor::global().run(&MatMul, &[&a, &eye]).unwrap();
//! assert_eq!(out.dims(), &[3, 2, 2]);
//! assert_eq!(out.data(), a.data());
//! ```
//!
//! Gradient-tracked operations record one scalar node per element:
//!
//! ```
//! use tg_core::Graph;
//! use tg_tensor::prelude::*;
//!
//! let mut g = Graph::new();
//! let w = grad::track(&mut g, &Tensor::new(vec![1.0, 2.0], vec![1, 2]).unwrap());
//! let x = Tensor::new(vec![3.0, 4.0], vec![2, 1]).unwrap();
//!
//! let y = grad::matmul(&mut g, &w, &x).unwrap();
//! let loss = grad::sum(&mut g, &y).unwrap();
//! g.backward(loss.grad_ids().unwrap()[0]);
//!
//! assert_eq!(loss.item(), Some(11.0));
//! assert_eq!(w.grad_values(&g).unwrap().data(), &[3.0, 4.0]);
//! ```

pub mod config;
pub mod error;
pub mod exec;
pub mod grad;
pub mod init;
pub mod layout;
pub mod norm;
pub mod ops;
pub mod reduce;
pub mod shape;
pub mod tensor;

pub use config::ExecutorConfig;
pub use error::{FailureCause, Result, TensorError, WorkerFailure};
pub use exec::{Executor, Operation, TrackedOperation};
pub use layout::concat;
pub use ops::UnaryKind;
pub use shape::{flat_index, unravel, Shape, Strides};
pub use tensor::Tensor;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::ExecutorConfig;
    pub use crate::error::{Result, TensorError};
    pub use crate::exec::{Executor, Operation, TrackedOperation};
    pub use crate::layout::concat;
    pub use crate::ops::UnaryKind;
    pub use crate::shape::{Shape, Strides};
    pub use crate::tensor::Tensor;
    pub use crate::{grad, init};
}
