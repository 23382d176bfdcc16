//! Error types for tensor construction, indexing and batched execution.

use std::fmt;

use thiserror::Error;

use tg_core::GraphError;

pub type Result<T> = std::result::Result<T, TensorError>;

#[derive(Debug, Error)]
pub enum TensorError {
    /// A coordinate tuple has a different rank than the tensor.
    #[error("expected {expected} coordinates, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index {index} out of bounds for axis {axis} with extent {extent}")]
    IndexOutOfBounds {
        axis: usize,
        index: usize,
        extent: usize,
    },

    /// Batched inputs disagree on the length of axis 0.
    #[error("input {input} has batch size {actual}, expected {expected}")]
    BatchSizeMismatch {
        expected: usize,
        actual: usize,
        input: usize,
    },

    #[error("{op}: incompatible shapes: {detail}")]
    ShapeIncompatible { op: &'static str, detail: String },

    #[error("data length {actual} does not match shape {shape} ({expected} elements)")]
    DataLength {
        shape: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid shape {0}")]
    InvalidShape(String),

    #[error("axis {axis} out of range for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// An operation received the wrong number of inputs.
    #[error("expected {expected} inputs, got {actual}")]
    Arity { expected: &'static str, actual: usize },

    #[error("{} of {total} batch jobs failed: {}", .failures.len(), FailureList(.failures))]
    BatchFailed {
        total: usize,
        failures: Vec<WorkerFailure>,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl TensorError {
    /// Fail with `Arity` unless exactly `n` inputs were given.
    pub(crate) fn check_arity(inputs: &[&crate::Tensor], n: usize, expected: &'static str) -> Result<()> {
        if inputs.len() != n {
            return Err(TensorError::Arity {
                expected,
                actual: inputs.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn incompatible(op: &'static str, detail: impl Into<String>) -> Self {
        TensorError::ShapeIncompatible {
            op,
            detail: detail.into(),
        }
    }

    /// Indices of the failed jobs, if this is an aggregated batch failure.
    pub fn failed_indices(&self) -> Vec<usize> {
        match self {
            TensorError::BatchFailed { failures, .. } => failures.iter().map(|f| f.index).collect(),
            _ => Vec::new(),
        }
    }
}

/// One failed job of a fan-out.
#[derive(Debug)]
pub struct WorkerFailure {
    /// Batch (or chunk) index of the job.
    pub index: usize,
    pub cause: FailureCause,
}

#[derive(Debug)]
pub enum FailureCause {
    /// The operation returned an error.
    Error(Box<TensorError>),
    /// The operation panicked; holds the panic message when it was a string.
    Panic(String),
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            FailureCause::Error(err) => write!(f, "[{}] {}", self.index, err),
            FailureCause::Panic(msg) => write!(f, "[{}] panicked: {}", self.index, msg),
        }
    }
}

struct FailureList<'a>(&'a [WorkerFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}
