//! Batched execution engine.
//!
//! [`Executor::fan_out`] is the one concurrency primitive of the crate: it runs
//! `n` indexed jobs on a rayon pool, sends each `(index, outcome)` over a
//! channel, and only after every job has finished reassembles the outcomes in
//! index order. Batched operations, graph-recording batched operations and
//! axis reductions are all built on it, so completion order never leaks into
//! results.
//!
//! The receiving side is drained after the rayon scope returns. A job may
//! therefore itself call into the executor (a batched op whose body runs a
//! reduction) without tying up a worker on a blocking receive.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc, OnceLock};

use tg_core::{Graph, Tape};
use tracing::{debug, instrument, warn};

use crate::config::ExecutorConfig;
use crate::error::{FailureCause, Result, TensorError, WorkerFailure};
use crate::layout::concat;
use crate::tensor::Tensor;

/// A tensor operation on one to three inputs.
///
/// Closures `Fn(&[&Tensor]) -> Result<Tensor> + Sync` implement this trait.
pub trait Operation: Sync {
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor>;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "closure"
    }
}

impl<F> Operation for F
where
    F: Fn(&[&Tensor]) -> Result<Tensor> + Sync,
{
    fn execute(&self, inputs: &[&Tensor]) -> Result<Tensor> {
        self(inputs)
    }
}

/// A tensor operation that records scalar nodes for every output element.
///
/// Implementations receive a [`Tape`] that may be a whole [`Graph`] or a
/// worker-private fragment of one. Closures
/// `Fn(&mut dyn Tape, &[&Tensor]) -> Result<Tensor> + Sync` implement this
/// trait.
pub trait TrackedOperation: Sync {
    fn record(&self, tape: &mut dyn Tape, inputs: &[&Tensor]) -> Result<Tensor>;

    fn name(&self) -> &'static str {
        "closure"
    }
}

impl<F> TrackedOperation for F
where
    F: Fn(&mut dyn Tape, &[&Tensor]) -> Result<Tensor> + Sync,
{
    fn record(&self, tape: &mut dyn Tape, inputs: &[&Tensor]) -> Result<Tensor> {
        self(tape, inputs)
    }
}

/// Runs operations across the batch axis on a worker pool.
#[derive(Debug, Default)]
pub struct Executor {
    /// Dedicated pool; `None` runs on rayon's global pool.
    pool: Option<rayon::ThreadPool>,
}

impl Executor {
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        if !config.wants_pool() {
            return Ok(Executor::default());
        }

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(workers) = config.workers {
            builder = builder.num_threads(workers);
        }
        if let Some(prefix) = config.thread_name.clone() {
            builder = builder.thread_name(move |i| format!("{prefix}-{i}"));
        }
        let pool = builder.build()?;
        debug!(workers = pool.current_num_threads(), "built executor pool");
        Ok(Executor { pool: Some(pool) })
    }

    /// Process-wide executor configured from the environment on first use.
    pub fn global() -> &'static Executor {
        static GLOBAL: OnceLock<Executor> = OnceLock::new();
        GLOBAL.get_or_init(|| {
            Executor::new(&ExecutorConfig::from_env()).unwrap_or_else(|err| {
                warn!(%err, "falling back to the global rayon pool");
                Executor::default()
            })
        })
    }

    /// Number of threads jobs are spread over.
    pub fn workers(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    fn in_scope<'scope, OP>(&self, op: OP)
    where
        OP: FnOnce(&rayon::Scope<'scope>) + Send,
    {
        match &self.pool {
            Some(pool) => pool.scope(op),
            None => rayon::scope(op),
        }
    }

    /// Run `job(0..n)` concurrently and return the results in index order.
    ///
    /// Every job runs to completion. If any of them returns an error or
    /// panics, the call fails with [`TensorError::BatchFailed`] listing each
    /// failed index, and no partial results are returned.
    pub fn fan_out<T, F>(&self, n: usize, job: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync,
    {
        let (tx, rx) = mpsc::channel();
        let job = &job;

        self.in_scope(move |s| {
            for index in 0..n {
                let tx = tx.clone();
                s.spawn(move |_| {
                    let outcome = catch_unwind(AssertUnwindSafe(|| job(index)));
                    // The receiver outlives the scope.
                    let _ = tx.send((index, outcome));
                });
            }
        });

        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        for (index, outcome) in rx {
            match outcome {
                Ok(Ok(value)) => {
                    results.insert(index, value);
                }
                Ok(Err(err)) => failures.push(WorkerFailure {
                    index,
                    cause: FailureCause::Error(Box::new(err)),
                }),
                Err(payload) => failures.push(WorkerFailure {
                    index,
                    cause: FailureCause::Panic(panic_message(payload.as_ref())),
                }),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            for failure in &failures {
                warn!(%failure, "batch job failed");
            }
            return Err(TensorError::BatchFailed { total: n, failures });
        }

        debug!(jobs = n, "fan-in complete");
        Ok(results.into_values().collect())
    }

    /// Apply `op` to every axis-0 slice of `inputs` and stack the results.
    ///
    /// Output element `i` is `op(inputs[0][i], inputs[1][i], ...)` with a
    /// leading axis of length one, concatenated in batch order and marked
    /// batched.
    #[instrument(level = "debug", skip_all, fields(op = op.name(), inputs = inputs.len()))]
    pub fn run<O>(&self, op: &O, inputs: &[&Tensor]) -> Result<Tensor>
    where
        O: Operation + ?Sized,
    {
        let batch_size = check_batch(inputs)?;

        let parts = self.fan_out(batch_size, |i| {
            let slices = slice_inputs(inputs, i)?;
            let refs: Vec<&Tensor> = slices.iter().collect();
            op.execute(&refs)?.unsqueeze(0)
        })?;

        let out = concat(&parts, 0)?.with_batched(true);
        debug!(batch_size, shape = %out.shape(), "batched run assembled");
        Ok(out)
    }

    /// Like [`Executor::run`] for operations that record into `graph`.
    ///
    /// Each batch element records into its own fragment of `graph`; fragments
    /// are merged in batch order, so node handles in the result do not depend
    /// on which worker finished first.
    #[instrument(level = "debug", skip_all, fields(op = op.name(), inputs = inputs.len(), nodes = graph.len()))]
    pub fn run_tracked<O>(&self, graph: &mut Graph, op: &O, inputs: &[&Tensor]) -> Result<Tensor>
    where
        O: TrackedOperation + ?Sized,
    {
        let batch_size = check_batch(inputs)?;
        let base: &Graph = graph;

        let parts = self.fan_out(batch_size, |i| {
            let slices = slice_inputs(inputs, i)?;
            let refs: Vec<&Tensor> = slices.iter().collect();
            let mut fragment = base.fork();
            let out = op.record(&mut fragment, &refs)?.unsqueeze(0)?;
            Ok((fragment.detach(), out))
        })?;

        let mut outputs = Vec::with_capacity(parts.len());
        for (fragment, mut out) in parts {
            let remap = graph.merge(fragment)?;
            out.remap_grad(&remap);
            outputs.push(out);
        }

        let out = concat(&outputs, 0)?.with_batched(true);
        debug!(batch_size, nodes = graph.len(), "tracked batched run assembled");
        Ok(out)
    }
}

/// Validate arity and axis-0 agreement; returns the batch size.
fn check_batch(inputs: &[&Tensor]) -> Result<usize> {
    if !(1..=3).contains(&inputs.len()) {
        return Err(TensorError::Arity {
            expected: "1 to 3",
            actual: inputs.len(),
        });
    }

    let leading = |input: usize, t: &Tensor| {
        t.dims().first().copied().ok_or_else(|| {
            TensorError::incompatible("batch", format!("input {input} is a scalar and has no batch axis"))
        })
    };

    let expected = leading(0, inputs[0])?;
    for (input, t) in inputs.iter().enumerate().skip(1) {
        let actual = leading(input, t)?;
        if actual != expected {
            return Err(TensorError::BatchSizeMismatch {
                expected,
                actual,
                input,
            });
        }
    }
    Ok(expected)
}

fn slice_inputs(inputs: &[&Tensor], index: usize) -> Result<Vec<Tensor>> {
    inputs.iter().map(|t| t.select(0, index)).collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
