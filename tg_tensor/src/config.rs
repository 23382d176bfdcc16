//! Executor configuration.

use tracing::warn;

/// Environment variable holding the worker count for [`crate::Executor::global`].
pub const WORKERS_ENV: &str = "TG_WORKERS";

/// How the batched execution engine sizes and names its worker pool.
///
/// With neither field set the executor runs on rayon's global pool, which is
/// sized to the available parallelism.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Number of worker threads in a dedicated pool.
    pub workers: Option<usize>,
    /// Prefix for worker thread names; threads are named `{prefix}-{index}`.
    pub thread_name: Option<String>,
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = Some(prefix.into());
        self
    }

    /// Read `TG_WORKERS`. Unset, empty, zero or unparsable values fall back to
    /// the default pool.
    pub fn from_env() -> Self {
        let workers = std::env::var(WORKERS_ENV)
            .ok()
            .and_then(|raw| parse_workers(&raw));
        ExecutorConfig {
            workers,
            thread_name: workers.map(|_| "tg-worker".to_string()),
        }
    }

    /// True when a dedicated pool is needed.
    pub(crate) fn wants_pool(&self) -> bool {
        self.workers.is_some() || self.thread_name.is_some()
    }
}

fn parse_workers(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<usize>() {
        Ok(0) => {
            warn!(var = WORKERS_ENV, "worker count of 0 ignored; using default pool");
            None
        }
        Ok(n) => Some(n),
        Err(err) => {
            warn!(var = WORKERS_ENV, value = raw, %err, "invalid worker count; using default pool");
            None
        }
    }
}
