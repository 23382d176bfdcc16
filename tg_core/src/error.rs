//! Errors raised by graph maintenance operations.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The graph shrank below the length a fragment was forked at, so the
    /// fragment's references to pre-existing nodes are no longer valid.
    #[error("fragment was forked from a graph of {base_len} nodes but the graph now holds {graph_len}")]
    StaleFragment { base_len: usize, graph_len: usize },

    /// The graph was truncated after the fragment was forked. Even if it has
    /// grown back past the fork point, the handles below it may now name
    /// different nodes.
    #[error("fragment was forked at truncation generation {forked} but the graph is at {current}")]
    TruncatedSinceFork { forked: u64, current: u64 },
}
