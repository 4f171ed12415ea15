//! Graph Errors
//!
//! Errors for misuse of the construction and dispatch APIs. These are
//! recoverable: the graph is left untouched and the caller decides what to
//! do. Protocol violations inside an already-running propagation (re-entrant
//! dispatch, a node notified twice by one parent in a tick) are not errors
//! but panics, because the graph's value consistency is already broken at
//! that point.

use thiserror::Error;

use super::node::{NodeId, Timestamp};

/// Recoverable errors from graph construction and dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The referenced node does not exist or has been pruned.
    #[error("unknown or pruned node {0:?}")]
    UnknownNode(NodeId),

    /// Dispatch targeted a node that is not an input or delay root.
    #[error("node {0:?} is not a dispatch target")]
    NotAnInput(NodeId),

    /// The same parent was declared twice for one node. The fan-in protocol
    /// counts one report per parent per tick, so a duplicate edge would
    /// make the node fire early.
    #[error("duplicate parent {parent:?} for new node")]
    DuplicateParent { parent: NodeId },

    /// A combinator was given no parents. A non-root node updates only
    /// when a parent reports, so a parentless one would never fire and
    /// would starve everything built on it.
    #[error("new node has no parents")]
    NoParents,

    /// An output node was named as a parent. Outputs are terminal: they
    /// never fire kids, so anything built on one would wait forever.
    #[error("output node {0:?} cannot be a parent")]
    TerminalParent(NodeId),

    /// More parents than the fan-in bitmask can track.
    #[error("node would have {got} parents, limit is {limit}")]
    TooManyParents { got: usize, limit: usize },

    /// The dispatched timestamp precedes an earlier one.
    #[error("timestamp {got:?} precedes last dispatched {last:?}")]
    TimestampRegression { got: Timestamp, last: Timestamp },
}
