//! Signal Graph
//!
//! This module implements the push-based dataflow graph: nodes, the
//! combinator construction API, and the dispatcher that walks the graph
//! once per external event.
//!
//! # Concepts
//!
//! ## Nodes
//!
//! Every signal is a node in a single arena, referred to by a stable
//! integer [`NodeId`]. Inputs are roots whose values change only through
//! [`Runtime::dispatch`]; combinators (`map`, `foldp`, `merge`,
//! `filter_map`, `sample_on`, `drop_repeats`, `stamped`, `delay`) derive
//! values from their parents; outputs hand fresh values to the host.
//!
//! ## Ticks
//!
//! Each dispatch stamps one logical [`Timestamp`] and performs one complete
//! synchronous walk. Multi-parent nodes wait until every parent has
//! reported before firing, so downstream nodes never observe a partially
//! propagated event.
//!
//! ## Host boundary
//!
//! The graph owns no timers and reads no clocks. `delay` nodes hand their
//! wakeups to a host [`Scheduler`]; the host dispatches them back later.

mod error;
mod node;
mod runtime;
mod scheduler;

pub use error::GraphError;
pub use node::{Node, NodeId, NodeKind, Timestamp, MAX_PARENTS};
pub use runtime::Runtime;
pub use scheduler::{QueueScheduler, Scheduler, Wakeup};
