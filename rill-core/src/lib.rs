//! Rill Core
//!
//! This crate provides the reactive execution core for the Rill UI runtime.
//! It implements:
//!
//! - A push-based signal graph with glitch-free multi-parent propagation
//! - Combinator nodes: map/mapN, foldp, merge, filter_map, sample_on,
//!   drop_repeats, stamped, delay
//! - A trampolined task interpreter with first-class failure values
//! - Per-output FIFO delivery queues for streams of triggered effects
//!
//! Rendering, persistent collections, and host-event marshalling are
//! external collaborators: they call [`graph::Runtime::dispatch`] to push
//! events in, and read output node values or receive them through output
//! handlers and task result hooks.
//!
//! # Architecture
//!
//! The crate is organized into two modules:
//!
//! - `graph`: the signal arena, combinator builders, and the dispatcher
//!   that performs one synchronous propagation walk per external event
//! - `task`: task values, the trampolined interpreter, and the per-output
//!   delivery queues
//!
//! # Example
//!
//! ```rust
//! use rill_core::graph::{Runtime, Timestamp};
//!
//! let mut rt = Runtime::new();
//! let clicks = rt.input(0u32);
//! let count = rt.foldp(clicks, 0, |_, acc| acc + 1).unwrap();
//!
//! rt.dispatch(Timestamp(1), clicks, 1).unwrap();
//! rt.dispatch(Timestamp(2), clicks, 1).unwrap();
//! assert_eq!(rt.value(count), Some(&2));
//! ```

pub mod graph;
pub mod task;
