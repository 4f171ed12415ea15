//! Task Engine
//!
//! This module implements the effect side of the runtime: [`Task`] values
//! describing work, the trampolined interpreter that reduces them, and the
//! per-output delivery queues that serialize streams of tasks.
//!
//! # Concepts
//!
//! ## Tasks
//!
//! A [`Task`] is a pure description: success, failure, a callback-style
//! asynchronous step, or a continuation chained onto another task. Nothing
//! happens until the interpreter runs it.
//!
//! ## Interpretation
//!
//! [`run`] reduces a task iteratively with an explicit continuation stack,
//! so chains of any length use constant call-stack depth. An async step
//! that does not complete within its spawn call parks the whole frame;
//! completing its [`Resume`] token later picks the frame back up.
//!
//! ## Delivery
//!
//! A [`TaskRunner`] keeps one FIFO per output node and runs at most one
//! task per queue at a time, in arrival order.

mod interp;
mod queue;
mod task;

pub use interp::{run, Resume};
pub use queue::TaskRunner;
pub use task::Task;
