//! Host Scheduler Boundary
//!
//! The graph never reads wall-clock time and never owns a timer. When a
//! `delay` node needs its value re-delivered later, it hands the request to
//! a host-supplied [`Scheduler`]. The host arranges the timer and, when it
//! fires, feeds the wakeup back through [`Runtime::dispatch`] with a fresh
//! timestamp.
//!
//! [`Runtime::dispatch`]: super::runtime::Runtime::dispatch

use std::sync::Arc;

use parking_lot::Mutex;

use super::node::NodeId;

/// A request to re-deliver `value` to `target` after a pause.
///
/// The target is always a `delay` node, which behaves as an input when the
/// wakeup is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wakeup<V> {
    pub target: NodeId,
    pub value: V,
}

/// The host's timer facility.
pub trait Scheduler<V> {
    /// Arrange for `wakeup` to be dispatched after roughly `delay_ms`
    /// milliseconds. The core places no ordering requirement on wakeups
    /// with equal delays.
    fn schedule(&mut self, delay_ms: u64, wakeup: Wakeup<V>);
}

/// An in-memory scheduler that records requests for the host to drain.
///
/// Useful for hosts that run their own timer wheel, and for tests, which
/// inspect the recorded entries and dispatch them manually.
#[derive(Clone)]
pub struct QueueScheduler<V> {
    entries: Arc<Mutex<Vec<(u64, Wakeup<V>)>>>,
}

impl<V> QueueScheduler<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Take all scheduled entries, leaving the queue empty.
    pub fn drain(&self) -> Vec<(u64, Wakeup<V>)> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of entries currently queued.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<V> Default for QueueScheduler<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Scheduler<V> for QueueScheduler<V> {
    fn schedule(&mut self, delay_ms: u64, wakeup: Wakeup<V>) {
        self.entries.lock().push((delay_ms, wakeup));
    }
}
