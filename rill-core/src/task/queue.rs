//! Delivery Queues
//!
//! Per-output serialization of task execution. Each output wired for a
//! stream of tasks keeps its own FIFO; only one task from a given queue is
//! in flight at a time. A task arriving while another runs is appended,
//! never started, so logically sequential effects triggered by the same
//! signal can never overlap (a user clicking faster than the click's effect
//! can finish still observes one effect at a time, in click order).
//!
//! Each completion is handed to the queue's registered result hook; hosts
//! typically feed it back into the graph through
//! [`Runtime::dispatch`](crate::graph::Runtime::dispatch).

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::graph::NodeId;

use super::interp;
use super::task::Task;

struct OutputQueue<T, E> {
    pending: VecDeque<Task<T, E>>,
    /// A task from this queue is currently between `run` and completion.
    running: bool,
    /// The pump loop is on the stack; completions only flip `running` and
    /// let the loop advance, keeping synchronous chains off the call stack.
    pumping: bool,
    on_result: Option<Arc<dyn Fn(Result<T, E>)>>,
}

impl<T, E> OutputQueue<T, E> {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            running: false,
            pumping: false,
            on_result: None,
        }
    }
}

/// Runs enqueued tasks strictly one at a time per output, in arrival order.
///
/// Cloning yields another handle to the same queues.
pub struct TaskRunner<T, E> {
    queues: Arc<Mutex<IndexMap<NodeId, OutputQueue<T, E>>>>,
}

impl<T, E> Clone for TaskRunner<T, E> {
    fn clone(&self) -> Self {
        Self {
            queues: Arc::clone(&self.queues),
        }
    }
}

impl<T: 'static, E: 'static> TaskRunner<T, E> {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// Register the result hook for an output's queue, creating the queue
    /// if needed. Every completion (success or failure) of a task enqueued
    /// for this output is handed to `on_result`.
    pub fn register(&self, output: NodeId, on_result: impl Fn(Result<T, E>) + 'static) {
        let hook: Arc<dyn Fn(Result<T, E>)> = Arc::new(on_result);
        let mut queues = self.queues.lock();
        let queue = queues.entry(output).or_insert_with(OutputQueue::new);
        queue.on_result = Some(hook);
    }

    /// Append a task to an output's queue and advance the queue if idle.
    pub fn enqueue(&self, output: NodeId, task: Task<T, E>) {
        {
            let mut queues = self.queues.lock();
            let queue = queues.entry(output).or_insert_with(OutputQueue::new);
            queue.pending.push_back(task);
            trace!(
                output = output.raw(),
                pending = queue.pending.len(),
                "task enqueued"
            );
        }
        self.pump(output);
    }

    /// Drop an output's queue, discarding any pending tasks. A task already
    /// in flight still completes, but its result is discarded.
    pub fn remove(&self, output: NodeId) {
        self.queues.lock().shift_remove(&output);
    }

    /// Number of tasks waiting (not yet started) for an output.
    pub fn pending_len(&self, output: NodeId) -> usize {
        self.queues
            .lock()
            .get(&output)
            .map_or(0, |q| q.pending.len())
    }

    /// Advance an output's queue: start the next pending task unless one is
    /// already in flight. Iterative; synchronous completions loop here
    /// instead of recursing.
    fn pump(&self, output: NodeId) {
        {
            let mut queues = self.queues.lock();
            let queue = match queues.get_mut(&output) {
                Some(queue) => queue,
                None => return,
            };
            if queue.pumping {
                return;
            }
            queue.pumping = true;
        }

        loop {
            let (task, hook) = {
                let mut queues = self.queues.lock();
                let queue = match queues.get_mut(&output) {
                    // Removed mid-pump; nothing left to advance.
                    Some(queue) => queue,
                    None => return,
                };
                if queue.running {
                    queue.pumping = false;
                    return;
                }
                let task = match queue.pending.pop_front() {
                    Some(task) => task,
                    None => {
                        queue.pumping = false;
                        return;
                    }
                };
                queue.running = true;
                (task, queue.on_result.clone())
            };

            let runner = self.clone();
            interp::run(task, move |result| {
                {
                    let mut queues = runner.queues.lock();
                    if let Some(queue) = queues.get_mut(&output) {
                        queue.running = false;
                    } else {
                        // Queue removed while the task ran; discard.
                        return;
                    }
                }
                if let Some(hook) = hook {
                    hook(result);
                }
                runner.pump(output);
            });
        }
    }
}

impl<T: 'static, E: 'static> Default for TaskRunner<T, E> {
    fn default() -> Self {
        Self::new()
    }
}
