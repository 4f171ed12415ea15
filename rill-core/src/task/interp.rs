//! Task Interpreter
//!
//! An iterative trampoline over [`Task`] values. Chains of `and_then` /
//! `catch` of arbitrary length are reduced with an explicit continuation
//! stack on the heap, so the call stack never grows with chain length.
//!
//! # Async steps
//!
//! An `Async` step builds a completion token ([`Resume`]) and hands it to
//! the spawn function. The token is an explicit state machine: if it is
//! resolved within the synchronous extent of the spawn call, the
//! interpreter carries on in the same loop; otherwise the whole frame
//! (continuation stack plus completion hook) is parked inside the token,
//! and completing the token later re-enters the loop from where it left
//! off. Parking suspends the entire composite task, not just the async
//! node, so an `and_then` wrapping the async resumes its continuation.
//!
//! There is no cancellation: a parked frame waits for its token forever.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::task::Task;

/// A saved continuation frame: what remains to run around the currently
/// reducing task.
enum Cont<T, E> {
    AndThen(Box<dyn FnOnce(T) -> Task<T, E>>),
    Catch(Box<dyn FnOnce(E) -> Task<T, E>>),
}

/// A parked frame, retained inside the completion token until the async
/// callback fires.
struct Frame<T, E> {
    conts: Vec<Cont<T, E>>,
    on_complete: Box<dyn FnOnce(Result<T, E>)>,
}

/// Completion-token state. `Pending` covers the synchronous extent of the
/// spawn call; whether the callback fired inside that extent is an
/// inspectable state, not a hidden flag.
enum Slot<T, E> {
    /// Spawn call still executing, token not yet completed.
    Pending,
    /// Completed within the synchronous extent of the spawn call.
    Resolved(Result<T, E>),
    /// Spawn returned without completing; the whole frame waits here.
    Parked(Frame<T, E>),
    /// Consumed by the interpreter.
    Spent,
}

/// Completion token for an [`Task::Async`] step.
///
/// Consumed by value: completing it twice is unrepresentable. Dropping it
/// without completing leaves the task parked forever, matching the
/// no-cancellation contract.
pub struct Resume<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

impl<T: 'static, E: 'static> Resume<T, E> {
    /// Complete the async step with a success value.
    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    /// Complete the async step with an error.
    pub fn fail(self, error: E) {
        self.complete(Err(error));
    }

    /// Complete the async step with a result.
    pub fn complete(self, result: Result<T, E>) {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Spent) {
            Slot::Pending => {
                // Still inside the synchronous extent of the spawn call;
                // the interpreter's loop picks this up without parking.
                *slot = Slot::Resolved(result);
            }
            Slot::Parked(frame) => {
                drop(slot);
                trace!("async completion resuming parked task");
                run_loop(result_to_task(result), frame.conts, frame.on_complete);
            }
            Slot::Resolved(_) | Slot::Spent => {
                unreachable!("completion token completed twice")
            }
        }
    }
}

fn result_to_task<T: 'static, E: 'static>(result: Result<T, E>) -> Task<T, E> {
    match result {
        Ok(v) => Task::Succeed(v),
        Err(e) => Task::Fail(e),
    }
}

/// Run a task to completion or to its first genuine suspension.
///
/// `on_complete` receives the final result: `Ok` for an uncaught success,
/// `Err` for an uncaught failure. It runs synchronously if the task never
/// parks, otherwise from within the async completion that finishes it.
pub fn run<T: 'static, E: 'static>(
    task: Task<T, E>,
    on_complete: impl FnOnce(Result<T, E>) + 'static,
) {
    run_loop(task, Vec::new(), Box::new(on_complete));
}

fn run_loop<T: 'static, E: 'static>(
    mut task: Task<T, E>,
    mut conts: Vec<Cont<T, E>>,
    on_complete: Box<dyn FnOnce(Result<T, E>)>,
) {
    loop {
        task = match task {
            Task::Succeed(value) => match unwind_success(&mut conts) {
                Some(k) => k(value),
                None => {
                    on_complete(Ok(value));
                    return;
                }
            },
            Task::Fail(error) => match unwind_failure(&mut conts) {
                Some(k) => k(error),
                None => {
                    on_complete(Err(error));
                    return;
                }
            },
            Task::AndThen(inner, k) => {
                conts.push(Cont::AndThen(k));
                *inner
            }
            Task::Catch(inner, k) => {
                conts.push(Cont::Catch(k));
                *inner
            }
            Task::Async(spawn) => {
                let slot = Arc::new(Mutex::new(Slot::Pending));
                spawn(Resume { slot: slot.clone() });

                let mut guard = slot.lock();
                match std::mem::replace(&mut *guard, Slot::Spent) {
                    Slot::Resolved(result) => result_to_task(result),
                    Slot::Pending => {
                        *guard = Slot::Parked(Frame { conts, on_complete });
                        trace!("task parked awaiting async completion");
                        return;
                    }
                    Slot::Parked(_) | Slot::Spent => {
                        unreachable!("fresh completion token in impossible state")
                    }
                }
            }
        };
    }
}

/// Pop continuations until one that consumes a success value. `catch`
/// handlers along the way are skipped: success passes through them.
fn unwind_success<T, E>(conts: &mut Vec<Cont<T, E>>) -> Option<Box<dyn FnOnce(T) -> Task<T, E>>> {
    while let Some(cont) = conts.pop() {
        match cont {
            Cont::AndThen(k) => return Some(k),
            Cont::Catch(_) => {}
        }
    }
    None
}

/// Pop continuations until one that consumes an error. `and_then`
/// continuations along the way are skipped: failure passes through them.
fn unwind_failure<T, E>(conts: &mut Vec<Cont<T, E>>) -> Option<Box<dyn FnOnce(E) -> Task<T, E>>> {
    while let Some(cont) = conts.pop() {
        match cont {
            Cont::Catch(k) => return Some(k),
            Cont::AndThen(_) => {}
        }
    }
    None
}
