//! Task Values
//!
//! A [`Task`] is an immutable description of an effect: it does nothing
//! until handed to the interpreter in [`interp`](super::interp). Tasks are
//! values, created on demand and consumed exactly once.
//!
//! Failure is a first-class value, not an exception: a [`Task::Fail`] flows
//! through `and_then` untouched and is caught only by a matching `catch`.

use super::interp::Resume;

/// An effect description, consumed exactly once by the interpreter.
pub enum Task<T, E> {
    /// Immediately complete with a value.
    Succeed(T),

    /// Immediately complete with an error.
    Fail(E),

    /// An asynchronous step. The spawn function receives a [`Resume`]
    /// token; completing the token (possibly before the spawn function
    /// returns) completes the step.
    Async(Box<dyn FnOnce(Resume<T, E>)>),

    /// Run the inner task; on success, feed its value to the continuation
    /// and run the task it returns. Failure passes through unchanged.
    AndThen(
        Box<Task<T, E>>,
        Box<dyn FnOnce(T) -> Task<T, E>>,
    ),

    /// Run the inner task; on failure, feed the error to the handler and
    /// run the task it returns. Success passes through unchanged.
    Catch(
        Box<Task<T, E>>,
        Box<dyn FnOnce(E) -> Task<T, E>>,
    ),
}

impl<T: 'static, E: 'static> Task<T, E> {
    /// A task that completes immediately with `value`.
    pub fn succeed(value: T) -> Self {
        Task::Succeed(value)
    }

    /// A task that fails immediately with `error`.
    pub fn fail(error: E) -> Self {
        Task::Fail(error)
    }

    /// A task backed by a callback-style asynchronous operation. The spawn
    /// function may complete the token synchronously; the interpreter
    /// detects that and carries on without parking.
    pub fn from_async(spawn: impl FnOnce(Resume<T, E>) + 'static) -> Self {
        Task::Async(Box::new(spawn))
    }

    /// Chain a continuation onto this task's success value.
    pub fn and_then(self, k: impl FnOnce(T) -> Task<T, E> + 'static) -> Self {
        Task::AndThen(Box::new(self), Box::new(k))
    }

    /// Recover from this task's failure.
    pub fn catch(self, k: impl FnOnce(E) -> Task<T, E> + 'static) -> Self {
        Task::Catch(Box::new(self), Box::new(k))
    }

    /// Transform this task's success value.
    pub fn map(self, f: impl FnOnce(T) -> T + 'static) -> Self {
        self.and_then(|v| Task::Succeed(f(v)))
    }

    /// Transform this task's error.
    pub fn map_err(self, f: impl FnOnce(E) -> E + 'static) -> Self {
        self.catch(|e| Task::Fail(f(e)))
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Task::Succeed(_) => "succeed",
            Task::Fail(_) => "fail",
            Task::Async(_) => "async",
            Task::AndThen(..) => "and_then",
            Task::Catch(..) => "catch",
        }
    }
}
