use crate::error::Error;
use crate::runtime::task::Task;
use crate::value::Value;

use super::Operation;

use std::any::Any;

/// What a coroutine is resumed with.
#[derive(Debug)]
pub enum Resume {
    /// The first resumption.
    Start,
    /// The last yielded operation completed with this value.
    Value(Value),
    /// The last yielded operation failed (or was halted, which arrives as
    /// [`Error::Halted`]).
    Error(Error),
}

/// What a coroutine produces each time it is resumed.
#[derive(Debug)]
pub enum Step {
    /// Suspend until this operation settles. It runs as a child task and
    /// its outcome is passed to the next resumption.
    Yield(Operation),
    /// End the setup phase of a resource and hand `value` to its consumer.
    /// Only valid once, from the body returned by [`Resource::init`].
    ///
    /// [`Resource::init`]: super::Resource::init
    Provide(Value),
    /// Finish with a value.
    Return(Value),
    /// Finish with an error.
    Throw(Error),
}

impl Step {
    /// Finishes with `value`.
    pub fn ret<T: Any>(value: T) -> Self {
        Self::Return(Value::new(value))
    }

    /// Finishes without a value.
    pub fn done() -> Self {
        Self::Return(Value::none())
    }
}

/// An explicit suspend/resume state machine.
///
/// This is the canonical contract every operation is normalized into. The
/// scheduler calls [`resume`](Coroutine::resume) with the outcome of
/// whatever the coroutine last yielded, and [`halt`](Coroutine::halt) when
/// the owning task is cancelled. A halted coroutine may still yield cleanup
/// operations; their outcomes arrive through `resume` until the coroutine
/// returns or throws.
///
/// Steps never overlap: at most one coroutine in a runtime is executing at
/// any instant.
pub trait Coroutine {
    /// Advances the coroutine.
    fn resume(&mut self, task: &Task, input: Resume) -> Step;

    /// Forces an early return.
    ///
    /// The default returns immediately without a value.
    fn halt(&mut self, task: &Task) -> Step {
        let _ = task;
        Step::done()
    }
}

/// A coroutine built from closures. See [`from_fn`].
pub struct FromFn<F, H> {
    body: F,
    on_halt: Option<H>,
}

type NoHalt = fn(&Task) -> Step;

/// Builds a coroutine whose `resume` is `body`.
///
/// # Examples
///
/// ```rust,ignore
/// let mut child = None;
/// let body = coroutine::from_fn(move |task, input| match input {
///     Resume::Start => {
///         let handle = task.spawn(work());
///         child = Some(handle.clone());
///         Step::Yield(handle.join())
///     }
///     Resume::Value(v) => Step::Return(v),
///     Resume::Error(e) => Step::Throw(e),
/// })
/// .on_halt(|_task| Step::done());
/// ```
pub fn from_fn<F>(body: F) -> FromFn<F, NoHalt>
where
    F: FnMut(&Task, Resume) -> Step,
{
    FromFn {
        body,
        on_halt: None,
    }
}

impl<F, H> FromFn<F, H> {
    /// Replaces the forced-return behaviour.
    pub fn on_halt<G>(self, on_halt: G) -> FromFn<F, G>
    where
        G: FnMut(&Task) -> Step,
    {
        FromFn {
            body: self.body,
            on_halt: Some(on_halt),
        }
    }
}

impl<F, H> Coroutine for FromFn<F, H>
where
    F: FnMut(&Task, Resume) -> Step,
    H: FnMut(&Task) -> Step,
{
    fn resume(&mut self, task: &Task, input: Resume) -> Step {
        (self.body)(task, input)
    }

    fn halt(&mut self, task: &Task) -> Step {
        match self.on_halt.as_mut() {
            Some(on_halt) => on_halt(task),
            None => Step::done(),
        }
    }
}
