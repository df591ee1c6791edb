use crate::error::{Error, Result};
use crate::operation::Resume;
use crate::value::Value;

use super::TaskId;

use serde::Serialize;

/// The lifecycle state of a task.
///
/// A task starts `Pending`, becomes `Running` on its first step, may pass
/// through `Halting`, and ends in exactly one of the three terminal states.
/// Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskState {
    /// Spawned, waiting for its first step.
    Pending,
    /// Started and not yet settled.
    Running,
    /// A halt was requested; children and teardown are in progress.
    Halting,
    /// Finished with a value.
    Completed,
    /// Finished with an error.
    Errored,
    /// Cancelled before producing a value.
    Halted,
}

impl TaskState {
    /// Returns `true` for `Completed`, `Errored` and `Halted`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Halted)
    }
}

/// How a task settled.
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(Value),
    Errored(Error),
    Halted,
}

impl Outcome {
    /// The terminal state matching this outcome.
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed(_) => TaskState::Completed,
            Self::Errored(_) => TaskState::Errored,
            Self::Halted => TaskState::Halted,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted)
    }

    /// Converts the outcome of `task` into what joining it yields.
    ///
    /// A halted task produces [`Error::Halted`].
    pub fn into_result(self, task: TaskId) -> Result<Value> {
        match self {
            Self::Completed(value) => Ok(value),
            Self::Errored(error) => Err(error),
            Self::Halted => Err(Error::Halted { task }),
        }
    }

    /// Converts the outcome of `task` into a coroutine resumption.
    pub(crate) fn into_resume(self, task: TaskId) -> Resume {
        match self.into_result(task) {
            Ok(value) => Resume::Value(value),
            Err(error) => Resume::Error(error),
        }
    }
}
