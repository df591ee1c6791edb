//! Runtime errors.

use crate::runtime::task::TaskId;

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while running a task tree.
///
/// Errors are ordinary values: they are delivered at the join point of the
/// failing task (and of its failing ancestors), never raised globally.
/// `Error` is cheap to clone so that every joiner can receive its own copy.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The resolver could not classify an operation value.
    #[error("unrecognized operation: {shape}")]
    Classification {
        /// Description of the value that failed classification.
        shape: String,
    },

    /// A task was spawned under a scope that had already settled.
    #[error("scope {scope} is closed")]
    ScopeClosed {
        /// The terminal scope.
        scope: TaskId,
    },

    /// An error raised from an operation's own logic (or its teardown).
    #[error(transparent)]
    Body(BodyError),

    /// The joined task was halted before it produced a value.
    #[error("task {task} was halted")]
    Halted {
        /// The halted task.
        task: TaskId,
    },

    /// A coroutine produced a step that is not valid where it was produced.
    #[error("invalid step: {reason}")]
    InvalidStep {
        /// What was wrong with the step.
        reason: &'static str,
    },

    /// `block_on` ran out of work while its task was still suspended and
    /// nothing outside the runtime could ever wake it.
    #[error("deadlock: task {task} is suspended and nothing can wake it")]
    Deadlock {
        /// The task `block_on` was waiting for.
        task: TaskId,
    },

    /// The configured tick limit was exceeded.
    #[error("runtime exceeded its limit of {limit} ticks")]
    Stalled {
        /// The configured limit.
        limit: usize,
    },
}

impl Error {
    /// Creates a body error carrying only a message.
    ///
    /// ```rust,ignore
    /// let err = Error::msg("boom");
    /// assert_eq!(err.to_string(), "boom");
    /// ```
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        let boxed: Box<dyn StdError> = message.into();
        Self::Body(BodyError(Rc::from(boxed)))
    }

    /// Wraps an arbitrary error raised by an operation.
    pub fn body<E: StdError + 'static>(error: E) -> Self {
        Self::Body(BodyError(Rc::new(error)))
    }

    /// Returns `true` for the halted-without-value signal.
    pub fn is_halted(&self) -> bool {
        matches!(self, Self::Halted { .. })
    }

    /// Borrows the wrapped body error as `E`, if that is what it is.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Body(body) => body.0.downcast_ref(),
            _ => None,
        }
    }
}

/// A shared, type-erased error raised by operation code.
#[derive(Clone)]
pub struct BodyError(Rc<dyn StdError>);

impl fmt::Debug for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl StdError for BodyError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}
