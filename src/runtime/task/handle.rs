use super::core::{TaskCell, TaskId};
use super::state::{Outcome, TaskState};
use crate::error::Result;
use crate::labels::Labels;
use crate::operation::{Cancel, Operation, Resolution};
use crate::runtime::queue::Notice;
use crate::runtime::shared::Shared;
use crate::value::Value;

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

/// A handle to a task.
///
/// A task is also the scope of everything spawned through it. Handles are
/// cheap to clone and stay valid after the task settles: the outcome and
/// labels remain readable for as long as any handle exists.
///
/// # Examples
///
/// ```rust,ignore
/// let rt = Runtime::new();
/// let task = rt.spawn(Operation::ready(Value::new(7)));
///
/// rt.run()?;
/// assert_eq!(task.state(), TaskState::Completed);
/// ```
#[derive(Clone)]
pub struct Task {
    pub(crate) cell: Rc<TaskCell>,
    pub(crate) shared: Weak<Shared>,
}

impl Task {
    pub(crate) fn new(cell: Rc<TaskCell>, shared: Weak<Shared>) -> Self {
        Self { cell, shared }
    }

    pub fn id(&self) -> TaskId {
        self.cell.id
    }

    /// The id of the scope this task was spawned under.
    pub fn parent_id(&self) -> Option<TaskId> {
        self.cell.parent
    }

    pub fn labels(&self) -> &Labels {
        &self.cell.labels
    }

    pub fn name(&self) -> Option<&str> {
        self.cell.labels.name()
    }

    pub fn state(&self) -> TaskState {
        self.cell.state()
    }

    /// The outcome, once the task is terminal.
    pub fn outcome(&self) -> Option<Outcome> {
        self.cell.outcome()
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Ids of the live children, in spawn order.
    pub fn children(&self) -> Vec<TaskId> {
        let Some(shared) = self.shared.upgrade() else {
            return Vec::new();
        };
        let tasks = shared.tasks.borrow();
        tasks
            .get(self.id().0)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    /// Spawns `operation` as a child of this task.
    ///
    /// The child never runs inline: its first step happens on a later
    /// scheduler tick. Spawning never fails here. Under a scope that has
    /// already settled the returned task is born `Errored` with
    /// [`Error::ScopeClosed`](crate::Error::ScopeClosed), which surfaces
    /// when it is joined.
    pub fn spawn(&self, operation: impl Into<Operation>) -> Task {
        self.spawn_with(operation, Labels::new())
    }

    /// Like [`spawn`](Self::spawn), layering `labels` over the operation's
    /// own labels.
    pub fn spawn_with(&self, operation: impl Into<Operation>, labels: Labels) -> Task {
        match self.shared.upgrade() {
            Some(shared) => shared.create_task(Some(self.id()), operation.into(), labels),
            None => {
                let (own, _) = operation.into().into_parts();
                Task::new(
                    Rc::new(TaskCell::closed(self.id(), own.merge(labels))),
                    Weak::new(),
                )
            }
        }
    }

    /// An operation that settles with this task's outcome.
    ///
    /// Joining a halted task fails with [`Error::Halted`](crate::Error::Halted).
    pub fn join(&self) -> Operation {
        Operation::resolution(Join {
            target: self.cell.clone(),
        })
        .with_labels(Labels::named("join").with("task", self.id().to_string()))
    }

    /// Requests cancellation of this task and its whole subtree.
    ///
    /// Halting is idempotent and asynchronous: the returned signal
    /// completes once the task is terminal. Halting a terminal task does
    /// nothing and returns an already complete signal.
    ///
    /// A task that has not started yet is closed on the spot, so its
    /// queued start finds nothing to run.
    pub fn halt(&self) -> HaltSignal {
        if let Some(shared) = self.shared.upgrade() {
            match self.state() {
                TaskState::Pending => shared.halt(self.id()),
                state if !state.is_terminal() => shared.push(Notice::Halt(self.id())),
                _ => {}
            }
        }
        HaltSignal {
            target: self.cell.clone(),
        }
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for Task {}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("labels", &self.cell.labels)
            .field("state", &self.state())
            .finish()
    }
}

/// Completion signal of a halt request. See [`Task::halt`].
///
/// Yield it (it converts into an [`Operation`]) to wait until the target
/// is terminal, or poll [`is_complete`](Self::is_complete).
#[derive(Clone)]
pub struct HaltSignal {
    target: Rc<TaskCell>,
}

impl HaltSignal {
    pub fn task_id(&self) -> TaskId {
        self.target.id
    }

    /// Returns `true` once the halted task is terminal.
    pub fn is_complete(&self) -> bool {
        self.target.state().is_terminal()
    }
}

impl fmt::Debug for HaltSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HaltSignal")
            .field("task", &self.task_id())
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl From<HaltSignal> for Operation {
    fn from(signal: HaltSignal) -> Self {
        let label = signal.task_id().to_string();
        Operation::resolution(Settled {
            target: signal.target,
        })
        .with_labels(Labels::named("halt").with("task", label))
    }
}

/// The one-shot settle handle passed to a [`Resolution`].
///
/// Only the first call to `resolve`, `reject` or `settle` has an effect,
/// and none has any once the owning task started tearing down.
#[derive(Clone)]
pub struct Settle {
    task: TaskId,
    armed: Rc<Cell<bool>>,
    shared: Weak<Shared>,
}

impl Settle {
    pub(crate) fn new(task: TaskId, armed: Rc<Cell<bool>>, shared: Weak<Shared>) -> Self {
        Self {
            task,
            armed,
            shared,
        }
    }

    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: crate::Error) -> bool {
        self.settle(Err(error))
    }

    /// Settles the owning task. Returns `false` if this had no effect.
    pub fn settle(&self, result: Result<Value>) -> bool {
        if !self.armed.replace(false) {
            return false;
        }
        match self.shared.upgrade() {
            Some(shared) => {
                shared.push(Notice::External {
                    task: self.task,
                    result,
                });
                true
            }
            None => false,
        }
    }

    /// Returns `true` while settling would still have an effect.
    pub fn is_armed(&self) -> bool {
        self.armed.get()
    }
}

impl fmt::Debug for Settle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("task", &self.task)
            .field("armed", &self.is_armed())
            .finish()
    }
}

struct Join {
    target: Rc<TaskCell>,
}

impl Resolution for Join {
    fn perform(self: Box<Self>, settle: Settle) -> Option<Cancel> {
        let id = self.target.id;
        let key = self
            .target
            .watch(move |outcome| {
                settle.settle(outcome.clone().into_result(id));
            })?;

        let target = self.target;
        Some(Box::new(move || target.unwatch(key)))
    }
}

struct Settled {
    target: Rc<TaskCell>,
}

impl Resolution for Settled {
    fn perform(self: Box<Self>, settle: Settle) -> Option<Cancel> {
        let key = self.target.watch(move |_| {
            settle.resolve(Value::none());
        })?;

        let target = self.target;
        Some(Box::new(move || target.unwatch(key)))
    }
}
