use super::state::{Outcome, TaskState};
use crate::error::Error;
use crate::labels::Labels;
use crate::operation::{Cancel, Coroutine, LocalFuture, OperationKind};
use crate::utils::ArenaIndex;
use crate::value::Value;

use serde::{Serialize, Serializer};
use tracing::warn;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::Rc;

/// Identifies a task within its runtime.
///
/// Ids are generational: once a task settles and its slot is reused, the
/// old id no longer refers to anything.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) ArenaIndex);

impl TaskId {
    /// The id handed to tasks that never entered a runtime.
    pub(crate) const fn dangling() -> Self {
        Self(ArenaIndex::new(u32::MAX, u32::MAX))
    }

    /// Packs the id into a single integer (generation in the high half).
    pub fn as_u64(self) -> u64 {
        (u64::from(self.0.generation()) << 32) | u64::from(self.0.index())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0.index(), self.0.generation())
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({self})")
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_u64())
    }
}

type Watcher = Box<dyn FnOnce(&Outcome)>;

/// The part of a task that outlives its arena record.
///
/// Handles keep the cell alive, so a settled task can still report its
/// labels and outcome after the scheduler has reclaimed its slot.
pub(crate) struct TaskCell {
    pub(crate) id: TaskId,
    pub(crate) parent: Option<TaskId>,
    pub(crate) labels: Labels,
    pub(crate) state: Cell<TaskState>,
    pub(crate) outcome: RefCell<Option<Outcome>>,
    watchers: RefCell<Vec<(u64, Watcher)>>,
    next_watcher: Cell<u64>,
}

impl TaskCell {
    pub(crate) fn new(id: TaskId, parent: Option<TaskId>, labels: Labels) -> Self {
        Self {
            id,
            parent,
            labels,
            state: Cell::new(TaskState::Pending),
            outcome: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
            next_watcher: Cell::new(0),
        }
    }

    /// A cell that settled before it ever ran.
    pub(crate) fn closed(scope: TaskId, labels: Labels) -> Self {
        let cell = Self::new(TaskId::dangling(), Some(scope), labels);
        cell.state.set(TaskState::Errored);
        *cell.outcome.borrow_mut() = Some(Outcome::Errored(Error::ScopeClosed { scope }));
        cell
    }

    pub(crate) fn state(&self) -> TaskState {
        self.state.get()
    }

    pub(crate) fn outcome(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }

    /// Calls `watcher` once the task settles.
    ///
    /// If the task already settled, `watcher` runs now and `None` is
    /// returned; otherwise the returned key can be passed to `unwatch`.
    pub(crate) fn watch(&self, watcher: impl FnOnce(&Outcome) + 'static) -> Option<u64> {
        if let Some(outcome) = self.outcome() {
            watcher(&outcome);
            return None;
        }

        let key = self.next_watcher.get();
        self.next_watcher.set(key + 1);
        self.watchers.borrow_mut().push((key, Box::new(watcher)));
        Some(key)
    }

    pub(crate) fn unwatch(&self, key: u64) {
        self.watchers.borrow_mut().retain(|(k, _)| *k != key);
    }

    /// Records the terminal outcome and notifies every watcher.
    pub(crate) fn settle(&self, outcome: &Outcome) {
        self.state.set(outcome.state());
        *self.outcome.borrow_mut() = Some(outcome.clone());

        let watchers = mem::take(&mut *self.watchers.borrow_mut());
        for (_, watcher) in watchers {
            watcher(outcome);
        }
    }
}

/// Where a task is in its shutdown sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// The task's own operation is in control.
    Body,
    /// The body was interrupted; waiting for children before teardown.
    Draining,
    /// The task's own teardown is running.
    Teardown,
    /// Nothing left to run; waiting for children before settling.
    Closing,
}

/// What a coroutine-driven task is in the middle of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Plain,
    /// A resource body that has not provided its value yet.
    Setup,
    /// A resource body parked past its provide step.
    Provided,
}

pub(crate) struct Drive {
    pub(crate) body: Box<dyn Coroutine>,
    pub(crate) awaiting: Option<TaskId>,
    pub(crate) role: Role,
}

/// The runtime-private driver of a task's operation.
pub(crate) enum Controller {
    /// Spawned but not classified yet.
    Unresolved(OperationKind),
    /// The runtime's root scope; it only hosts children.
    Root,
    /// Nothing left to drive.
    Idle,
    /// Temporarily moved out while user code runs.
    Busy,
    Coroutine(Drive),
    Resolution {
        armed: Rc<Cell<bool>>,
        cancel: Option<Cancel>,
    },
    Promise {
        armed: Rc<Cell<bool>>,
    },
    Future {
        future: LocalFuture,
    },
}

impl Controller {
    pub(crate) fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    pub(crate) fn is_future(&self) -> bool {
        matches!(self, Self::Future { .. })
    }

    pub(crate) fn awaits(&self, child: TaskId) -> bool {
        matches!(self, Self::Coroutine(drive) if drive.awaiting == Some(child))
    }
}

/// The scheduler's record of a live task.
pub(crate) struct TaskRecord {
    pub(crate) cell: Rc<TaskCell>,
    /// Live children in spawn order.
    pub(crate) children: Vec<TaskId>,
    pub(crate) controller: Controller,
    pub(crate) phase: Phase,
    pub(crate) primary: Option<Error>,
    pub(crate) secondary: Option<Error>,
    pub(crate) value: Option<Value>,
    /// Set when a halt took effect while the body was still in control.
    pub(crate) halted: bool,
}

impl TaskRecord {
    pub(crate) fn new(cell: Rc<TaskCell>, controller: Controller) -> Self {
        Self {
            cell,
            children: Vec::new(),
            controller,
            phase: Phase::Body,
            primary: None,
            secondary: None,
            value: None,
            halted: false,
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.cell.id
    }

    /// Records an error raised after the body stopped.
    ///
    /// The first such error is kept; it only decides the outcome when
    /// there is no primary error.
    pub(crate) fn demote(&mut self, error: Error) {
        if self.primary.is_some() {
            warn!(task = %self.id(), %error, "teardown error demoted to secondary");
        }
        if self.secondary.is_none() {
            self.secondary = Some(error);
        } else {
            warn!(task = %self.id(), %error, "additional teardown error dropped");
        }
    }

    /// The outcome this record settles with.
    ///
    /// A primary error wins over everything; a teardown error wins over a
    /// halt; a halt wins over the body's value.
    pub(crate) fn outcome(&mut self) -> Outcome {
        if let Some(error) = self.primary.take() {
            return Outcome::Errored(error);
        }
        if let Some(error) = self.secondary.take() {
            return Outcome::Errored(error);
        }
        if self.halted {
            return Outcome::Halted;
        }
        Outcome::Completed(self.value.take().unwrap_or_default())
    }
}
