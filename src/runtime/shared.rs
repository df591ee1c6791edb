use super::builder::Config;
use super::queue::{Notice, RunQueue};
use super::task::core::{Controller, Phase, TaskCell, TaskId, TaskRecord};
use super::task::waker::WakeQueue;
use super::task::{Task, TaskState};
use crate::error::Error;
use crate::inspect::{EventKind, Feed};
use crate::labels::Labels;
use crate::operation::Operation;
use crate::utils::Arena;

use tracing::debug;

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

/// State shared between the runtime and every task handle.
///
/// Each piece sits in its own cell and no borrow is ever held while
/// operation code runs, so that code may spawn, halt and inspect freely.
pub(crate) struct Shared {
    pub(crate) tasks: RefCell<Arena<TaskRecord>>,
    pub(crate) queue: RefCell<RunQueue>,
    pub(crate) wakes: Arc<WakeQueue>,
    pub(crate) feed: Feed,
    pub(crate) config: Config,
}

impl Shared {
    pub(crate) fn new(config: Config) -> Self {
        Self {
            tasks: RefCell::new(Arena::new()),
            queue: RefCell::new(RunQueue::default()),
            wakes: Arc::new(WakeQueue::default()),
            feed: Feed::new(config.event_history),
            config,
        }
    }

    pub(crate) fn push(&self, notice: Notice) {
        self.queue.borrow_mut().push(notice);
    }

    /// Returns `true` if neither the run queue nor the wake queue holds work.
    pub(crate) fn is_idle(&self) -> bool {
        self.queue.borrow().is_empty() && self.wakes.is_empty()
    }

    /// Returns `true` if some live task is driving a future, which a
    /// waker on another thread may still complete.
    pub(crate) fn has_pending_futures(&self) -> bool {
        self.tasks
            .borrow()
            .values()
            .any(|record| record.controller.is_future())
    }

    pub(crate) fn handle(self: &Rc<Self>, cell: Rc<TaskCell>) -> Task {
        Task::new(cell, Rc::downgrade(self))
    }

    /// Looks up the handle of a live task.
    pub(crate) fn task(self: &Rc<Self>, id: TaskId) -> Option<Task> {
        let cell = self.tasks.borrow().get(id.0)?.cell.clone();
        Some(self.handle(cell))
    }

    pub(crate) fn emit(&self, kind: EventKind, cell: &TaskCell, error: Option<String>) {
        self.feed
            .emit(kind, cell.id, cell.parent, cell.state(), &cell.labels, error);
    }

    /// Inserts the runtime's root scope. It is running from the start and
    /// only settles when the runtime shuts down.
    pub(crate) fn create_root(self: &Rc<Self>) -> Task {
        let labels = self.config.root_labels.clone();
        let cell = self.insert(None, labels, Controller::Root);
        cell.state.set(TaskState::Running);

        debug!(task = %cell.id, labels = %cell.labels, "root scope created");
        self.emit(EventKind::Created, &cell, None);
        self.emit(EventKind::Started, &cell, None);
        self.handle(cell)
    }

    /// Creates a child of `parent` running `operation`.
    ///
    /// The child's labels are the operation's own labels with `overrides`
    /// layered on top. Its first step is queued, never taken inline.
    pub(crate) fn create_task(
        self: &Rc<Self>,
        parent: Option<TaskId>,
        operation: Operation,
        overrides: Labels,
    ) -> Task {
        let (labels, kind) = operation.into_parts();
        let labels = labels.merge(overrides);

        let phase = match parent {
            Some(parent) => self.tasks.borrow().get(parent.0).map(|r| r.phase),
            None => Some(Phase::Body),
        };

        let Some(phase) = phase else {
            return self.create_closed(parent, labels);
        };

        let cell = self.insert(parent, labels, Controller::Unresolved(kind));
        debug!(
            task = %cell.id,
            parent = ?cell.parent,
            labels = %cell.labels,
            "task created"
        );
        self.emit(EventKind::Created, &cell, None);

        match phase {
            Phase::Body | Phase::Teardown => self.push(Notice::Start(cell.id)),
            // The scope is already shutting down.
            Phase::Draining | Phase::Closing => self.push(Notice::Halt(cell.id)),
        }

        self.handle(cell)
    }

    fn insert(&self, parent: Option<TaskId>, labels: Labels, controller: Controller) -> Rc<TaskCell> {
        let mut tasks = self.tasks.borrow_mut();
        let mut created = None;
        tasks.insert_with(|key| {
            let cell = Rc::new(TaskCell::new(TaskId(key), parent, labels));
            created = Some(cell.clone());
            TaskRecord::new(cell, controller)
        });

        let cell = match created {
            Some(cell) => cell,
            None => unreachable!("insert_with always runs its closure"),
        };

        if let Some(parent) = parent {
            if let Some(record) = tasks.get_mut(parent.0) {
                record.children.push(cell.id);
            }
        }
        cell
    }

    /// A task spawned under a settled scope: born `Errored`.
    fn create_closed(self: &Rc<Self>, parent: Option<TaskId>, labels: Labels) -> Task {
        let scope = parent.unwrap_or_else(TaskId::dangling);
        let cell = self.insert(parent, labels, Controller::Idle);
        debug!(task = %cell.id, %scope, "task spawned under a closed scope");

        self.emit(EventKind::Created, &cell, None);
        if let Some(record) = self.tasks.borrow_mut().get_mut(cell.id.0) {
            record.phase = Phase::Closing;
            record.primary = Some(Error::ScopeClosed { scope });
        }

        self.finalize(cell.id);
        self.handle(cell)
    }
}
