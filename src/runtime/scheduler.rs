//! The trampoline.
//!
//! Every piece of progress in the task tree is a [`Notice`] on the run
//! queue. A tick takes the notices queued before it began and processes
//! them in order; whatever they enqueue waits for the next tick. No notice
//! handler recurses into another task's step, so stack depth does not grow
//! with the depth or width of the tree.

use super::queue::Notice;
use super::shared::Shared;
use super::task::core::{Controller, Drive, Phase, Role, TaskId, TaskRecord};
use super::task::waker::make_waker;
use super::task::{Outcome, Settle, Task, TaskState};
use crate::error::{Error, Result};
use crate::inspect::EventKind;
use crate::labels::Labels;
use crate::operation::resolve::{Resolved, resolve};
use crate::operation::{Coroutine, Resume, Step};
use crate::value::Value;

use tracing::{debug, trace};

use std::cell::Cell;
use std::mem;
use std::rc::Rc;
use std::task::{Context, Poll};

/// How a coroutine is advanced.
pub(crate) enum Signal {
    Resume(Resume),
    Halt,
}

enum Next {
    Resume(Resume),
    Fail(Error),
    Advance,
}

impl Shared {
    /// Runs one breadth-first tick and returns how many notices it handled.
    pub(crate) fn tick(self: &Rc<Self>) -> usize {
        for task in self.wakes.drain() {
            self.push(Notice::Wake(task));
        }
        self.feed.flush();

        let batch = self.queue.borrow_mut().take_batch();
        let processed = batch.len();

        for notice in batch {
            trace!(?notice, "processing notice");
            self.process(notice);
            self.feed.flush();
        }
        processed
    }

    fn process(self: &Rc<Self>, notice: Notice) {
        match notice {
            Notice::Start(task) => self.start(task),
            Notice::Settled {
                parent,
                child,
                outcome,
            } => self.child_settled(parent, child, outcome),
            Notice::Provided {
                parent,
                child,
                value,
            } => self.provided(parent, child, value),
            Notice::External { task, result } => self.external_settled(task, result),
            Notice::Wake(task) => self.poll_future(task),
            Notice::Halt(task) => self.halt(task),
        }
    }

    /// Runs `f` on the record of `id`, if the task is still live.
    pub(crate) fn with_record<R>(
        &self,
        id: TaskId,
        f: impl FnOnce(&mut TaskRecord) -> R,
    ) -> Option<R> {
        self.tasks.borrow_mut().get_mut(id.0).map(f)
    }

    /// Puts a controller back after user code ran.
    pub(crate) fn install(&self, id: TaskId, controller: Controller) {
        let previous = self.with_record(id, |record| mem::replace(&mut record.controller, controller));
        drop(previous);
    }

    /// Moves a coroutine out of its record so it can run unborrowed.
    fn take_coroutine(self: &Rc<Self>, id: TaskId) -> Option<(Drive, Task)> {
        let taken = self.with_record(id, |record| {
            match mem::replace(&mut record.controller, Controller::Busy) {
                Controller::Coroutine(drive) => Some((drive, record.cell.clone())),
                other => {
                    record.controller = other;
                    None
                }
            }
        });
        let (drive, cell) = taken.flatten()?;
        Some((drive, self.handle(cell)))
    }

    fn start(self: &Rc<Self>, id: TaskId) {
        let taken = self.with_record(id, |record| {
            if record.cell.state() != TaskState::Pending {
                return None;
            }
            record.cell.state.set(TaskState::Running);
            match mem::replace(&mut record.controller, Controller::Busy) {
                Controller::Unresolved(kind) => Some((kind, record.cell.clone())),
                other => {
                    record.controller = other;
                    None
                }
            }
        });
        let Some((kind, cell)) = taken.flatten() else {
            return;
        };

        self.emit(EventKind::Started, &cell, None);
        let task = self.handle(cell);

        match resolve(kind, &task) {
            Err(error) => {
                debug!(task = %id, %error, "operation could not be resolved");
                self.body_done(id, Err(error));
            }
            Ok(Resolved::Absent) => self.body_done(id, Ok(Value::none())),
            Ok(Resolved::Iterator(body)) => self.begin_coroutine(id, body, Role::Plain),
            Ok(Resolved::Resource(resource)) => {
                let scope = task
                    .parent_id()
                    .and_then(|parent| self.task(parent))
                    .unwrap_or_else(|| task.clone());
                let body = resource.init(&scope, &task);
                self.begin_coroutine(id, body, Role::Setup);
            }
            Ok(Resolved::Resolution(resolution)) => {
                let armed = Rc::new(Cell::new(true));
                let settle = Settle::new(id, armed.clone(), Rc::downgrade(self));
                let cancel = resolution.perform(settle);
                self.install(id, Controller::Resolution { armed, cancel });
            }
            Ok(Resolved::Promise(promise)) => {
                let armed = Rc::new(Cell::new(true));
                let settle = Settle::new(id, armed.clone(), Rc::downgrade(self));
                promise.subscribe(Box::new(move |result| {
                    settle.settle(result);
                }));
                self.install(id, Controller::Promise { armed });
            }
            Ok(Resolved::Future(future)) => {
                self.install(id, Controller::Future { future });
                self.poll_future(id);
            }
        }
    }

    fn begin_coroutine(self: &Rc<Self>, id: TaskId, body: Box<dyn Coroutine>, role: Role) {
        let drive = Drive {
            body,
            awaiting: None,
            role,
        };
        self.install(id, Controller::Coroutine(drive));
        self.drive(id, Signal::Resume(Resume::Start));
    }

    /// Takes one coroutine step.
    pub(crate) fn drive(self: &Rc<Self>, id: TaskId, signal: Signal) {
        let Some((mut drive, task)) = self.take_coroutine(id) else {
            return;
        };

        let step = match signal {
            Signal::Resume(input) => drive.body.resume(&task, input),
            Signal::Halt => drive.body.halt(&task),
        };
        trace!(task = %id, ?step, "coroutine stepped");

        self.on_step(id, drive, step);
    }

    fn on_step(self: &Rc<Self>, id: TaskId, mut drive: Drive, step: Step) {
        let Some((phase, parent)) = self.with_record(id, |r| (r.phase, r.cell.parent)) else {
            return;
        };

        match step {
            Step::Yield(operation) => {
                let child = self.create_task(Some(id), operation, Labels::new());
                drive.awaiting = Some(child.id());
                self.install(id, Controller::Coroutine(drive));
            }
            Step::Provide(value) if phase == Phase::Body && drive.role == Role::Setup => {
                drive.role = Role::Provided;
                self.install(id, Controller::Coroutine(drive));
                if let Some(parent) = parent {
                    self.push(Notice::Provided {
                        parent,
                        child: id,
                        value,
                    });
                }
            }
            Step::Provide(_) => {
                drop(drive);
                let error = Error::InvalidStep {
                    reason: "provide outside of a resource's setup",
                };
                self.finish_step(id, phase, Err(error));
            }
            Step::Return(value) => {
                drop(drive);
                self.finish_step(id, phase, Ok(value));
            }
            Step::Throw(error) => {
                drop(drive);
                self.finish_step(id, phase, Err(error));
            }
        }
    }

    fn finish_step(self: &Rc<Self>, id: TaskId, phase: Phase, result: Result<Value>) {
        match phase {
            Phase::Teardown => self.teardown_done(id, result),
            _ => self.body_done(id, result),
        }
    }

    fn child_settled(self: &Rc<Self>, parent: TaskId, child: TaskId, outcome: Outcome) {
        let next = self.with_record(parent, |record| {
            record.children.retain(|c| *c != child);

            let awaited = record.controller.awaits(child);
            let resumable = matches!(record.phase, Phase::Body | Phase::Teardown);
            if awaited && resumable {
                if let Controller::Coroutine(drive) = &mut record.controller {
                    drive.awaiting = None;
                }
                return Next::Resume(outcome.into_resume(child));
            }

            let Outcome::Errored(error) = outcome else {
                return Next::Advance;
            };
            if record.controller.is_root() {
                debug!(task = %child, %error, "child of the root scope failed");
                return Next::Advance;
            }
            if record.phase == Phase::Body {
                return Next::Fail(error);
            }
            record.demote(error);
            Next::Advance
        });

        match next {
            Some(Next::Resume(input)) => self.drive(parent, Signal::Resume(input)),
            Some(Next::Fail(error)) => self.fail(parent, error),
            Some(Next::Advance) => self.advance(parent),
            None => {}
        }
    }

    fn provided(self: &Rc<Self>, parent: TaskId, child: TaskId, value: Value) {
        let resume = self.with_record(parent, |record| {
            if !matches!(record.phase, Phase::Body | Phase::Teardown) {
                return false;
            }
            match &mut record.controller {
                Controller::Coroutine(drive) if drive.awaiting == Some(child) => {
                    drive.awaiting = None;
                    true
                }
                _ => false,
            }
        });

        if resume == Some(true) {
            trace!(task = %parent, resource = %child, "resource ready");
            self.drive(parent, Signal::Resume(Resume::Value(value)));
        }
    }

    fn external_settled(self: &Rc<Self>, id: TaskId, result: Result<Value>) {
        let live = self.with_record(id, |record| {
            record.phase == Phase::Body
                && matches!(
                    record.controller,
                    Controller::Resolution { .. } | Controller::Promise { .. }
                )
        });

        if live == Some(true) {
            self.body_done(id, result);
        }
    }

    fn poll_future(self: &Rc<Self>, id: TaskId) {
        let taken = self.with_record(id, |record| {
            if record.phase != Phase::Body {
                return None;
            }
            match mem::replace(&mut record.controller, Controller::Busy) {
                Controller::Future { future } => Some(future),
                other => {
                    record.controller = other;
                    None
                }
            }
        });
        let Some(mut future) = taken.flatten() else {
            return;
        };

        let waker = make_waker(id, self.wakes.clone());
        let mut cx = Context::from_waker(&waker);

        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                drop(future);
                self.body_done(id, result);
            }
            Poll::Pending => self.install(id, Controller::Future { future }),
        }
    }
}
