//! Shutdown of a task: stopping its body, halting its children in reverse
//! spawn order, running its teardown and settling it.
//!
//! ```text
//!            halt / child failure            children terminal
//!   Body ──────────────────────────▶ Draining ─────────────────▶ Teardown
//!    │                                                              │
//!    │ body returned / threw                     teardown returned │
//!    ▼                                                              ▼
//!  Closing ◀────────────────────────────────────────────────────────┘
//!    │ children terminal
//!    ▼
//!  settled (record reclaimed, scope notified)
//! ```

use super::queue::Notice;
use super::scheduler::Signal;
use super::shared::Shared;
use super::task::core::{Controller, Phase, Role, TaskId};
use super::task::{Outcome, TaskState};
use crate::error::{Error, Result};
use crate::inspect::EventKind;
use crate::operation::Resume;
use crate::value::Value;

use tracing::{debug, trace};

use std::mem;
use std::rc::Rc;

impl Shared {
    /// Processes a halt request. Only the first request that finds the
    /// body in control has any effect.
    pub(crate) fn halt(self: &Rc<Self>, id: TaskId) {
        let begun = self.with_record(id, |record| {
            if record.phase != Phase::Body {
                return None;
            }
            record.halted = true;

            // A task that never started has nothing to tear down.
            let dropped = if record.cell.state() == TaskState::Pending {
                record.phase = Phase::Closing;
                Some(mem::replace(&mut record.controller, Controller::Idle))
            } else {
                record.phase = Phase::Draining;
                None
            };
            record.cell.state.set(TaskState::Halting);
            Some((record.cell.clone(), dropped))
        });
        let Some((cell, dropped)) = begun.flatten() else {
            return;
        };
        drop(dropped);

        debug!(task = %id, labels = %cell.labels, "halting");
        self.emit(EventKind::HaltingBegun, &cell, None);
        self.halt_children(id);
        self.advance(id);
    }

    /// Stops the body of `id` because an unawaited child failed.
    pub(crate) fn fail(self: &Rc<Self>, id: TaskId, error: Error) {
        let begun = self.with_record(id, |record| {
            if record.phase != Phase::Body {
                record.demote(error);
                return None;
            }
            debug!(task = %id, %error, "child failure stops the scope");
            record.primary = Some(error);
            record.phase = Phase::Draining;
            record.cell.state.set(TaskState::Halting);
            Some(record.cell.clone())
        });

        if let Some(Some(cell)) = begun {
            self.emit(EventKind::HaltingBegun, &cell, None);
            self.halt_children(id);
        }
        self.advance(id);
    }

    /// The body finished on its own.
    pub(crate) fn body_done(self: &Rc<Self>, id: TaskId, result: Result<Value>) {
        let controller = self.with_record(id, |record| {
            match result {
                Ok(value) => record.value = Some(value),
                Err(error) if record.primary.is_none() => record.primary = Some(error),
                Err(error) => record.demote(error),
            }
            record.phase = Phase::Closing;
            mem::replace(&mut record.controller, Controller::Idle)
        });
        drop(controller);

        self.halt_children(id);
        self.advance(id);
    }

    /// Queues a halt for every live child, last spawned first.
    fn halt_children(&self, id: TaskId) {
        let children = self
            .with_record(id, |record| record.children.clone())
            .unwrap_or_default();

        for child in children.into_iter().rev() {
            self.push(Notice::Halt(child));
        }
    }

    /// Moves `id` on once its last child is terminal.
    pub(crate) fn advance(self: &Rc<Self>, id: TaskId) {
        let phase = self
            .with_record(id, |record| record.children.is_empty().then_some(record.phase))
            .flatten();

        match phase {
            Some(Phase::Draining) => self.start_teardown(id),
            Some(Phase::Closing) => self.finalize(id),
            _ => {}
        }
    }

    fn start_teardown(self: &Rc<Self>, id: TaskId) {
        let controller = self.with_record(id, |record| {
            record.phase = Phase::Teardown;
            mem::replace(&mut record.controller, Controller::Busy)
        });
        let Some(controller) = controller else {
            return;
        };
        trace!(task = %id, "teardown started");

        match controller {
            Controller::Coroutine(mut drive) => {
                // A provided resource continues past its provide step;
                // anything else is forced to return.
                let signal = match drive.role {
                    Role::Provided => Signal::Resume(Resume::Value(Value::none())),
                    Role::Plain | Role::Setup => Signal::Halt,
                };
                drive.awaiting = None;
                self.install(id, Controller::Coroutine(drive));
                self.drive(id, signal);
            }
            Controller::Resolution { armed, cancel } => {
                armed.set(false);
                if let Some(cancel) = cancel {
                    cancel();
                }
                self.teardown_done(id, Ok(Value::none()));
            }
            Controller::Promise { armed } => {
                armed.set(false);
                self.teardown_done(id, Ok(Value::none()));
            }
            other => {
                drop(other);
                self.teardown_done(id, Ok(Value::none()));
            }
        }
    }

    /// The task's own teardown settled.
    pub(crate) fn teardown_done(self: &Rc<Self>, id: TaskId, result: Result<Value>) {
        let controller = self.with_record(id, |record| {
            if let Err(error) = result {
                record.demote(error);
            }
            record.phase = Phase::Closing;
            mem::replace(&mut record.controller, Controller::Idle)
        });
        drop(controller);

        self.halt_children(id);
        self.advance(id);
    }

    /// Settles `id`: reclaims its record, notifies watchers and tells its
    /// scope.
    pub(crate) fn finalize(self: &Rc<Self>, id: TaskId) {
        let removed = self.tasks.borrow_mut().remove(id.0);
        let Some(mut record) = removed else {
            return;
        };

        let outcome = record.outcome();
        let cell = record.cell.clone();
        drop(record);

        let (kind, error) = match &outcome {
            Outcome::Completed(_) => (EventKind::Completed, None),
            Outcome::Errored(error) => (EventKind::Errored, Some(error.to_string())),
            Outcome::Halted => (EventKind::Halted, None),
        };
        debug!(
            task = %id,
            state = ?outcome.state(),
            labels = %cell.labels,
            error = error.as_deref(),
            "task settled"
        );

        cell.settle(&outcome);
        self.emit(kind, &cell, error);

        if let Some(parent) = cell.parent {
            self.push(Notice::Settled {
                parent,
                child: id,
                outcome,
            });
        }
    }
}
