use crate::error::Result;
use crate::runtime::task::{Outcome, TaskId};
use crate::value::Value;

use std::collections::VecDeque;
use std::mem;

/// One unit of scheduler work.
#[derive(Debug)]
pub(crate) enum Notice {
    /// Take the first step of a freshly spawned task.
    Start(TaskId),
    /// `child` settled; tell its scope.
    Settled {
        parent: TaskId,
        child: TaskId,
        outcome: Outcome,
    },
    /// A resource finished its setup.
    Provided {
        parent: TaskId,
        child: TaskId,
        value: Value,
    },
    /// A resolution or promise settled.
    External { task: TaskId, result: Result<Value> },
    /// A future's waker fired.
    Wake(TaskId),
    /// Cancel the task.
    Halt(TaskId),
}

/// FIFO of pending notices.
#[derive(Default)]
pub(crate) struct RunQueue {
    notices: VecDeque<Notice>,
}

impl RunQueue {
    pub(crate) fn push(&mut self, notice: Notice) {
        self.notices.push_back(notice);
    }

    /// Takes every notice queued so far. Notices pushed afterwards wait
    /// for the next batch.
    pub(crate) fn take_batch(&mut self) -> VecDeque<Notice> {
        mem::take(&mut self.notices)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }
}
