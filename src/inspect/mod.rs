//! The introspection feed.
//!
//! Every task state transition is mirrored as an [`Event`], in the order the
//! transitions happen. External tools (an inspector rendering the live
//! task tree, a test asserting on lifecycle order) consume the feed either
//! by subscribing or by reading the bounded history kept by the runtime.
//!
//! Events implement [`serde::Serialize`] and are meant to be shipped as
//! JSON:
//!
//! ```json
//! {"seq":3,"task_id":4294967297,"parent_id":1,"kind":"Started",
//!  "state":"Running","name":"fetch","labels":{"attempt":2},
//!  "timestamp":1718000000000000}
//! ```

use crate::labels::Labels;
use crate::runtime::task::{TaskId, TaskState};

use serde::Serialize;

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The transition an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Created,
    Started,
    Completed,
    Errored,
    HaltingBegun,
    Halted,
}

/// One task state transition.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Position in the feed, starting at 0.
    pub seq: u64,
    pub task_id: TaskId,
    pub parent_id: Option<TaskId>,
    pub kind: EventKind,
    /// The task's state right after the transition.
    pub state: TaskState,
    #[serde(flatten)]
    pub labels: Labels,
    /// Wall clock time, in microseconds since the Unix epoch.
    pub timestamp: u64,
    /// Rendered error, for `Errored` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A feed subscriber.
pub type Subscriber = Rc<dyn Fn(&Event)>;

/// Ordered event stream with optional bounded history.
///
/// Events are staged while the scheduler mutates the tree and delivered
/// by [`flush`](Feed::flush), which the scheduler calls with no borrow of
/// its own state held, so subscribers may freely inspect tasks.
pub(crate) struct Feed {
    seq: Cell<u64>,
    staged: RefCell<VecDeque<Event>>,
    history: RefCell<VecDeque<Event>>,
    capacity: usize,
    subscribers: RefCell<Vec<Subscriber>>,
}

impl Feed {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            seq: Cell::new(0),
            staged: RefCell::new(VecDeque::new()),
            history: RefCell::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            subscribers: RefCell::new(Vec::new()),
        }
    }

    /// Stages an event for `task`.
    pub(crate) fn emit(
        &self,
        kind: EventKind,
        task_id: TaskId,
        parent_id: Option<TaskId>,
        state: TaskState,
        labels: &Labels,
        error: Option<String>,
    ) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);

        self.staged.borrow_mut().push_back(Event {
            seq,
            task_id,
            parent_id,
            kind,
            state,
            labels: labels.clone(),
            timestamp: now_micros(),
            error,
        });
    }

    /// Delivers staged events to history and subscribers, in order.
    pub(crate) fn flush(&self) {
        loop {
            let Some(event) = self.staged.borrow_mut().pop_front() else {
                return;
            };

            if self.capacity > 0 {
                let mut history = self.history.borrow_mut();
                if history.len() == self.capacity {
                    history.pop_front();
                }
                history.push_back(event.clone());
            }

            let subscribers = self.subscribers.borrow().clone();
            for subscriber in subscribers {
                subscriber(&event);
            }
        }
    }

    pub(crate) fn subscribe(&self, subscriber: Subscriber) {
        self.subscribers.borrow_mut().push(subscriber);
    }

    pub(crate) fn history(&self) -> Vec<Event> {
        self.history.borrow().iter().cloned().collect()
    }
}

impl fmt::Debug for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feed")
            .field("seq", &self.seq.get())
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscribers.borrow().len())
            .finish()
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
