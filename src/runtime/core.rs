use super::builder::{Config, RuntimeBuilder};
use super::shared::Shared;
use super::task::Task;
use crate::error::{Error, Result};
use crate::inspect::Event;
use crate::labels::Labels;
use crate::operation::Operation;
use crate::value::Value;

use tracing::{debug, warn};

use std::fmt;
use std::rc::Rc;

/// The main runtime handle.
///
/// `Runtime` owns the task tree and the run queue. It is responsible for:
/// - hosting the root scope every top-level task is spawned under,
/// - driving the tree one breadth-first tick at a time,
/// - providing a synchronous entry point via [`block_on`](Self::block_on),
/// - exposing the introspection feed.
///
/// The runtime is single-threaded and not `Send`. Dropping it halts the
/// root scope and runs every pending teardown before returning.
pub struct Runtime {
    shared: Rc<Shared>,
    root: Task,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    pub fn new() -> Self {
        RuntimeBuilder::new().build()
    }

    /// Returns a builder for a configured runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub(crate) fn with_config(config: Config) -> Self {
        let shared = Rc::new(Shared::new(config));
        let root = shared.create_root();
        shared.feed.flush();

        Self { shared, root }
    }

    /// The root scope.
    pub fn root(&self) -> &Task {
        &self.root
    }

    /// Spawns `operation` under the root scope.
    ///
    /// Nothing runs until the runtime is driven by [`tick`](Self::tick),
    /// [`run`](Self::run) or [`block_on`](Self::block_on). Failures of
    /// root-level tasks never affect the root or their siblings; they are
    /// observed by joining the returned task.
    pub fn spawn(&self, operation: impl Into<Operation>) -> Task {
        self.spawn_with(operation, Labels::new())
    }

    /// Like [`spawn`](Self::spawn), layering `labels` over the operation's
    /// own labels.
    pub fn spawn_with(&self, operation: impl Into<Operation>, labels: Labels) -> Task {
        let task = self.root.spawn_with(operation, labels);
        self.shared.feed.flush();
        task
    }

    /// Runs a single tick: every notice queued before the call, and none
    /// queued during it. Returns the number of notices processed.
    pub fn tick(&self) -> usize {
        self.shared.tick()
    }

    /// Ticks until no notice is pending.
    ///
    /// Tasks still waiting on external events (promises, futures, pending
    /// callbacks) stay suspended; `run` does not wait for them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Stalled`] if the configured tick limit is exceeded.
    pub fn run(&self) -> Result<()> {
        let mut ticks = 0;
        while !self.shared.is_idle() {
            self.count_tick(&mut ticks)?;
            self.shared.tick();
        }
        Ok(())
    }

    /// Spawns `operation` under the root scope and drives the runtime until
    /// it settles, returning its outcome.
    ///
    /// While futures are outstanding and nothing else is runnable, the
    /// calling thread parks until one of their wakers fires.
    ///
    /// # Errors
    ///
    /// Returns the task's error, [`Error::Halted`] if it was halted,
    /// [`Error::Deadlock`] if it can never settle, or [`Error::Stalled`]
    /// if the tick limit is exceeded.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let rt = Runtime::new();
    /// let value = rt.block_on(Operation::ready(Value::new(42)))?;
    /// assert_eq!(value.get::<i32>(), Some(42));
    /// ```
    pub fn block_on(&self, operation: impl Into<Operation>) -> Result<Value> {
        let task = self.spawn(operation);
        self.drive_until(&task)?;

        match task.outcome() {
            Some(outcome) => outcome.into_result(task.id()),
            None => Err(Error::Deadlock { task: task.id() }),
        }
    }

    fn drive_until(&self, task: &Task) -> Result<()> {
        let mut ticks = 0;
        while !task.is_terminal() {
            if self.shared.is_idle() {
                if !self.shared.has_pending_futures() {
                    return Err(Error::Deadlock { task: task.id() });
                }
                self.shared.wakes.wait();
            }
            self.count_tick(&mut ticks)?;
            self.shared.tick();
        }
        Ok(())
    }

    fn count_tick(&self, ticks: &mut usize) -> Result<()> {
        *ticks += 1;
        match self.shared.config.max_ticks {
            Some(limit) if *ticks > limit => Err(Error::Stalled { limit }),
            _ => Ok(()),
        }
    }

    /// Registers a callback invoked with every introspection event, in
    /// order, from now on.
    pub fn subscribe(&self, subscriber: impl Fn(&Event) + 'static) {
        self.shared.feed.subscribe(Rc::new(subscriber));
    }

    /// The retained introspection history, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.shared.feed.history()
    }

    /// Number of tasks not yet settled, the root scope included.
    pub fn live_tasks(&self) -> usize {
        self.shared.tasks.borrow().len()
    }

    /// Halts the root scope and drives every teardown to completion.
    ///
    /// Calling it again is a no-op. Tasks spawned afterwards are born
    /// `Errored` with [`Error::ScopeClosed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Deadlock`] if some teardown waits on something that
    /// can never happen, or [`Error::Stalled`] if the tick limit is exceeded.
    pub fn shutdown(&self) -> Result<()> {
        if self.root.is_terminal() {
            return Ok(());
        }

        debug!(root = %self.root.id(), "runtime shutting down");
        self.root.halt();
        self.drive_until(&self.root)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("root", &self.root)
            .field("live_tasks", &self.live_tasks())
            .finish()
    }
}

impl Drop for Runtime {
    /// Shuts down the runtime.
    ///
    /// Halts the root scope and drives teardown until every task settled.
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(%error, "runtime dropped before its tasks settled");
        }
    }
}
