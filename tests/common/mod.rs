#![allow(dead_code)]

use scopeline::{Coroutine, Operation, Resume, Step, Task, Value, coroutine};

use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;

/// Routes scheduler logs to the test output. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A shared, ordered record of what happened.
#[derive(Clone, Default)]
pub struct Log(Rc<RefCell<Vec<String>>>);

impl Log {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.borrow().iter().position(|e| e == entry)
    }
}

/// Suspends until halted, logging `"<name> teardown"` when it is.
pub fn sleeper(name: &str, log: &Log) -> Operation {
    let name = name.to_owned();
    let teardown = format!("{name} teardown");
    let log = log.clone();

    Operation::iterator(
        coroutine::from_fn(|_task, input| match input {
            Resume::Start => Step::Yield(Operation::suspend()),
            Resume::Value(v) => Step::Return(v),
            Resume::Error(e) => Step::Throw(e),
        })
        .on_halt(move |_task| {
            log.push(teardown.clone());
            Step::done()
        }),
    )
    .named(name)
}

/// A coroutine that yields `operation` and returns whatever it produced.
pub fn await_op(operation: Operation) -> Operation {
    let mut operation = Some(operation);
    Operation::iterator(coroutine::from_fn(move |_task, input| match input {
        Resume::Start => Step::Yield(operation.take().unwrap_or_default()),
        Resume::Value(v) => Step::Return(v),
        Resume::Error(e) => Step::Throw(e),
    }))
}

/// Builds a coroutine from a closure that only cares about starting.
pub fn on_start<F>(mut start: F) -> impl Coroutine
where
    F: FnMut(&Task) -> Step,
{
    coroutine::from_fn(move |task, input| match input {
        Resume::Start => start(task),
        Resume::Value(v) => Step::Return(v),
        Resume::Error(e) => Step::Throw(e),
    })
}

pub fn int(value: &Value) -> i64 {
    value.get::<i64>().unwrap_or(-1)
}
