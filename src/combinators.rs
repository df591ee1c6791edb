//! Operations composed from other operations.
//!
//! Both combinators are plain coroutines built on `spawn`, `join` and
//! scope shutdown; they need nothing from the scheduler beyond what any
//! user operation gets.

use crate::error::{Error, Result};
use crate::operation::{Cancel, Operation, Resolution, Resume, Step, coroutine};
use crate::runtime::task::{Outcome, Settle, Task};
use crate::value::Value;

use std::collections::VecDeque;

/// Runs every operation concurrently and settles like the first one that
/// settles. The others are halted before the race itself settles.
///
/// Each contender runs inside its own wrapper task that catches the
/// contender's error, so a loser failing later never fails the race.
///
/// A timeout is a race between an operation and a timer:
///
/// ```rust,ignore
/// let guarded = race([fetch(url), sleep(Duration::from_secs(5))]);
/// ```
///
/// Racing no operations fails with [`Error::InvalidStep`].
pub fn race(operations: impl IntoIterator<Item = Operation>) -> Operation {
    let mut operations: Vec<Operation> = operations.into_iter().collect();

    Operation::iterator(coroutine::from_fn(move |task, input| match input {
        Resume::Start => {
            if operations.is_empty() {
                return Step::Throw(Error::InvalidStep {
                    reason: "race of no operations",
                });
            }
            let contenders: Vec<Task> = operations
                .drain(..)
                .map(|op| task.spawn(contend(op)))
                .collect();
            Step::Yield(Operation::resolution(FirstSettled { contenders }).named("first settled"))
        }
        // Returning closes the scope, which halts the losers.
        Resume::Value(value) => Step::Return(value),
        Resume::Error(error) => Step::Throw(error),
    }))
    .named("race")
}

/// Runs every operation concurrently and completes with a `Vec<Value>` of
/// their values, in argument order.
///
/// The first failure fails the whole operation and halts the rest.
///
/// ```rust,ignore
/// let values = rt.block_on(all([load("a"), load("b")]))?;
/// let values = values.downcast_ref::<Vec<Value>>().unwrap();
/// ```
pub fn all(operations: impl IntoIterator<Item = Operation>) -> Operation {
    let mut operations: Vec<Operation> = operations.into_iter().collect();
    let mut pending: VecDeque<Task> = VecDeque::new();
    let mut values: Vec<Value> = Vec::new();

    Operation::iterator(coroutine::from_fn(move |task, input| {
        match input {
            Resume::Start => {
                pending = operations.drain(..).map(|op| task.spawn(op)).collect();
            }
            Resume::Value(value) => values.push(value),
            Resume::Error(error) => return Step::Throw(error),
        }

        match pending.pop_front() {
            Some(next) => Step::Yield(next.join()),
            None => Step::Return(Value::new(std::mem::take(&mut values))),
        }
    }))
    .named("all")
}

/// Awaits `operation` and completes with its `Result<Value>`, whichever
/// way it settled.
fn contend(operation: Operation) -> Operation {
    let mut operation = Some(operation);

    Operation::iterator(coroutine::from_fn(move |_task, input| {
        let result: Result<Value> = match input {
            Resume::Start => return Step::Yield(operation.take().unwrap_or_default()),
            Resume::Value(value) => Ok(value),
            Resume::Error(error) => Err(error),
        };
        Step::ret(result)
    }))
    .named("contender")
}

/// Settles with the result of whichever contender settles first.
struct FirstSettled {
    contenders: Vec<Task>,
}

impl Resolution for FirstSettled {
    fn perform(self: Box<Self>, settle: Settle) -> Option<Cancel> {
        let mut watches = Vec::with_capacity(self.contenders.len());

        for contender in &self.contenders {
            let settle = settle.clone();
            let id = contender.id();
            let key = contender.cell.watch(move |outcome| {
                let result = match outcome {
                    Outcome::Completed(value) => match value.downcast_ref::<Result<Value>>() {
                        Some(result) => result.clone(),
                        None => Ok(value.clone()),
                    },
                    other => other.clone().into_result(id),
                };
                settle.settle(result);
            });
            if let Some(key) = key {
                watches.push((contender.clone(), key));
            }
        }

        Some(Box::new(move || {
            for (contender, key) in watches {
                contender.cell.unwatch(key);
            }
        }))
    }
}
