//! # Scopeline
//!
//! **Scopeline** is a structured-concurrency runtime: an operation algebra
//! plus a single-threaded task tree in which no task outlives its scope
//! and every acquired resource is released, even when an ancestor is
//! cancelled mid-flight.
//!
//! Work is described as [`Operation`]s of several shapes, all normalized
//! into one coroutine-driving contract:
//!
//! - **iterator**: a [`Coroutine`] yielding sub-operations, each of which
//!   runs as a child task,
//! - **resolution**: a one-shot callback initiator with optional cancel,
//! - **future**: any `Future<Output = Result<Value>>`,
//! - **promise**: a subscribe-on-settle value such as [`Promise`],
//! - **resource**: a setup/teardown body that provides a value to its
//!   consumer and is released when the consumer's scope closes,
//! - **absent**, **function** and duck-typed **dynamic** operands.
//!
//! Cancellation ("halting") is cooperative and deterministic: children are
//! halted in reverse spawn order and a task is terminal only once all of
//! its children are.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scopeline::{Operation, Resume, Runtime, Step, Value, coroutine};
//!
//! let rt = Runtime::new();
//!
//! let value = rt.block_on(Operation::iterator(coroutine::from_fn(|task, input| {
//!     match input {
//!         Resume::Start => {
//!             let child = task.spawn(Operation::ready(Value::new(20)));
//!             Step::Yield(child.join())
//!         }
//!         Resume::Value(v) => Step::ret(v.get::<i32>().unwrap_or_default() * 2),
//!         Resume::Error(e) => Step::Throw(e),
//!     }
//! })))?;
//!
//! assert_eq!(value.get::<i32>(), Some(40));
//! ```
//!
//! ## Modules
//!
//! - [`operation`]: the operation algebra and coroutine contract
//! - [`task`]: task handles, states and outcomes
//! - [`inspect`]: the introspection event feed
//! - [`labels`]: descriptive task metadata

mod combinators;
mod error;
mod runtime;
mod utils;
mod value;

pub mod inspect;
pub mod labels;
pub mod operation;

pub use combinators::{all, race};
pub use error::{BodyError, Error, Result};
pub use labels::{LabelValue, Labels};
pub use operation::{
    Cancel, Contracts, Coroutine, Deferred, Operand, Operation, Promise, Resolution, Resource,
    Resume, Step, Thenable, coroutine,
};
pub use runtime::Runtime;
pub use runtime::builder::RuntimeBuilder;
pub use runtime::task;
pub use task::{HaltSignal, Outcome, Settle, Task, TaskId, TaskState};
pub use value::Value;
