//! The operation algebra.
//!
//! An [`Operation`] is an immutable description of work. It comes in one of
//! six canonical shapes:
//!
//! - **absent**: nothing to do, settles immediately without a value,
//! - **iterator**: a [`Coroutine`] that yields sub-operations,
//! - **resolution**: a one-shot callback initiator ([`Resolution`]),
//! - **future**: a `std::future::Future` driven through a waker,
//! - **promise**: a subscribe-on-settle value ([`Thenable`], e.g. [`Promise`]),
//! - **resource**: a [`Resource`] with a setup phase and a teardown phase.
//!
//! Two more entry points feed into those shapes: *function* operations are
//! evaluated with the task that runs them, and *dynamic* operands expose
//! any subset of the contracts and are classified by fixed precedence (see
//! [`resolve`](self::resolve)). Nothing is classified at spawn time; a
//! value that satisfies no contract fails when its task first runs.

pub mod coroutine;
mod promise;
pub(crate) mod resolve;

pub use coroutine::{Coroutine, Resume, Step};
pub use promise::{Deferred, Promise};

use crate::error::{Error, Result};
use crate::labels::{LabelValue, Labels};
use crate::runtime::task::{Settle, Task};
use crate::value::Value;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// A thunk that cancels an in-flight resolution.
pub type Cancel = Box<dyn FnOnce()>;

/// The future shape accepted by [`Operation::future`].
pub type LocalFuture = Pin<Box<dyn Future<Output = Result<Value>>>>;

/// A callback-style initiator.
///
/// `perform` is invoked exactly once, when the task first runs. It must
/// eventually call [`Settle::resolve`] or [`Settle::reject`] (possibly
/// synchronously). If it returns a [`Cancel`] thunk, the thunk runs when
/// the task is halted before settling.
pub trait Resolution {
    fn perform(self: Box<Self>, settle: Settle) -> Option<Cancel>;
}

/// A subscribe-on-settle contract.
///
/// `subscribe` registers `on_settle`, which must be called at most once.
/// Calling it synchronously (for an already settled value) is allowed.
pub trait Thenable {
    fn subscribe(self: Box<Self>, on_settle: Box<dyn FnOnce(Result<Value>)>);
}

/// A value with an acquire/release lifecycle.
///
/// `init` returns a coroutine whose first [`Step::Provide`] ends the setup
/// phase: the consuming task resumes with the provided value. The rest of
/// the coroutine is parked and only resumed, to completion, when the
/// resource's task halts, which happens at the latest when the consumer's
/// scope shuts down.
///
/// `scope` is the consuming task; `local` is the task that runs the
/// resource itself, under which the resource may spawn helpers.
pub trait Resource {
    fn init(self: Box<Self>, scope: &Task, local: &Task) -> Box<dyn Coroutine>;
}

/// The contracts a dynamic operand satisfies.
///
/// A value may satisfy several contracts at once; the resolver picks one
/// by fixed precedence.
#[derive(Default)]
pub struct Contracts {
    pub absent: bool,
    pub iterator: Option<Box<dyn Coroutine>>,
    pub resolution: Option<Box<dyn Resolution>>,
    pub future: Option<LocalFuture>,
    pub promise: Option<Box<dyn Thenable>>,
    pub resource: Option<Box<dyn Resource>>,
}

/// A duck-typed operation value.
pub trait Operand {
    /// Exposes every contract this value satisfies.
    fn contracts(self: Box<Self>) -> Contracts;

    /// Labels carried by the value.
    fn labels(&self) -> Labels {
        Labels::default()
    }

    /// Describes the value in classification errors.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
}

pub(crate) enum OperationKind {
    Absent,
    Iterator(Box<dyn Coroutine>),
    Resolution(Box<dyn Resolution>),
    Future(LocalFuture),
    Promise(Box<dyn Thenable>),
    Resource(Box<dyn Resource>),
    Function(Box<dyn FnOnce(&Task) -> Operation>),
    Dynamic(Box<dyn Operand>),
}

impl OperationKind {
    fn shape(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Iterator(_) => "iterator",
            Self::Resolution(_) => "resolution",
            Self::Future(_) => "future",
            Self::Promise(_) => "promise",
            Self::Resource(_) => "resource",
            Self::Function(_) => "function",
            Self::Dynamic(_) => "dynamic",
        }
    }
}

/// A description of work that can be spawned, yielded or joined.
///
/// # Examples
///
/// ```rust,ignore
/// let rt = Runtime::new();
///
/// let answer = rt.block_on(Operation::iterator(coroutine::from_fn(|task, input| {
///     match input {
///         Resume::Start => Step::Yield(Operation::ready(Value::new(41))),
///         Resume::Value(v) => Step::ret(v.get::<i32>().unwrap_or_default() + 1),
///         Resume::Error(e) => Step::Throw(e),
///     }
/// })));
/// ```
pub struct Operation {
    labels: Labels,
    kind: OperationKind,
}

impl Operation {
    fn from_kind(kind: OperationKind) -> Self {
        Self {
            labels: Labels::default(),
            kind,
        }
    }

    /// An operation that does nothing and settles without a value.
    pub fn absent() -> Self {
        Self::from_kind(OperationKind::Absent)
    }

    /// Runs `body` as a coroutine.
    pub fn iterator(body: impl Coroutine + 'static) -> Self {
        Self::from_kind(OperationKind::Iterator(Box::new(body)))
    }

    /// Runs a [`Resolution`].
    pub fn resolution(resolution: impl Resolution + 'static) -> Self {
        Self::from_kind(OperationKind::Resolution(Box::new(resolution)))
    }

    /// Runs a closure as a [`Resolution`].
    ///
    /// ```rust,ignore
    /// let op = Operation::action(|settle| {
    ///     let id = register_callback(move |v| settle.resolve(Value::new(v)));
    ///     Some(Box::new(move || unregister(id)) as Cancel)
    /// });
    /// ```
    pub fn action<F>(perform: F) -> Self
    where
        F: FnOnce(Settle) -> Option<Cancel> + 'static,
    {
        Self::resolution(Action(perform))
    }

    /// Drives a future to completion.
    pub fn future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + 'static,
    {
        Self::from_kind(OperationKind::Future(Box::pin(future)))
    }

    /// Waits for a [`Thenable`].
    pub fn promise(promise: impl Thenable + 'static) -> Self {
        Self::from_kind(OperationKind::Promise(Box::new(promise)))
    }

    /// Acquires a [`Resource`].
    pub fn resource(resource: impl Resource + 'static) -> Self {
        Self::from_kind(OperationKind::Resource(Box::new(resource)))
    }

    /// Acquires a resource described by a closure.
    ///
    /// `init` receives the consuming scope and the resource's own task,
    /// exactly like [`Resource::init`].
    pub fn acquire<F>(init: F) -> Self
    where
        F: FnOnce(&Task, &Task) -> Box<dyn Coroutine> + 'static,
    {
        Self::resource(Acquire(init))
    }

    /// Defers building the operation until its task runs.
    ///
    /// `f` receives the task that will execute the returned operation,
    /// which makes it the natural place to spawn helpers.
    ///
    /// The task already exists when `f` runs, so labels on the returned
    /// operation are ignored. Label the function operation instead.
    pub fn function<F>(f: F) -> Self
    where
        F: FnOnce(&Task) -> Operation + 'static,
    {
        Self::from_kind(OperationKind::Function(Box::new(f)))
    }

    /// Wraps a duck-typed operand. Its labels become the operation's labels.
    pub fn dynamic(operand: impl Operand + 'static) -> Self {
        let labels = operand.labels();
        Self {
            labels,
            kind: OperationKind::Dynamic(Box::new(operand)),
        }
    }

    /// Settles immediately with `value`.
    pub fn ready(value: Value) -> Self {
        Self::action(move |settle| {
            settle.resolve(value);
            None
        })
    }

    /// Fails immediately with `error`.
    pub fn fail(error: Error) -> Self {
        Self::action(move |settle| {
            settle.reject(error);
            None
        })
    }

    /// Never settles on its own; only halting ends it.
    pub fn suspend() -> Self {
        Self::action(|_settle| None).named("suspend")
    }

    /// Sets the name label.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.labels.set_name(name);
        self
    }

    /// Adds a label.
    pub fn label(mut self, key: impl Into<String>, value: impl Into<LabelValue>) -> Self {
        self.labels.insert(key, value);
        self
    }

    /// Replaces all labels.
    pub fn with_labels(mut self, labels: Labels) -> Self {
        self.labels = labels;
        self
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    /// The shape this operation was built as (`"dynamic"` for operands
    /// that are only classified when they run).
    pub fn shape(&self) -> &'static str {
        self.kind.shape()
    }

    pub(crate) fn into_parts(self) -> (Labels, OperationKind) {
        (self.labels, self.kind)
    }
}

impl Default for Operation {
    fn default() -> Self {
        Self::absent()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("shape", &self.shape())
            .field("labels", &self.labels)
            .finish()
    }
}

impl From<Promise> for Operation {
    fn from(promise: Promise) -> Self {
        Self::promise(promise)
    }
}

impl From<Option<Operation>> for Operation {
    fn from(operation: Option<Operation>) -> Self {
        operation.unwrap_or_default()
    }
}

struct Acquire<F>(F);

impl<F> Resource for Acquire<F>
where
    F: FnOnce(&Task, &Task) -> Box<dyn Coroutine>,
{
    fn init(self: Box<Self>, scope: &Task, local: &Task) -> Box<dyn Coroutine> {
        (self.0)(scope, local)
    }
}

struct Action<F>(F);

impl<F> Resolution for Action<F>
where
    F: FnOnce(Settle) -> Option<Cancel>,
{
    fn perform(self: Box<Self>, settle: Settle) -> Option<Cancel> {
        (self.0)(settle)
    }
}
