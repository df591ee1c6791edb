use crate::error::{Error, Result};
use crate::value::Value;

use super::Thenable;

use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

type Subscriber = Box<dyn FnOnce(Result<Value>)>;

enum State {
    Pending(Vec<Subscriber>),
    Settled(Result<Value>),
}

/// A single-assignment value that operations can wait on.
///
/// A `Promise` is settled exactly once through its [`Deferred`]. Any number
/// of operations may wait on clones of the same promise; each receives the
/// settled result. Settling from outside the runtime is the usual way to
/// feed external events into a task tree.
///
/// # Examples
///
/// ```rust,ignore
/// let (promise, deferred) = Promise::pending();
/// let task = rt.spawn(promise.into());
///
/// deferred.resolve(Value::new("event"));
/// rt.run()?;
/// ```
#[derive(Clone)]
pub struct Promise {
    state: Rc<RefCell<State>>,
}

/// The settling half of a [`Promise`].
#[derive(Clone)]
pub struct Deferred {
    state: Rc<RefCell<State>>,
}

impl Promise {
    /// Creates an unsettled promise and the handle that settles it.
    pub fn pending() -> (Promise, Deferred) {
        let state = Rc::new(RefCell::new(State::Pending(Vec::new())));
        (
            Promise {
                state: state.clone(),
            },
            Deferred { state },
        )
    }

    /// Creates a promise already resolved with `value`.
    pub fn resolved(value: Value) -> Promise {
        Promise {
            state: Rc::new(RefCell::new(State::Settled(Ok(value)))),
        }
    }

    /// Creates a promise already rejected with `error`.
    pub fn rejected(error: Error) -> Promise {
        Promise {
            state: Rc::new(RefCell::new(State::Settled(Err(error)))),
        }
    }

    /// Returns `true` once the promise has been settled.
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.borrow(), State::Settled(_))
    }

    /// Calls `f` with the result once the promise settles.
    ///
    /// If the promise is already settled, `f` runs immediately.
    pub fn then(&self, f: impl FnOnce(Result<Value>) + 'static) {
        let settled = match &mut *self.state.borrow_mut() {
            State::Pending(subscribers) => {
                subscribers.push(Box::new(f));
                return;
            }
            State::Settled(result) => result.clone(),
        };
        f(settled);
    }
}

impl Deferred {
    /// Resolves the promise. Returns `false` if it was already settled.
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Rejects the promise. Returns `false` if it was already settled.
    pub fn reject(&self, error: Error) -> bool {
        self.settle(Err(error))
    }

    /// Settles the promise. Returns `false` if it was already settled.
    pub fn settle(&self, result: Result<Value>) -> bool {
        let subscribers = {
            let mut state = self.state.borrow_mut();
            if let State::Settled(_) = &*state {
                return false;
            }
            match mem::replace(&mut *state, State::Settled(result.clone())) {
                State::Pending(subscribers) => subscribers,
                State::Settled(_) => Vec::new(),
            }
        };

        // Subscribers run without the state borrowed so they may inspect
        // or clone the promise.
        for subscriber in subscribers {
            subscriber(result.clone());
        }
        true
    }
}

impl Thenable for Promise {
    fn subscribe(self: Box<Self>, on_settle: Box<dyn FnOnce(Result<Value>)>) {
        self.then(on_settle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::Cell;

    #[test]
    fn subscribers_run_once_on_settle() {
        let (promise, deferred) = Promise::pending();
        let seen = Rc::new(Cell::new(0));

        let s = seen.clone();
        promise.then(move |r| s.set(r.ok().and_then(|v| v.get::<i32>()).unwrap_or(-1)));
        assert_eq!(seen.get(), 0);

        assert!(deferred.resolve(Value::new(7)));
        assert_eq!(seen.get(), 7);
        assert!(!deferred.resolve(Value::new(8)));
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn late_subscribers_see_the_settled_result() {
        let promise = Promise::rejected(Error::msg("nope"));
        let seen = Rc::new(RefCell::new(String::new()));

        let s = seen.clone();
        promise.then(move |r| {
            if let Err(e) = r {
                *s.borrow_mut() = e.to_string();
            }
        });

        assert!(promise.is_settled());
        assert_eq!(&*seen.borrow(), "nope");
    }
}
