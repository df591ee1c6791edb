mod common;

use common::{Log, int};
use scopeline::{
    Cancel, Contracts, Coroutine, Error, Labels, Operand, Operation, Promise, Resolution, Resource,
    Resume, Runtime, Settle, Step, Task, TaskState, Value, coroutine,
};

use std::cell::RefCell;
use std::future::poll_fn;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::task::{Poll, Waker};
use std::thread;
use std::time::Duration;

/// Satisfies both the iterator and the promise contract.
struct Ambiguous;

impl Operand for Ambiguous {
    fn contracts(self: Box<Self>) -> Contracts {
        Contracts {
            iterator: Some(Box::new(coroutine::from_fn(|_, _| Step::ret("iterator")))),
            promise: Some(Box::new(Promise::resolved(Value::new("promise")))),
            ..Contracts::default()
        }
    }

    fn labels(&self) -> Labels {
        Labels::named("ambiguous")
    }
}

struct Opaque;

impl Operand for Opaque {
    fn contracts(self: Box<Self>) -> Contracts {
        Contracts::default()
    }

    fn describe(&self) -> String {
        "opaque widget".to_owned()
    }
}

#[test]
fn test_iterator_contract_wins_over_promise() {
    let rt = Runtime::new();

    let task = rt.spawn(Operation::dynamic(Ambiguous));
    assert_eq!(task.name(), Some("ambiguous"));

    let value = rt.block_on(task.join()).expect("operand should complete");
    assert_eq!(value.get::<&str>(), Some("iterator"));
}

/// An operand exposing whichever contracts `offer` builds.
struct Offers(fn() -> Contracts);

impl Operand for Offers {
    fn contracts(self: Box<Self>) -> Contracts {
        (self.0)()
    }
}

/// Resolves with its tag, or provides it when used as a resource.
struct Tagged(&'static str);

impl Resolution for Tagged {
    fn perform(self: Box<Self>, settle: Settle) -> Option<Cancel> {
        settle.resolve(Value::new(self.0));
        None
    }
}

impl Resource for Tagged {
    fn init(self: Box<Self>, _scope: &Task, _local: &Task) -> Box<dyn Coroutine> {
        let tag = self.0;
        Box::new(coroutine::from_fn(move |_task, input| match input {
            Resume::Start => Step::Provide(Value::new(tag)),
            _ => Step::done(),
        }))
    }
}

fn tagged_iterator(tag: &'static str) -> Option<Box<dyn Coroutine>> {
    Some(Box::new(coroutine::from_fn(move |_, _| Step::ret(tag))))
}

fn run_offer(offer: fn() -> Contracts) -> Value {
    let rt = Runtime::new();
    rt.block_on(Operation::dynamic(Offers(offer)))
        .expect("operand should complete")
}

#[test]
fn test_absent_contract_wins_over_iterator() {
    let value = run_offer(|| Contracts {
        absent: true,
        iterator: tagged_iterator("iterator"),
        ..Contracts::default()
    });

    assert!(value.is_none(), "absent settles without a value");
}

#[test]
fn test_iterator_contract_wins_over_resolution() {
    let value = run_offer(|| Contracts {
        iterator: tagged_iterator("iterator"),
        resolution: Some(Box::new(Tagged("resolution"))),
        ..Contracts::default()
    });

    assert_eq!(value.get::<&str>(), Some("iterator"));
}

#[test]
fn test_resolution_contract_wins_over_future() {
    let value = run_offer(|| Contracts {
        resolution: Some(Box::new(Tagged("resolution"))),
        future: Some(Box::pin(async { Ok(Value::new("future")) })),
        ..Contracts::default()
    });

    assert_eq!(value.get::<&str>(), Some("resolution"));
}

#[test]
fn test_future_contract_wins_over_promise() {
    let value = run_offer(|| Contracts {
        future: Some(Box::pin(async { Ok(Value::new("future")) })),
        promise: Some(Box::new(Promise::resolved(Value::new("promise")))),
        ..Contracts::default()
    });

    assert_eq!(value.get::<&str>(), Some("future"));
}

#[test]
fn test_promise_contract_wins_over_resource() {
    let value = run_offer(|| Contracts {
        promise: Some(Box::new(Promise::resolved(Value::new("promise")))),
        resource: Some(Box::new(Tagged("resource"))),
        ..Contracts::default()
    });

    assert_eq!(value.get::<&str>(), Some("promise"));
}

#[test]
fn test_resource_contract_is_used_alone() {
    let rt = Runtime::new();

    let mut resource = Some(Operation::dynamic(Offers(|| Contracts {
        resource: Some(Box::new(Tagged("resource"))),
        ..Contracts::default()
    })));
    let value = rt
        .block_on(Operation::iterator(coroutine::from_fn(move |_task, input| match input {
            Resume::Start => Step::Yield(resource.take().unwrap_or_default()),
            Resume::Value(v) => Step::Return(v),
            Resume::Error(e) => Step::Throw(e),
        })))
        .expect("consumer completes");

    assert_eq!(value.get::<&str>(), Some("resource"));
}

#[test]
fn test_unrecognized_operand_fails_when_it_runs() {
    let rt = Runtime::new();

    let task = rt.spawn(Operation::dynamic(Opaque));
    assert_eq!(task.state(), TaskState::Pending, "spawn never classifies");

    rt.run().expect("run should finish");

    match task.outcome() {
        Some(scopeline::Outcome::Errored(Error::Classification { shape })) => {
            assert_eq!(shape, "opaque widget")
        }
        other => panic!("expected a classification error, got {other:?}"),
    }
}

#[test]
fn test_absent_settles_immediately_without_value() {
    let rt = Runtime::new();

    let value = rt.block_on(Operation::absent()).expect("absent completes");
    assert!(value.is_none());
}

#[test]
fn test_function_operation_receives_its_task() {
    let rt = Runtime::new();
    let seen = Rc::new(RefCell::new(None));

    let s = seen.clone();
    let task = rt.spawn(Operation::function(move |task| {
        *s.borrow_mut() = Some(task.id());
        Operation::function(|_| Operation::ready(Value::new(3i64)))
    }));
    let value = rt.block_on(task.join()).expect("function completes");

    assert_eq!(*seen.borrow(), Some(task.id()));
    assert_eq!(int(&value), 3);
}

#[test]
fn test_function_operation_keeps_its_own_labels() {
    let rt = Runtime::new();

    let task = rt.spawn(
        Operation::function(|_| Operation::ready(Value::new(1i64)).named("inner")).named("outer"),
    );
    rt.block_on(task.join()).expect("function completes");

    assert_eq!(task.name(), Some("outer"));
    let names: Vec<_> = rt
        .events()
        .iter()
        .filter(|e| e.task_id == task.id())
        .map(|e| e.labels.name().map(str::to_owned))
        .collect();
    assert!(names.iter().all(|n| n.as_deref() == Some("outer")), "{names:?}");
}

#[test]
fn test_resolution_cancel_runs_on_halt() {
    let rt = Runtime::new();
    let log = Log::new();
    let stash: Rc<RefCell<Option<Settle>>> = Rc::new(RefCell::new(None));

    let l = log.clone();
    let s = stash.clone();
    let task = rt.spawn(Operation::action(move |settle| {
        *s.borrow_mut() = Some(settle);
        Some(Box::new(move || l.push("cancelled")) as Cancel)
    }));
    rt.run().expect("run should finish");
    assert_eq!(task.state(), TaskState::Running);

    task.halt();
    rt.run().expect("run should finish");

    assert_eq!(log.entries(), vec!["cancelled"]);
    assert_eq!(task.state(), TaskState::Halted);

    let settle = stash.borrow_mut().take().expect("settle handle was stored");
    assert!(!settle.is_armed());
    assert!(!settle.resolve(Value::new(1i64)), "settling after halt has no effect");
}

#[test]
fn test_resolution_settles_once() {
    let rt = Runtime::new();

    let value = rt
        .block_on(Operation::action(|settle| {
            assert!(settle.resolve(Value::new(1i64)));
            assert!(!settle.reject(Error::msg("late")));
            None
        }))
        .expect("first settle wins");

    assert_eq!(int(&value), 1);
}

#[test]
fn test_promise_resumes_when_settled_from_outside() {
    let rt = Runtime::new();
    let (promise, deferred) = Promise::pending();

    let task = rt.spawn(promise);
    rt.run().expect("run should finish");
    assert_eq!(task.state(), TaskState::Running);

    deferred.resolve(Value::new(11i64));
    rt.run().expect("run should finish");

    assert_eq!(task.state(), TaskState::Completed);
    let value = rt.block_on(task.join()).expect("promise resolved");
    assert_eq!(int(&value), 11);
}

#[test]
fn test_rejected_promise_fails_the_task() {
    let rt = Runtime::new();

    let error = rt
        .block_on(Promise::rejected(Error::msg("denied")))
        .expect_err("promise rejected");

    assert_eq!(error.to_string(), "denied");
}

#[test]
fn test_ready_future_completes() {
    let rt = Runtime::new();

    let value = rt
        .block_on(Operation::future(async { Ok(Value::new(9i64)) }))
        .expect("future completes");

    assert_eq!(int(&value), 9);
}

#[test]
fn test_future_woken_from_another_thread() {
    let rt = Runtime::new();
    let slot: Arc<Mutex<(Option<i64>, Option<Waker>)>> = Arc::new(Mutex::new((None, None)));

    let remote = slot.clone();
    let worker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        let mut guard = remote.lock().unwrap();
        guard.0 = Some(99);
        if let Some(waker) = guard.1.take() {
            waker.wake();
        }
    });

    let local = slot.clone();
    let value = rt
        .block_on(Operation::future(poll_fn(move |cx| {
            let mut guard = local.lock().unwrap();
            match guard.0.take() {
                Some(v) => Poll::Ready(Ok(Value::new(v))),
                None => {
                    guard.1 = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        })))
        .expect("future completes once woken");

    worker.join().unwrap();
    assert_eq!(int(&value), 99);
}

#[test]
fn test_halting_a_future_drops_it() {
    struct Flag(Rc<RefCell<bool>>);

    impl Drop for Flag {
        fn drop(&mut self) {
            *self.0.borrow_mut() = true;
        }
    }

    let rt = Runtime::new();
    let dropped = Rc::new(RefCell::new(false));

    let flag = Flag(dropped.clone());
    let task = rt.spawn(Operation::future(async move {
        let _flag = flag;
        std::future::pending::<()>().await;
        Ok(Value::none())
    }));
    rt.run().expect("run should finish");
    assert!(!*dropped.borrow());

    task.halt();
    rt.run().expect("run should finish");

    assert!(*dropped.borrow());
    assert_eq!(task.state(), TaskState::Halted);
}

#[test]
fn test_deadlock_is_reported() {
    let rt = Runtime::new();

    match rt.block_on(Operation::suspend()) {
        Err(Error::Deadlock { .. }) => {}
        other => panic!("expected a deadlock, got {other:?}"),
    }
}

#[test]
fn test_coroutine_sees_yielded_values_in_order() {
    let rt = Runtime::new();
    let mut seen = Vec::new();

    let value = rt
        .block_on(Operation::iterator(coroutine::from_fn(move |_task, input| {
            match input {
                Resume::Start => {}
                Resume::Value(v) => seen.push(int(&v)),
                Resume::Error(e) => return Step::Throw(e),
            }
            match seen.len() {
                0 => Step::Yield(Operation::ready(Value::new(1i64))),
                1 => Step::Yield(Promise::resolved(Value::new(2i64)).into()),
                2 => Step::Yield(Operation::future(async { Ok(Value::new(3i64)) })),
                _ => Step::ret(seen.iter().sum::<i64>()),
            }
        })))
        .expect("coroutine completes");

    assert_eq!(int(&value), 6);
}
