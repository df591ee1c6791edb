mod common;

use common::{Log, init_tracing, on_start, sleeper};
use scopeline::{
    Coroutine, Error, Operation, Promise, Resource, Resume, Runtime, Step, Task, TaskId,
    TaskState, Value, coroutine,
};

use std::cell::RefCell;
use std::rc::Rc;

/// A connection-like resource whose setup waits for `ready`.
struct Connection {
    ready: Promise,
    log: Log,
}

struct ConnectionBody {
    ready: Option<Promise>,
    log: Log,
    stage: u8,
}

impl Resource for Connection {
    fn init(self: Box<Self>, _scope: &Task, _local: &Task) -> Box<dyn Coroutine> {
        Box::new(ConnectionBody {
            ready: Some(self.ready),
            log: self.log,
            stage: 0,
        })
    }
}

impl Coroutine for ConnectionBody {
    fn resume(&mut self, _task: &Task, input: Resume) -> Step {
        self.stage += 1;
        match (self.stage, input) {
            (1, Resume::Start) => {
                self.log.push("setup begin");
                let ready = self.ready.take().unwrap_or_else(|| Promise::resolved(Value::none()));
                Step::Yield(ready.into())
            }
            (2, Resume::Value(_)) => {
                self.log.push("setup done");
                Step::Provide(Value::new("conn"))
            }
            (3, _) => {
                self.log.push("released");
                Step::done()
            }
            (_, Resume::Error(e)) => Step::Throw(e),
            _ => Step::done(),
        }
    }
}

fn consumer(resource: Operation, log: &Log, hold: bool) -> Operation {
    let log = log.clone();
    let mut resource = Some(resource);

    Operation::iterator(coroutine::from_fn(move |_task, input| match input {
        Resume::Start => Step::Yield(resource.take().unwrap_or_default()),
        Resume::Value(v) if !v.is_none() => {
            log.push(format!("ready {}", v.get::<&str>().unwrap_or("?")));
            if hold {
                Step::Yield(Operation::suspend())
            } else {
                Step::done()
            }
        }
        Resume::Value(v) => Step::Return(v),
        Resume::Error(e) => Step::Throw(e),
    }))
    .named("consumer")
}

#[test]
fn test_consumer_waits_for_setup() {
    init_tracing();
    let rt = Runtime::new();
    let log = Log::new();
    let (ready, deferred) = Promise::pending();

    let connection = Operation::resource(Connection {
        ready,
        log: log.clone(),
    });
    let task = rt.spawn(consumer(connection, &log, false));
    rt.run().expect("run should finish");

    assert_eq!(log.entries(), vec!["setup begin"]);
    assert_eq!(task.state(), TaskState::Running, "consumer is not ready yet");

    deferred.resolve(Value::none());
    rt.run().expect("run should finish");

    assert_eq!(
        log.entries(),
        vec!["setup begin", "setup done", "ready conn", "released"]
    );
    assert_eq!(task.state(), TaskState::Completed);
}

#[test]
fn test_resource_released_when_consumer_is_halted() {
    let rt = Runtime::new();
    let log = Log::new();

    let connection = Operation::resource(Connection {
        ready: Promise::resolved(Value::none()),
        log: log.clone(),
    });
    let task = rt.spawn(consumer(connection, &log, true));
    rt.run().expect("run should finish");
    assert_eq!(log.entries(), vec!["setup begin", "setup done", "ready conn"]);

    task.halt();
    rt.run().expect("run should finish");

    assert_eq!(log.position("released"), Some(3));
    assert_eq!(task.state(), TaskState::Halted);
}

#[test]
fn test_setup_failure_reaches_the_consumer() {
    let rt = Runtime::new();

    let failing = Operation::acquire(|_scope, _local| {
        Box::new(coroutine::from_fn(|_task, input| match input {
            Resume::Start => Step::Yield(Operation::fail(Error::msg("no route"))),
            Resume::Error(e) => Step::Throw(e),
            Resume::Value(v) => Step::Provide(v),
        }))
    });

    let error = rt.block_on(consumer(failing, &Log::new(), false)).expect_err("setup fails");
    assert_eq!(error.to_string(), "no route");
}

#[test]
fn test_resource_scope_is_the_consumer_and_helpers_live_with_it() {
    let rt = Runtime::new();
    let log = Log::new();
    let ids: Rc<RefCell<Option<(TaskId, TaskId, Option<TaskId>)>>> = Rc::new(RefCell::new(None));

    let l = log.clone();
    let seen = ids.clone();
    let pool = Operation::acquire(move |scope, local| {
        *seen.borrow_mut() = Some((scope.id(), local.id(), local.parent_id()));
        local.spawn(sleeper("helper", &l));

        let l = l.clone();
        Box::new(coroutine::from_fn(move |_task, input| match input {
            Resume::Start => Step::Provide(Value::new("pool")),
            _ => {
                l.push("pool released");
                Step::done()
            }
        }))
    })
    .named("pool");

    let mut pool = Some(pool);
    let task = rt.spawn(Operation::iterator(on_start(move |_task| {
        Step::Yield(pool.take().unwrap_or_default())
    })));
    rt.run().expect("run should finish");

    let (scope, local, parent) = ids.borrow().expect("resource was initialised");
    assert_eq!(scope, task.id());
    assert_ne!(local, task.id());
    assert_eq!(parent, Some(task.id()));
    assert_eq!(task.state(), TaskState::Completed);

    // The helper is halted before the resource's own teardown runs.
    assert_eq!(log.entries(), vec!["helper teardown", "pool released"]);
}
