use super::TaskId;

use parking_lot::{Condvar, Mutex};

use std::mem;
use std::sync::Arc;
use std::task::{Wake, Waker};

/// Wake-ups coming from future wakers, possibly on other threads.
///
/// The scheduler drains it at the start of every tick; `block_on` parks
/// on it when nothing else can make progress.
#[derive(Default)]
pub(crate) struct WakeQueue {
    woken: Mutex<Vec<TaskId>>,
    ready: Condvar,
}

impl WakeQueue {
    pub(crate) fn push(&self, task: TaskId) {
        self.woken.lock().push(task);
        self.ready.notify_one();
    }

    pub(crate) fn drain(&self) -> Vec<TaskId> {
        mem::take(&mut *self.woken.lock())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.woken.lock().is_empty()
    }

    /// Blocks the calling thread until at least one task was woken.
    pub(crate) fn wait(&self) {
        let mut woken = self.woken.lock();
        while woken.is_empty() {
            self.ready.wait(&mut woken);
        }
    }
}

struct TaskWaker {
    task: TaskId,
    queue: Arc<WakeQueue>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.queue.push(self.task);
    }
}

/// Creates a waker that re-enqueues `task` on `queue`.
pub(crate) fn make_waker(task: TaskId, queue: Arc<WakeQueue>) -> Waker {
    Waker::from(Arc::new(TaskWaker { task, queue }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ArenaIndex;

    use std::thread;

    #[test]
    fn wake_from_another_thread_unparks_wait() {
        let queue = Arc::new(WakeQueue::default());
        let id = TaskId(ArenaIndex::new(0, 0));
        let waker = make_waker(id, queue.clone());

        let handle = thread::spawn(move || waker.wake());
        queue.wait();
        handle.join().unwrap();

        assert_eq!(queue.drain(), vec![id]);
        assert!(queue.is_empty());
    }
}
