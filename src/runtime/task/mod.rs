//! Tasks: runtime nodes of the task tree.

pub(crate) mod core;
pub(crate) mod handle;
pub(crate) mod state;
pub(crate) mod waker;

pub use self::core::TaskId;
pub use handle::{HaltSignal, Settle, Task};
pub use state::{Outcome, TaskState};
