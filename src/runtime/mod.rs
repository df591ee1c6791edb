mod core;
mod halt;
mod scheduler;

pub(crate) mod builder;
pub(crate) mod queue;
pub(crate) mod shared;
pub mod task;

pub use self::core::Runtime;
