//! Deferred computations.
//!
//! A [`Task`] wraps a future without running it. It is started by whoever
//! consumes it:
//! - awaiting it from another computation,
//! - blocking the calling thread on it with [`wait_for`],
//! - running it without an awaiter through [`execute_detached`].
//!
//! There is no executor. A suspended task is resumed inline by whatever
//! resumes its continuation: a checkpoint opener, a queue drain, or a
//! worker of a [`ThreadPool`](crate::scheduler::ThreadPool).

mod core;
mod detached;
mod state;
mod utils;
mod waker;

pub use self::core::Task;
pub use state::{TaskHandle, TaskState};
pub use utils::{
    await_all, await_scheduled, execute_detached, execute_tracked, resume_on, schedule_on,
    wait_for, wait_for_all,
};
