use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`Task`](super::Task).
///
/// `Succeeded`, `Canceled` and `Failed` are terminal: once reached, the
/// state never changes again. `Canceled` is advisory; it records a request
/// and does not stop the computation.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Constructed but never polled.
    Created = 0,

    /// Currently being polled.
    Running = 1,

    /// Waiting on something after having run at least once.
    Suspended = 2,

    /// Finished with a successful outcome.
    Succeeded = 3,

    /// A cancel request was recorded before the task finished.
    Canceled = 4,

    /// Finished with a failed outcome, or panicked.
    Failed = 5,
}

impl TaskState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Suspended,
            3 => TaskState::Succeeded,
            4 => TaskState::Canceled,
            _ => TaskState::Failed,
        }
    }

    /// Returns `true` for states that can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Canceled | TaskState::Failed
        )
    }
}

/// Control block shared between a task and its observers.
///
/// Reference counted through `Arc`; it outlives the task frame as long as
/// any [`TaskHandle`] is alive.
#[derive(Debug)]
pub(crate) struct TaskInfo {
    state: AtomicU8,
}

impl TaskInfo {
    pub(crate) fn new(state: TaskState) -> Self {
        Self {
            state: AtomicU8::new(state as u8),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Moves the task to `next` unless it already reached a terminal state.
    ///
    /// Returns `true` if the transition happened.
    pub(crate) fn transition(&self, next: TaskState) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);

        loop {
            if TaskState::from_raw(current).is_terminal() {
                return false;
            }

            match self.state.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// An observer of a task's lifecycle.
///
/// Handles are cheap to clone and stay valid after the task itself was
/// consumed or dropped; they keep the shared control block alive.
///
/// # Examples
///
/// ```rust,ignore
/// let task = Task::new(async { 42 });
/// let handle = task.handle();
///
/// assert_eq!(wait_for(task), 42);
/// assert!(handle.has_succeeded());
/// ```
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub(crate) info: Arc<TaskInfo>,
}

impl TaskHandle {
    /// Returns the current state of the task.
    pub fn state(&self) -> TaskState {
        self.info.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_suspended(&self) -> bool {
        self.state() == TaskState::Suspended
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == TaskState::Canceled
    }

    /// Returns `true` once the task succeeded or failed.
    pub fn has_finished(&self) -> bool {
        matches!(self.state(), TaskState::Succeeded | TaskState::Failed)
    }

    pub fn has_succeeded(&self) -> bool {
        self.state() == TaskState::Succeeded
    }

    pub fn has_failed(&self) -> bool {
        self.state() == TaskState::Failed
    }

    /// Records a cancel request.
    ///
    /// The request only succeeds while the task has not finished yet. The
    /// computation itself keeps running; it is expected to check
    /// [`is_canceled`](Self::is_canceled) at its own discretion.
    ///
    /// Returns `true` if the request was recorded.
    pub fn cancel(&self) -> bool {
        self.info.transition(TaskState::Canceled)
    }
}
