use super::state::{TaskHandle, TaskInfo, TaskState};
use crate::diagnostics::{FrameGuard, FrameTracker};

use std::alloc::Layout;
use std::fmt;
use std::future::{self, Future};
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The boxed coroutine frame of a task.
struct Frame<'a, T> {
    future: BoxFuture<'a, T>,

    /// Reports the release of the frame to a tracker, if any.
    _guard: Option<FrameGuard>,
}

/// A lazily started, single-consumer deferred computation.
///
/// Creating a `Task` runs nothing: the wrapped future is first polled when
/// the task is awaited, blocked on with [`wait_for`](super::wait_for), or
/// started with [`execute_detached`](super::execute_detached). Whoever
/// awaits the task provides its continuation; when the computation
/// finishes, that continuation is resumed.
///
/// The lifetime `'a` bounds what the computation may borrow, which lets a
/// task yield a reference (`Task<'a, &'a T>`) that points straight at the
/// original object.
///
/// A task tracks its lifecycle in a shared control block observable through
/// [`TaskHandle`]s. A panic escaping the computation moves the task to
/// [`TaskState::Failed`], is logged, and then keeps unwinding into the
/// awaiter.
///
/// # Examples
///
/// ```rust,ignore
/// let task = Task::new(async { 40 + 2 });
/// assert!(!task.is_ready());
///
/// assert_eq!(wait_for(task), 42);
/// ```
pub struct Task<'a, T = ()> {
    /// The computation, or `None` once it finished.
    frame: Option<Frame<'a, T>>,

    info: Arc<TaskInfo>,

    /// Maps the produced value to the final state.
    outcome: fn(&T) -> TaskState,
}

fn succeeded<T>(_: &T) -> TaskState {
    TaskState::Succeeded
}

impl<'a, T> Task<'a, T> {
    /// Wraps `future` into a task without running it.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'a,
    {
        Self::from_parts(Box::pin(future), None, TaskInfo::new(TaskState::Created))
    }

    /// Wraps the future returned by `f`, handing it a handle to the task's
    /// own control block.
    ///
    /// The body can use the handle to observe cancel requests.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let task = Task::with_handle(|me| async move {
    ///     while !me.is_canceled() {
    ///         step().await;
    ///     }
    /// });
    /// ```
    pub fn with_handle<F>(f: impl FnOnce(TaskHandle) -> F) -> Self
    where
        F: Future<Output = T> + Send + 'a,
    {
        let info = Arc::new(TaskInfo::new(TaskState::Created));
        let future = f(TaskHandle { info: info.clone() });

        Self {
            frame: Some(Frame {
                future: Box::pin(future),
                _guard: None,
            }),
            info,
            outcome: succeeded::<T>,
        }
    }

    /// Wraps `future` and reports its frame layout to `tracker`.
    ///
    /// `pool` names the allocation pool in the tracker's events.
    pub fn tracked<F>(pool: &'static str, tracker: Arc<dyn FrameTracker>, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'a,
    {
        let guard = FrameGuard::new(tracker, pool, Layout::new::<F>());

        Self::from_parts(
            Box::pin(future),
            Some(guard),
            TaskInfo::new(TaskState::Created),
        )
    }

    fn from_parts(future: BoxFuture<'a, T>, guard: Option<FrameGuard>, info: TaskInfo) -> Self {
        Self {
            frame: Some(Frame {
                future,
                _guard: guard,
            }),
            info: Arc::new(info),
            outcome: succeeded::<T>,
        }
    }

    /// Returns `true` if the task has nothing left to run.
    pub fn is_ready(&self) -> bool {
        // Empty tasks keep a trivial frame but start out `Succeeded`.
        self.frame.is_none() || self.info.state() == TaskState::Succeeded
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TaskState {
        self.info.state()
    }

    /// Returns an observer of this task.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            info: self.info.clone(),
        }
    }
}

impl<'a, T, E> Task<'a, Result<T, E>> {
    /// Wraps a fallible computation.
    ///
    /// An `Err` output leaves the task in [`TaskState::Failed`] instead of
    /// `Succeeded`; the error itself is still handed to the awaiter.
    pub fn fallible<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
    {
        let mut task = Self::new(future);
        task.outcome = |result| match result {
            Ok(_) => TaskState::Succeeded,
            Err(_) => TaskState::Failed,
        };
        task
    }
}

impl Task<'_, ()> {
    /// Creates an already complete unit task.
    ///
    /// Awaiting it returns immediately.
    pub fn empty() -> Self {
        Self::from_parts(
            Box::pin(future::ready(())),
            None,
            TaskInfo::new(TaskState::Succeeded),
        )
    }
}

impl Default for Task<'_, ()> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Future for Task<'_, T> {
    type Output = T;

    /// Polls the computation, using the caller's waker as its continuation.
    ///
    /// # Panics
    ///
    /// Panics if polled again after it returned `Poll::Ready`, and resumes
    /// any panic raised by the computation.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();

        let Some(frame) = this.frame.as_mut() else {
            panic!("task polled after completion");
        };

        this.info.transition(TaskState::Running);

        let poll = panic::catch_unwind(AssertUnwindSafe(|| frame.future.as_mut().poll(cx)));

        match poll {
            Ok(Poll::Pending) => {
                this.info.transition(TaskState::Suspended);
                Poll::Pending
            }
            Ok(Poll::Ready(value)) => {
                this.frame = None;
                this.info.transition((this.outcome)(&value));
                Poll::Ready(value)
            }
            Err(payload) => {
                this.frame = None;
                this.info.transition(TaskState::Failed);
                tracing::error!("unhandled panic in task, marking it as failed");
                panic::resume_unwind(payload)
            }
        }
    }
}

impl<T> fmt::Debug for Task<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.info.state())
            .field("ready", &self.is_ready())
            .finish()
    }
}
