use super::Task;
use super::detached::Detached;
use crate::scheduler::{Schedule, TaskScheduler};
use crate::sync::{ManualResetBarrier, ManualResetEvent};

use futures::FutureExt;
use parking_lot::Mutex;

use std::future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

/// Blocks the current thread until `task` completes and returns its value.
///
/// The task starts on the calling thread. Once it suspends, it continues on
/// whichever thread resumes it while the caller sleeps; a task that moves
/// itself onto a [`ThreadPool`](crate::scheduler::ThreadPool) keeps running
/// there. A panic raised by the task is resumed on the calling thread.
///
/// # Examples
///
/// ```rust,ignore
/// let value = wait_for(Task::new(async { 1 + 1 }));
/// assert_eq!(value, 2);
/// ```
pub fn wait_for<'a, T>(task: Task<'a, T>) -> T
where
    T: Send + 'a,
{
    let slot = Arc::new(Mutex::new(None));
    let done = Arc::new(ManualResetEvent::new());

    let future = {
        let slot = slot.clone();
        let done = done.clone();

        async move {
            // The task is dropped at the end of this statement.
            let result = AssertUnwindSafe(task).catch_unwind().await;

            *slot.lock() = Some(result);
            drop(slot);

            // Only `'static` data is touched after this point.
            done.set();
        }
    };

    // Safety: the caller is released once the future has dropped everything
    // it borrowed, and is blocked until then.
    unsafe { Detached::spawn_unchecked(Box::pin(future)) };
    done.wait();

    let result = slot.lock().take();
    match result {
        Some(Ok(value)) => value,
        Some(Err(payload)) => panic::resume_unwind(payload),
        None => unreachable!("task released its waiter without a result"),
    }
}

/// Blocks the current thread until every task of `tasks` completed.
pub fn wait_for_all(tasks: Vec<Task<'_, ()>>) {
    wait_for(Task::new(await_all(tasks)));
}

/// Starts `task` on the calling thread without awaiting it.
///
/// The task runs until its first suspension before this returns. Later
/// resumptions run inline on whichever thread resumes it. The result is
/// discarded.
pub fn execute_detached<T>(task: Task<'static, T>)
where
    T: 'static,
{
    Detached::spawn(async move {
        let _ = task.await;
    });
}

/// Like [`execute_detached`], but signals `barrier` once the task
/// finished.
///
/// The barrier is signalled exactly once, also when the task panics.
pub fn execute_tracked<T>(task: Task<'static, T>, barrier: Arc<ManualResetBarrier>)
where
    T: 'static,
{
    Detached::spawn(async move {
        let _signal = SignalOnDrop(barrier);
        let _ = task.await;
    });
}

/// Signals the barrier when the computation holding it is released.
struct SignalOnDrop(Arc<ManualResetBarrier>);

impl Drop for SignalOnDrop {
    fn drop(&mut self) {
        self.0.signal();
    }
}

/// Awaits every task of `tasks` and returns their values in order.
///
/// The tasks make progress concurrently: each one is polled whenever the
/// combined future is resumed.
pub async fn await_all<T>(tasks: Vec<Task<'_, T>>) -> Vec<T> {
    let mut tasks = tasks;
    let mut results: Vec<Option<T>> = tasks.iter().map(|_| None).collect();
    let mut remaining = tasks.len();

    future::poll_fn(|cx| {
        for (task, result) in tasks.iter_mut().zip(results.iter_mut()) {
            if result.is_some() {
                continue;
            }

            if let Poll::Ready(value) = Pin::new(task).poll(cx) {
                *result = Some(value);
                remaining -= 1;
            }
        }

        if remaining == 0 {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;

    results.into_iter().flatten().collect()
}

/// Returns a task that first moves onto `scheduler`, then runs `task`.
pub fn schedule_on<'a, T, S>(task: Task<'a, T>, scheduler: &'a S) -> Task<'a, T>
where
    T: 'a,
    S: TaskScheduler + ?Sized,
{
    Task::new(async move {
        Schedule::new(scheduler).await;
        task.await
    })
}

/// Returns a task that runs `task`, then moves its awaiter onto
/// `scheduler` before handing back the value.
pub fn resume_on<'a, T, S>(task: Task<'a, T>, scheduler: &'a S) -> Task<'a, T>
where
    T: Send + 'a,
    S: TaskScheduler + ?Sized,
{
    Task::new(async move {
        let value = task.await;
        Schedule::new(scheduler).await;
        value
    })
}

/// Schedules every task of `tasks` on `scheduler` and awaits them all.
pub async fn await_scheduled<S>(tasks: Vec<Task<'_, ()>>, scheduler: &S)
where
    S: TaskScheduler + ?Sized,
{
    let scheduled = tasks
        .into_iter()
        .map(|task| schedule_on(task, scheduler))
        .collect();

    await_all(scheduled).await;
}
