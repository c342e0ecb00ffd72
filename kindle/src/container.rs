use crate::scheduler::TaskScheduler;
use crate::sync::ManualResetBarrier;
use crate::task::{Task, execute_tracked};

use std::any::Any;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

/// Owns a batch of computations and outlives every one of them.
///
/// Tasks are reserved with [`create_tasks`](Self::create_tasks), started
/// with [`execute_tasks`](Self::execute_tasks), and awaited from the
/// outside with [`wait_tasks`](Self::wait_tasks). Dropping the container
/// starts whatever is still pending and blocks until every started task
/// finished, so no computation owned by the container can outlive it.
///
/// # Examples
///
/// ```rust,ignore
/// let mut container = ScopedTaskContainer::new();
///
/// for (slot, chunk) in container.create_tasks(chunks.len()).iter_mut().zip(chunks) {
///     *slot = Task::new(async move { process(chunk).await });
/// }
///
/// container.execute_tasks();
/// container.wait_tasks();
/// ```
pub struct ScopedTaskContainer {
    /// Tasks reserved but not started yet.
    tasks: Vec<Task<'static, ()>>,

    /// Counts started tasks that did not finish yet.
    barrier: Arc<ManualResetBarrier>,
}

impl ScopedTaskContainer {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tasks: Vec::with_capacity(capacity),
            barrier: Arc::new(ManualResetBarrier::new(0)),
        }
    }

    /// Reserves `count` new slots and returns them for the caller to fill.
    ///
    /// Slots start out as [empty](Task::empty) tasks. The backing storage
    /// only ever grows.
    pub fn create_tasks(&mut self, count: usize) -> &mut [Task<'static, ()>] {
        let start = self.tasks.len();
        self.tasks.resize_with(start + count, Task::empty);
        &mut self.tasks[start..]
    }

    /// Returns the number of tasks reserved and not started yet.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Starts every pending task on the calling thread.
    ///
    /// Each task runs until its first suspension before the next one
    /// starts, and signals the completion barrier once when it finishes.
    /// Returns the number of started tasks.
    ///
    /// # Panics
    ///
    /// If a task panics before suspending, the rest of the batch is still
    /// started before the first panic is propagated.
    pub fn execute_tasks(&mut self) -> usize {
        let (count, panicked) = self.start_batch();

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }

        count
    }

    /// Starts every pending task and catches panics raised while starting.
    fn start_batch(&mut self) -> (usize, Option<Box<dyn Any + Send>>) {
        let tasks = self.take_batch();
        self.start_all(tasks)
    }

    fn start_all(&self, tasks: Vec<Task<'static, ()>>) -> (usize, Option<Box<dyn Any + Send>>) {
        let count = tasks.len();
        let mut panicked = None;

        for task in tasks {
            let barrier = self.barrier.clone();

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| {
                execute_tracked(task, barrier);
            })) {
                panicked.get_or_insert(payload);
            }
        }

        (count, panicked)
    }

    /// Starts every pending task after moving it onto `scheduler`.
    ///
    /// Returns the number of started tasks.
    pub fn execute_tasks_on<S>(&mut self, scheduler: &Arc<S>) -> usize
    where
        S: TaskScheduler + 'static,
    {
        let tasks = self
            .take_batch()
            .into_iter()
            .map(|task| {
                let scheduler = scheduler.clone();
                Task::new(async move {
                    scheduler.schedule().await;
                    task.await;
                })
            })
            .collect();

        let (count, panicked) = self.start_all(tasks);

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }

        count
    }

    /// Moves the pending tasks out and accounts for them in the barrier.
    fn take_batch(&mut self) -> Vec<Task<'static, ()>> {
        let count = self.tasks.len();
        if count == 0 {
            return Vec::new();
        }

        let count = u32::try_from(count).unwrap_or_else(|_| {
            panic!("cannot execute more than {} tasks at once", u32::MAX);
        });

        // Raised before any task starts: a task may finish synchronously.
        self.barrier.add(count);
        tracing::trace!(count, "executing task batch");

        self.tasks.drain(..).collect()
    }

    /// Returns the number of started tasks that did not finish yet.
    pub fn running_tasks(&self) -> u32 {
        self.barrier.value()
    }

    /// Blocks the calling thread until every started task finished.
    pub fn wait_tasks(&self) {
        self.barrier.wait();
    }

    /// Hands the pending tasks back to the caller without running them.
    pub fn extract_tasks(&mut self) -> Vec<Task<'static, ()>> {
        mem::take(&mut self.tasks)
    }
}

impl Default for ScopedTaskContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScopedTaskContainer {
    fn drop(&mut self) {
        let (_, panicked) = self.start_batch();
        self.wait_tasks();

        if let Some(payload) = panicked {
            if thread::panicking() {
                tracing::error!("task panicked while its container was dropped during unwinding");
            } else {
                panic::resume_unwind(payload);
            }
        }
    }
}

impl fmt::Debug for ScopedTaskContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedTaskContainer")
            .field("pending", &self.tasks.len())
            .field("running", &self.running_tasks())
            .finish()
    }
}
