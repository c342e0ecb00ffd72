//! OS worker threads resuming scheduled computations.
//!
//! On Windows the pool is backed by the native thread pool API. Elsewhere
//! it is a fixed array of named worker threads sharing an injector queue.

#[cfg(not(windows))]
mod injector;
#[cfg(windows)]
mod windows;
#[cfg(not(windows))]
mod worker;

#[cfg(windows)]
use windows::NativePool as Backend;
#[cfg(not(windows))]
use worker::WorkerPool as Backend;

use super::{TaskScheduler, ThreadPoolBuilder};
use crate::continuation::ContinuationNode;
use crate::error::Result;

use parking_lot::{Condvar, Mutex};

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;

/// A linked continuation node in transit to a worker.
pub(crate) struct NodeRef(*const ContinuationNode<()>);

// Safety: the node is `Sync` and stays alive while linked.
unsafe impl Send for NodeRef {}

impl NodeRef {
    /// Resumes the node on the calling worker.
    ///
    /// A panic escaping the resumed computation is logged and contained so
    /// the worker keeps serving the pool; the computation itself is already
    /// marked as failed.
    pub(crate) fn run(self, pending: &Pending) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            // Safety: the node was linked by `schedule_node` and only this
            // worker received it.
            unsafe { ContinuationNode::resume(self.0, ()) }
        }));

        if outcome.is_err() {
            tracing::error!("computation panicked on a pool worker");
        }

        pending.finish();
    }
}

/// Number of submitted nodes not yet resumed.
#[derive(Debug, Default)]
pub(crate) struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    pub(crate) fn begin(&self) {
        *self.count.lock() += 1;
    }

    pub(crate) fn finish(&self) {
        *self.count.lock() -= 1;
        self.idle.notify_all();
    }

    pub(crate) fn get(&self) -> usize {
        *self.count.lock()
    }

    /// Blocks until at most `allowance` submitted nodes are still being
    /// resumed.
    #[cfg_attr(not(windows), allow(dead_code))]
    pub(crate) fn wait_idle(&self, allowance: usize) {
        let mut count = self.count.lock();
        while *count > allowance {
            self.idle.wait(&mut count);
        }
    }
}

/// A pool of OS worker threads.
///
/// Computations move onto the pool by awaiting
/// [`schedule`](TaskScheduler::schedule): the awaiting computation is
/// resumed, and continues to run, on one of the workers. The pool keeps no
/// queuing policy of its own beyond handing nodes to idle workers.
///
/// Dropping the pool blocks until every node submitted to it was resumed.
///
/// # Examples
///
/// ```rust,ignore
/// let pool = ThreadPool::builder().worker_threads(2).build()?;
///
/// let name = wait_for(Task::new(async {
///     pool.schedule().await;
///     std::thread::current().name().map(String::from)
/// }));
/// ```
pub struct ThreadPool {
    backend: Backend,
    pending: Arc<Pending>,
    threads: usize,
}

impl ThreadPool {
    /// Returns a builder to configure a new pool.
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    pub(crate) fn new(builder: ThreadPoolBuilder) -> Result<Self> {
        let pending = Arc::new(Pending::default());
        let backend = Backend::start(&builder, pending.clone())?;

        tracing::debug!(
            workers = builder.worker_threads,
            name = %builder.thread_name,
            "thread pool started"
        );

        Ok(Self {
            backend,
            pending,
            threads: builder.worker_threads,
        })
    }

    /// Returns the configured number of worker threads.
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Returns the number of scheduled computations not yet resumed.
    pub fn pending_count(&self) -> usize {
        self.pending.get()
    }
}

impl TaskScheduler for ThreadPool {
    fn schedule_node(&self, node: Pin<&ContinuationNode<()>>) {
        node.mark_linked();
        self.pending.begin();
        self.backend.submit(NodeRef(node.get_ref()));
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.backend.shutdown();
        tracing::debug!(workers = self.threads, "thread pool stopped");
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads)
            .field("pending", &self.pending_count())
            .finish()
    }
}
