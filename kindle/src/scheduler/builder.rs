use super::ThreadPool;
use crate::error::Result;

use std::thread;

/// Builder for configuring and creating a [`ThreadPool`].
///
/// # Examples
///
/// ```rust,ignore
/// let pool = ThreadPoolBuilder::new()
///     .worker_threads(4)
///     .thread_name("loader")
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    /// Number of worker threads.
    pub(crate) worker_threads: usize,

    /// Prefix of the worker thread names.
    pub(crate) thread_name: String,

    /// Stack size of the worker threads, in bytes.
    pub(crate) stack_size: Option<usize>,
}

impl ThreadPoolBuilder {
    /// Creates a new `ThreadPoolBuilder` with default configuration.
    ///
    /// By default, the number of worker threads is set to the number
    /// of available logical CPUs, falling back to `1` if unavailable.
    pub fn new() -> Self {
        let worker_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            worker_threads,
            thread_name: String::from("kindle.worker"),
            stack_size: None,
        }
    }

    /// Sets the number of worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn worker_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "worker_threads must be > 0");

        self.worker_threads = n;
        self
    }

    /// Sets the prefix of the worker thread names.
    ///
    /// Workers are named `"<prefix> NN"`. Ignored by the native Windows
    /// pool, which owns its threads.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Sets the stack size of the worker threads. Ignored on Windows.
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Creates the pool and starts its workers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`](crate::error::PoolError) if the OS refuses to
    /// provide the workers. Nothing is left running in that case.
    pub fn build(self) -> Result<ThreadPool> {
        ThreadPool::new(self)
    }
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
