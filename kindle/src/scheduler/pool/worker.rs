use super::injector::Injector;
use super::{NodeRef, Pending};
use crate::error::{PoolError, Result};
use crate::scheduler::ThreadPoolBuilder;

use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A fixed array of named worker threads sharing one [`Injector`].
pub(crate) struct WorkerPool {
    injector: Arc<Injector>,
    pending: Arc<Pending>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns every worker.
    ///
    /// If one of them cannot be spawned, the ones already running are shut
    /// down and joined before the error is returned.
    pub(crate) fn start(builder: &ThreadPoolBuilder, pending: Arc<Pending>) -> Result<Self> {
        let mut pool = WorkerPool {
            injector: Arc::new(Injector::new()),
            pending,
            handles: Vec::with_capacity(builder.worker_threads),
        };

        for index in 0..builder.worker_threads {
            let mut thread = thread::Builder::new().name(format!(
                "{} {:02}",
                builder.thread_name, index
            ));
            if let Some(stack_size) = builder.stack_size {
                thread = thread.stack_size(stack_size);
            }

            let worker = Worker {
                index,
                injector: pool.injector.clone(),
                pending: pool.pending.clone(),
            };

            match thread.spawn(move || worker.run()) {
                Ok(handle) => pool.handles.push(handle),
                Err(source) => {
                    tracing::error!(index, error = %source, "failed to spawn pool worker");
                    pool.shutdown();
                    return Err(PoolError::SpawnWorker { index, source });
                }
            }
        }

        Ok(pool)
    }

    pub(crate) fn submit(&self, node: NodeRef) {
        self.injector.push(node);
    }

    /// Stops the workers once every submitted node was resumed.
    pub(crate) fn shutdown(&mut self) {
        self.injector.shutdown();

        let current = thread::current().id();
        for handle in self.handles.drain(..) {
            // Dropped from one of its own workers: that worker exits on
            // its own once it returns to its loop.
            if handle.thread().id() == current {
                continue;
            }

            if handle.join().is_err() {
                tracing::error!("pool worker terminated by a panic");
            }
        }

        // Nodes pushed by resumed computations after the last worker left.
        while let Some(node) = self.injector.steal() {
            node.run(&self.pending);
        }
    }
}

/// A worker thread of a [`WorkerPool`].
struct Worker {
    index: usize,
    injector: Arc<Injector>,
    pending: Arc<Pending>,
}

impl Worker {
    /// Runs the worker loop.
    ///
    /// - Resume the oldest queued node if any
    /// - Otherwise exit if shutdown was requested
    /// - Otherwise park until a node arrives
    fn run(self) {
        tracing::debug!(index = self.index, "pool worker started");

        loop {
            if let Some(node) = self.injector.steal() {
                node.run(&self.pending);
                continue;
            }

            if self.injector.is_shutdown() {
                break;
            }

            self.injector.park();
        }

        tracing::debug!(index = self.index, "pool worker stopped");
    }
}
