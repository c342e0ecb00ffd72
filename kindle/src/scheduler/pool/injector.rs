use super::NodeRef;

use parking_lot::{Condvar, Mutex};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

/// Queue shared by the worker threads of a pool.
///
/// Scheduled nodes are pushed at the back and taken from the front. Idle
/// workers park on the condition variable until a node arrives or the pool
/// shuts down.
pub(crate) struct Injector {
    /// Nodes waiting for a worker.
    queue: Mutex<VecDeque<NodeRef>>,

    /// Wakes parked workers.
    condvar: Condvar,

    /// Set once the pool is being dropped.
    shutdown: AtomicBool,
}

impl Injector {
    pub(crate) fn new() -> Self {
        Injector {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Pushes a node and wakes one parked worker.
    pub(crate) fn push(&self, node: NodeRef) {
        self.queue.lock().push_back(node);
        self.condvar.notify_one();
    }

    /// Takes the oldest node, if any.
    pub(crate) fn steal(&self) -> Option<NodeRef> {
        self.queue.lock().pop_front()
    }

    /// Parks the calling worker until a node is available or shutdown was
    /// requested.
    pub(crate) fn park(&self) {
        let mut queue = self.queue.lock();

        while queue.is_empty() && !self.is_shutdown() {
            self.condvar.wait(&mut queue);
        }
    }

    /// Requests shutdown and wakes every parked worker.
    ///
    /// Workers keep taking nodes until the queue is empty, then exit.
    pub(crate) fn shutdown(&self) {
        let _queue = self.queue.lock();
        self.shutdown.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
