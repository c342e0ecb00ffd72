use crate::continuation::{ContinuationNode, ContinuationQueue, SuspendReason};

use std::fmt;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::atomic::{AtomicI32, Ordering};
use std::task::{Context, Poll};
use std::thread;

/// State value of an open checkpoint.
///
/// Any other value is the number of computations waiting on a closed
/// checkpoint and is never negative.
const OPEN: i32 = i32::MIN;

/// A gate holding arriving computations until it is opened.
///
/// A closed checkpoint counts its waiters in an atomic state word and links
/// their continuations into an internal [`ContinuationQueue`]. Opening it
/// swaps the state to the open sentinel and resumes every registered waiter
/// exactly once, on the opening thread. An open checkpoint lets awaiters
/// through without suspending them.
///
/// # Examples
///
/// ```rust,ignore
/// let checkpoint = TaskCheckpoint::new(false);
///
/// execute_detached(Task::new(async move {
///     checkpoint.checkpoint_gate().await;
///     println!("released");
/// }));
///
/// assert!(checkpoint.open());
/// ```
pub struct TaskCheckpoint {
    /// `OPEN`, or the number of registered waiters.
    state: AtomicI32,

    queue: ContinuationQueue<()>,
}

impl TaskCheckpoint {
    /// Creates a checkpoint, open or closed with no waiter.
    pub fn new(initially_open: bool) -> Self {
        Self {
            state: AtomicI32::new(if initially_open { OPEN } else { 0 }),
            queue: ContinuationQueue::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    /// Returns the number of registered waiters, or `None` if open.
    pub fn waiting(&self) -> Option<usize> {
        match self.state.load(Ordering::Acquire) {
            OPEN => None,
            count => Some(count as usize),
        }
    }

    /// Registers `node` to be resumed when the checkpoint opens.
    ///
    /// The waiter count is raised and the node linked only while the
    /// checkpoint is closed. If it is already open, nothing happens and
    /// `false` is returned: the caller may proceed without suspending.
    ///
    /// # Panics
    ///
    /// Panics if the node is already linked, or if the waiter count would
    /// overflow.
    pub fn enqueue_awaitable(&self, node: Pin<&ContinuationNode<()>>) -> bool {
        let mut current = self.state.load(Ordering::Relaxed);

        loop {
            if current == OPEN {
                return false;
            }

            let Some(next) = current.checked_add(1) else {
                panic!("too many computations waiting on a checkpoint");
            };

            match self.state.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        // `open` waits for this link once it observed the increment.
        self.queue.push_back(node);
        true
    }

    /// Opens the checkpoint and resumes every registered waiter on the
    /// calling thread.
    ///
    /// Returns `true` if at least one waiter was resumed. Opening an open
    /// checkpoint does nothing.
    ///
    /// # Panics
    ///
    /// If a resumed waiter panics, every other waiter is still resumed and
    /// the checkpoint is left open before the first panic is propagated.
    pub fn open(&self) -> bool {
        let previous = self.state.swap(OPEN, Ordering::AcqRel);
        if previous == OPEN {
            return false;
        }

        let expected = previous as usize;
        let mut resumed = 0;
        let mut panicked = None;

        // A waiter counted by the swap may still be linking its node.
        loop {
            let (count, payload) = self.queue.drain(());
            resumed += count;
            if let Some(payload) = payload {
                panicked.get_or_insert(payload);
            }

            if resumed >= expected {
                break;
            }
            thread::yield_now();
        }

        assert_eq!(
            resumed, expected,
            "checkpoint resumed a different number of waiters than registered"
        );

        tracing::trace!(waiters = expected, "checkpoint opened");

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }

        expected > 0
    }

    /// Closes an open checkpoint so it can be used for another round.
    ///
    /// Closing a closed checkpoint without waiters does nothing.
    ///
    /// # Panics
    ///
    /// Panics if computations are waiting on the checkpoint.
    pub fn close(&self) {
        match self
            .state
            .compare_exchange(OPEN, 0, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(0) => tracing::trace!("checkpoint closed"),
            Err(waiting) => panic!("checkpoint closed while {waiting} computations wait on it"),
        }
    }

    /// Returns an awaitable that completes once the checkpoint is open.
    ///
    /// Awaiting an open checkpoint does not suspend.
    pub fn checkpoint_gate(&self) -> CheckpointGate<'_> {
        CheckpointGate {
            checkpoint: self,
            node: ContinuationNode::new(SuspendReason::Checkpoint),
            registered: false,
        }
    }
}

impl Default for TaskCheckpoint {
    /// Creates a closed checkpoint.
    fn default() -> Self {
        Self::new(false)
    }
}

impl fmt::Debug for TaskCheckpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCheckpoint")
            .field("open", &self.is_open())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Future returned by [`TaskCheckpoint::checkpoint_gate`].
pub struct CheckpointGate<'a> {
    checkpoint: &'a TaskCheckpoint,
    node: ContinuationNode<()>,
    registered: bool,
}

impl Future for CheckpointGate<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Safety: the node is never moved out of the pinned future.
        let this = unsafe { self.get_unchecked_mut() };
        let node = unsafe { Pin::new_unchecked(&this.node) };

        if this.registered {
            return node.poll_resumed(cx);
        }

        if this.checkpoint.is_open() {
            return Poll::Ready(());
        }

        node.prepare(cx.waker());
        if !this.checkpoint.enqueue_awaitable(node) {
            // Opened in the meantime.
            return Poll::Ready(());
        }

        this.registered = true;
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::pin;
    use std::task::Waker;

    #[test]
    fn initially_open_never_suspends() {
        let checkpoint = TaskCheckpoint::new(true);
        let mut cx = Context::from_waker(Waker::noop());

        assert!(checkpoint.is_open());
        assert!(pin!(checkpoint.checkpoint_gate()).poll(&mut cx).is_ready());
        assert_eq!(checkpoint.waiting(), None);
    }

    #[test]
    fn enqueue_into_open_checkpoint_is_refused() {
        let checkpoint = TaskCheckpoint::new(true);
        let node = pin!(ContinuationNode::new(SuspendReason::Checkpoint));

        assert!(!checkpoint.enqueue_awaitable(node.into_ref()));
        assert!(checkpoint.is_open());
    }

    #[test]
    fn open_resumes_registered_gates() {
        let checkpoint = TaskCheckpoint::new(false);
        let mut cx = Context::from_waker(Waker::noop());

        let mut first = pin!(checkpoint.checkpoint_gate());
        let mut second = pin!(checkpoint.checkpoint_gate());

        assert!(first.as_mut().poll(&mut cx).is_pending());
        assert!(second.as_mut().poll(&mut cx).is_pending());
        assert_eq!(checkpoint.waiting(), Some(2));

        assert!(checkpoint.open());
        assert!(checkpoint.is_open());
        assert!(first.as_mut().poll(&mut cx).is_ready());
        assert!(second.as_mut().poll(&mut cx).is_ready());

        assert!(!checkpoint.open());
    }

    #[test]
    fn open_without_waiters_reports_nothing_resumed() {
        let checkpoint = TaskCheckpoint::new(false);

        assert!(!checkpoint.open());
        assert!(checkpoint.is_open());
    }

    #[test]
    fn close_recycles_the_checkpoint() {
        let checkpoint = TaskCheckpoint::new(true);
        let mut cx = Context::from_waker(Waker::noop());

        checkpoint.close();
        assert!(!checkpoint.is_open());
        assert_eq!(checkpoint.waiting(), Some(0));

        let mut gate = pin!(checkpoint.checkpoint_gate());
        assert!(gate.as_mut().poll(&mut cx).is_pending());

        assert!(checkpoint.open());
        assert!(gate.as_mut().poll(&mut cx).is_ready());
    }

    #[test]
    #[should_panic(expected = "wait on it")]
    fn close_with_waiters_panics() {
        let checkpoint = TaskCheckpoint::new(false);
        let node = pin!(ContinuationNode::new(SuspendReason::Checkpoint));
        let node = node.into_ref();

        assert!(checkpoint.enqueue_awaitable(node));

        // Release the node before unwinding drops it.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| checkpoint.close()));
        checkpoint.queue.process_all(());
        if let Err(payload) = outcome {
            std::panic::resume_unwind(payload);
        }
    }
}
