use futures::task::AtomicWaker;

use std::cell::UnsafeCell;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{self, AtomicPtr, AtomicU8, Ordering};
use std::task::{Context, Poll, Waker};

/// The node is not linked into any queue.
const IDLE: u8 = 0;

/// The node is reachable from a queue or a scheduler transport.
const LINKED: u8 = 1;

/// The node was resumed and carries a result.
const RESUMED: u8 = 2;

/// The queue holding the node was dropped before the node was resumed.
const ABANDONED: u8 = 3;

/// A consumer is taking the waker; `RESUMED` or `ABANDONED` follows.
const WAKING: u8 = 4;

/// Why a computation suspended on a [`ContinuationNode`].
///
/// The tag is informational; it ends up in trace events and lets
/// consumers tell apart waiters when inspecting a drained chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendReason {
    /// Waiting on a plain [`ContinuationQueue`](super::ContinuationQueue).
    Queue,

    /// Waiting for a checkpoint to open.
    Checkpoint,

    /// Waiting to be resumed by a scheduler.
    Scheduler,
}

/// A suspended computation waiting for something.
///
/// A node is embedded in the future that suspends, pinned together with
/// it, and linked into a queue through the intrusive `next` pointer. The
/// queue never owns the node: it only borrows it until a consumer resumes
/// it, writing a value into the result slot and waking the stored waker.
///
/// # Lifecycle
///
/// `Idle -> Linked -> Resumed`. A node may be linked only once.
///
/// Between `Linked` and `Resumed` the consumer briefly holds the node in a
/// waking state while it takes the waker. The owner does not complete
/// during that window, so a waker registered by a concurrent re-poll is
/// either taken by the consumer or made redundant by the result.
///
/// Dropping a node while it is still linked would leave a dangling pointer
/// in the queue; this is treated as a fatal contract violation and aborts
/// the process.
pub struct ContinuationNode<R = ()> {
    /// Resume handle of the suspended computation.
    waker: AtomicWaker,

    /// Value written by the resuming consumer.
    result: UnsafeCell<Option<R>>,

    /// Intrusive link to the next node of the chain.
    pub(crate) next: AtomicPtr<ContinuationNode<R>>,

    reason: SuspendReason,

    /// One of `IDLE`, `LINKED`, `RESUMED`, `ABANDONED`.
    state: AtomicU8,

    _pinned: PhantomPinned,
}

// Safety: the result slot is written only by the single consumer that
// detached the node and read only by the owner after observing `RESUMED`
// with acquire ordering.
unsafe impl<R: Send> Send for ContinuationNode<R> {}
unsafe impl<R: Send> Sync for ContinuationNode<R> {}

impl<R> ContinuationNode<R> {
    /// Creates an idle node.
    pub fn new(reason: SuspendReason) -> Self {
        Self {
            waker: AtomicWaker::new(),
            result: UnsafeCell::new(None),
            next: AtomicPtr::new(ptr::null_mut()),
            reason,
            state: AtomicU8::new(IDLE),
            _pinned: PhantomPinned,
        }
    }

    /// Returns the reason this node was created for.
    pub fn reason(&self) -> SuspendReason {
        self.reason
    }

    /// Returns `true` while the node is reachable from a queue.
    pub fn is_linked(&self) -> bool {
        matches!(self.state.load(Ordering::Acquire), LINKED | WAKING)
    }

    /// Returns `true` once a consumer resumed the node.
    pub fn is_resumed(&self) -> bool {
        self.state.load(Ordering::Acquire) == RESUMED
    }

    /// Stores the waker that will be woken when the node is resumed.
    ///
    /// Must be called before the node is handed to a queue, otherwise the
    /// resume only flips the node state and nobody is woken.
    pub fn prepare(self: Pin<&Self>, waker: &Waker) {
        self.waker.register(waker);
    }

    /// Polls the node for its result.
    ///
    /// Returns the value written by the consumer once the node was resumed.
    /// Otherwise the waker is refreshed and `Poll::Pending` is returned.
    ///
    /// # Panics
    ///
    /// Panics if the result was already taken, or if the queue holding the
    /// node was dropped before resuming it.
    pub fn poll_resumed(self: Pin<&Self>, cx: &mut Context<'_>) -> Poll<R> {
        if let Some(result) = self.try_take() {
            return Poll::Ready(result);
        }

        self.waker.register(cx.waker());

        // Pairs with the fence in `begin_wake`: either the consumer takes
        // this waker, or the re-check below observes it.
        atomic::fence(Ordering::SeqCst);

        match self.try_take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }

    fn try_take(&self) -> Option<R> {
        let mut state = self.state.load(Ordering::Acquire);
        while state == WAKING {
            std::hint::spin_loop();
            state = self.state.load(Ordering::Acquire);
        }

        match state {
            RESUMED => {
                // Safety: `RESUMED` was published after the consumer wrote
                // the slot; the consumer never touches the node again.
                let result = unsafe { (*self.result.get()).take() };
                Some(result.expect("continuation result already taken"))
            }
            ABANDONED => panic!(
                "continuation ({:?}) was abandoned: its queue was dropped before resuming it",
                self.reason
            ),
            _ => None,
        }
    }

    /// Transitions `Idle -> Linked`.
    ///
    /// # Panics
    ///
    /// Panics if the node was linked before.
    pub(crate) fn mark_linked(&self) {
        if let Err(previous) =
            self.state
                .compare_exchange(IDLE, LINKED, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "continuation node ({:?}) linked twice (state {previous})",
                self.reason
            );
        }
    }

    /// Transitions `Linked -> Idle` so the node can be linked into another
    /// transport.
    pub(crate) fn unlink_for_transfer(&self) {
        let previous = self.state.swap(IDLE, Ordering::AcqRel);
        debug_assert_eq!(previous, LINKED);
    }

    /// Writes `result` into the node and resumes its waker on the calling
    /// thread.
    ///
    /// # Safety
    ///
    /// `node` must point to a linked node that was exclusively detached by
    /// the caller. The node must not be accessed after this call: the
    /// owning frame may release it as soon as the state flips.
    pub(crate) unsafe fn resume(node: *const Self, result: R) {
        // Safety: guaranteed live by the caller, see above.
        let node = unsafe { &*node };

        // Safety: only the detaching consumer writes the slot.
        unsafe { *node.result.get() = Some(result) };

        let waker = node.begin_wake();

        // After this store the owning frame may release the node.
        node.state.store(RESUMED, Ordering::Release);

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Transitions `Linked -> Waking` and takes the registered waker.
    ///
    /// # Panics
    ///
    /// Panics if the node is not linked, e.g. when resumed twice.
    fn begin_wake(&self) -> Option<Waker> {
        if let Err(previous) =
            self.state
                .compare_exchange(LINKED, WAKING, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!(
                "continuation node ({:?}) resumed while not linked (state {previous})",
                self.reason
            );
        }

        atomic::fence(Ordering::SeqCst);
        self.waker.take()
    }

    /// Releases a linked node without a result.
    ///
    /// # Safety
    ///
    /// Same contract as [`resume`](Self::resume).
    pub(crate) unsafe fn abandon(node: *const Self) {
        // Safety: guaranteed live by the caller.
        let node = unsafe { &*node };
        let waker = node.begin_wake();

        node.state.store(ABANDONED, Ordering::Release);

        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<R> Drop for ContinuationNode<R> {
    fn drop(&mut self) {
        if matches!(*self.state.get_mut(), LINKED | WAKING) {
            tracing::error!(
                reason = ?self.reason,
                "suspended computation destroyed while its continuation is still linked"
            );
            std::process::abort();
        }
    }
}

impl<R> std::fmt::Debug for ContinuationNode<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state.load(Ordering::Relaxed) {
            IDLE => "idle",
            LINKED => "linked",
            RESUMED => "resumed",
            WAKING => "waking",
            _ => "abandoned",
        };

        f.debug_struct("ContinuationNode")
            .field("reason", &self.reason)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::pin;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::task::Wake;

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn resume_writes_result_and_wakes_once() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(counter.clone());
        let mut cx = Context::from_waker(&waker);

        let node = pin!(ContinuationNode::<u32>::new(SuspendReason::Queue));
        let node = node.into_ref();

        node.prepare(&waker);
        node.mark_linked();
        assert!(node.poll_resumed(&mut cx).is_pending());
        assert!(node.is_linked());

        unsafe { ContinuationNode::resume(&*node, 7) };

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(node.is_resumed());
        assert_eq!(node.poll_resumed(&mut cx), Poll::Ready(7));
    }

    #[test]
    fn resume_wakes_the_latest_registered_waker() {
        let first = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let second = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let first_waker = Waker::from(first.clone());
        let second_waker = Waker::from(second.clone());

        let node = pin!(ContinuationNode::<u8>::new(SuspendReason::Queue));
        let node = node.into_ref();

        node.prepare(&first_waker);
        node.mark_linked();

        // The owner is re-polled from somewhere else before the resume.
        let mut cx = Context::from_waker(&second_waker);
        assert!(node.poll_resumed(&mut cx).is_pending());

        unsafe { ContinuationNode::resume(&*node, 3) };

        assert_eq!(first.0.load(Ordering::SeqCst), 0);
        assert_eq!(second.0.load(Ordering::SeqCst), 1);
        assert_eq!(node.poll_resumed(&mut cx), Poll::Ready(3));
    }

    #[test]
    fn concurrent_repoll_never_misses_the_resume() {
        use std::thread;

        for _ in 0..200 {
            let woken = Arc::new(CountingWaker(AtomicUsize::new(0)));
            let waker = Waker::from(woken.clone());

            let node = Box::pin(ContinuationNode::<u8>::new(SuspendReason::Queue));
            node.as_ref().prepare(Waker::noop());
            node.mark_linked();

            let address = &*node as *const ContinuationNode<u8> as usize;
            let resumer = thread::spawn(move || {
                // Safety: the node outlives the thread, which is joined
                // before the node is dropped.
                unsafe { ContinuationNode::resume(address as *const ContinuationNode<u8>, 1) };
            });

            let mut cx = Context::from_waker(&waker);
            let ready = node.as_ref().poll_resumed(&mut cx).is_ready();
            resumer.join().unwrap();

            // Pending must be followed by a wake-up of the new waker.
            assert!(ready || woken.0.load(Ordering::SeqCst) == 1);
        }
    }

    #[test]
    #[should_panic(expected = "linked twice")]
    fn linking_twice_panics() {
        let node = pin!(ContinuationNode::<()>::new(SuspendReason::Queue));
        let node = node.into_ref();

        node.mark_linked();
        // Resume first so the node can be dropped during unwinding.
        unsafe { ContinuationNode::resume(&*node, ()) };
        node.mark_linked();
    }

    #[test]
    #[should_panic(expected = "abandoned")]
    fn abandoned_node_panics_on_poll() {
        let waker = Waker::noop();
        let mut cx = Context::from_waker(waker);

        let node = pin!(ContinuationNode::<()>::new(SuspendReason::Checkpoint));
        let node = node.into_ref();

        node.mark_linked();
        unsafe { ContinuationNode::abandon(&*node) };

        let _ = node.poll_resumed(&mut cx);
    }
}
