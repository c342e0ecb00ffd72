use super::node::{ContinuationNode, SuspendReason};

use parking_lot::Mutex;

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::task::{Context, Poll};

/// A lock-free, multi-producer queue of suspended continuations.
///
/// The queue is intrusive: nodes live inside the futures that suspended and
/// are chained through their own `next` pointer, so pushing never
/// allocates. Producers prepend with a compare-and-swap loop and never
/// block. Consumers detach the chain with an atomic swap; they are
/// serialized among themselves for the short time they hold a detached
/// chain that is not resumed yet, so a consumer never observes a queue
/// that looks empty while another one is splicing nodes back.
///
/// # Drain order
///
/// Every consume starts by swapping the head out, which yields the
/// detached chain newest-first. [`process_all`](Self::process_all)
/// reverses that chain and resumes it in push order, and
/// [`process_one`](Self::process_one) resumes the oldest node of the
/// linked chain; nodes it leaves behind stay older than anything pushed
/// meanwhile. Nodes pushed concurrently with a drain are left for the next
/// drain; no ordering is promised between racing producers.
///
/// # Panics during a drain
///
/// A resumed computation may panic on the draining thread. Batch drains
/// still resume every node they detached, then propagate the first panic.
pub struct ContinuationQueue<R = ()> {
    /// Newest node of the chain, or null.
    head: AtomicPtr<ContinuationNode<R>>,

    /// Held by consumers while they detach and splice.
    consumers: Mutex<()>,
}

// Safety: the queue only stores pointers to nodes that are `Send + Sync`
// for `R: Send`; every access to them goes through atomics.
unsafe impl<R: Send> Send for ContinuationQueue<R> {}
unsafe impl<R: Send> Sync for ContinuationQueue<R> {}

impl<R> ContinuationQueue<R> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            consumers: Mutex::new(()),
        }
    }

    /// Returns `true` if no node is currently linked.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Acquire).is_null()
    }

    /// Links `node` into the queue.
    ///
    /// Lock-free and safe under any number of concurrent producers. The
    /// node should have been [prepared](ContinuationNode::prepare) with the
    /// waker of the suspending computation.
    ///
    /// # Panics
    ///
    /// Panics if the node is already linked somewhere.
    pub fn push_back(&self, node: Pin<&ContinuationNode<R>>) {
        node.mark_linked();

        let node = node.get_ref() as *const ContinuationNode<R> as *mut ContinuationNode<R>;
        let mut current = self.head.load(Ordering::Relaxed);

        loop {
            // Safety: the node is pinned, cannot be released while linked,
            // and is not reachable by anyone else until the swap succeeds.
            unsafe { (*node).next.store(current, Ordering::Relaxed) };

            match self.head.compare_exchange_weak(
                current,
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Links the chain `first ..= last` behind every node currently linked.
    ///
    /// # Safety
    ///
    /// The caller must hold the consumer lock and exclusively own the
    /// chain; every node in it must be linked and alive.
    unsafe fn append_chain(&self, first: *mut ContinuationNode<R>, last: *mut ContinuationNode<R>) {
        // Safety: `last` is owned by the caller.
        unsafe { (*last).next.store(ptr::null_mut(), Ordering::Relaxed) };

        let current = match self.head.compare_exchange(
            ptr::null_mut(),
            first,
            Ordering::Release,
            Ordering::Acquire,
        ) {
            Ok(_) => return,
            Err(current) => current,
        };

        // Producers only prepend and consumers are locked out, so the
        // tail of the current chain stays put.
        let mut tail = current;
        // Safety: linked nodes are alive until a consumer resumes them.
        unsafe {
            loop {
                let next = (*tail).next.load(Ordering::Acquire);
                if next.is_null() {
                    break;
                }
                tail = next;
            }
            (*tail).next.store(first, Ordering::Release);
        }
    }

    /// Detaches the current chain, newest node first.
    fn detach(&self) -> *mut ContinuationNode<R> {
        let _consumer = self.consumers.lock();
        self.head.swap(ptr::null_mut(), Ordering::Acquire)
    }

    /// Resumes a single node on the calling thread.
    ///
    /// The oldest node of the currently linked chain receives `result` and
    /// is resumed; the remaining nodes are linked back behind anything
    /// pushed meanwhile. Returns `false` without doing anything if no node
    /// was linked, also while other consumers run concurrently.
    pub fn process_one(&self, result: R) -> bool {
        let oldest = {
            let _consumer = self.consumers.lock();

            let head = self.head.swap(ptr::null_mut(), Ordering::Acquire);
            if head.is_null() {
                return false;
            }

            let mut previous: *mut ContinuationNode<R> = ptr::null_mut();
            let mut oldest = head;

            // Safety: the detached chain is exclusively ours and every node
            // in it is alive until resumed.
            unsafe {
                loop {
                    let next = (*oldest).next.load(Ordering::Relaxed);
                    if next.is_null() {
                        break;
                    }
                    previous = oldest;
                    oldest = next;
                }

                if !previous.is_null() {
                    self.append_chain(head, previous);
                }
            }

            oldest
        };

        // Safety: `oldest` was unlinked from the chain above and is ours.
        unsafe { ContinuationNode::resume(oldest, result) };

        tracing::trace!("continuation queue resumed one node");
        true
    }

    /// Resumes every currently linked node on the calling thread.
    ///
    /// Each node receives a clone of `result`. Nodes are resumed in push
    /// order. Returns the number of resumed nodes.
    ///
    /// # Panics
    ///
    /// If a resumed computation panics, the remaining nodes are still
    /// resumed before the first panic is propagated.
    pub fn process_all(&self, result: R) -> usize
    where
        R: Clone,
    {
        let (count, panicked) = self.drain(result);

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }

        count
    }

    /// Resumes every currently linked node and catches panics raised by
    /// the resumed computations.
    ///
    /// Returns the number of resumed nodes and the first panic payload.
    pub(crate) fn drain(&self, result: R) -> (usize, Option<Box<dyn Any + Send>>)
    where
        R: Clone,
    {
        self.consume_detached(|node| {
            // Safety: the node was detached by `consume_detached` and is
            // not touched again by the queue.
            unsafe { ContinuationNode::resume(node.get_ref(), result.clone()) };
        })
    }

    /// Detaches every linked node and hands it to `f` in push order.
    ///
    /// Used by schedulers that move nodes to another transport. Like
    /// [`process_all`](Self::process_all), a panic raised by `f` is
    /// propagated once every node was handed over.
    pub(crate) fn consume(&self, mut f: impl FnMut(Pin<&ContinuationNode<R>>)) -> usize {
        let (count, panicked) = self.consume_detached(|node| {
            node.unlink_for_transfer();
            f(node);
        });

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }

        count
    }

    fn consume_detached(
        &self,
        mut f: impl FnMut(Pin<&ContinuationNode<R>>),
    ) -> (usize, Option<Box<dyn Any + Send>>) {
        let mut node = reverse(self.detach());
        let mut count = 0;
        let mut panicked = None;

        while !node.is_null() {
            // Safety: the chain is exclusively ours; `next` is read and
            // cleared before `f` may release or relink the node.
            let outcome = unsafe {
                let next = (*node).next.swap(ptr::null_mut(), Ordering::Relaxed);
                let current = Pin::new_unchecked(&*node);
                node = next;

                panic::catch_unwind(AssertUnwindSafe(|| f(current)))
            };
            count += 1;

            if let Err(payload) = outcome {
                tracing::error!("resumed computation panicked during a queue drain");
                panicked.get_or_insert(payload);
            }
        }

        if count > 0 {
            tracing::trace!(count, "continuation queue drained");
        }

        (count, panicked)
    }

    /// Returns an awaitable that suspends on this queue.
    ///
    /// The awaiting computation completes with the value passed to the
    /// [`process_one`](Self::process_one) or
    /// [`process_all`](Self::process_all) call that resumes it.
    pub fn suspend(&self) -> Suspend<'_, R> {
        Suspend {
            queue: self,
            node: ContinuationNode::new(SuspendReason::Queue),
            linked: false,
        }
    }
}

impl<R> Default for ContinuationQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Drop for ContinuationQueue<R> {
    /// Abandons every node still linked.
    ///
    /// Their owners observe the abandonment as a panic on their next poll.
    fn drop(&mut self) {
        let mut node = *self.head.get_mut();

        if !node.is_null() {
            tracing::error!("continuation queue dropped with suspended computations");
        }

        while !node.is_null() {
            // Safety: linked nodes are alive; `next` is read first.
            unsafe {
                let next = (*node).next.load(Ordering::Relaxed);
                ContinuationNode::abandon(node);
                node = next;
            }
        }
    }
}

impl<R> std::fmt::Debug for ContinuationQueue<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationQueue")
            .field("empty", &self.is_empty())
            .finish()
    }
}

/// Reverses a detached chain in place and returns its new head.
fn reverse<R>(mut node: *mut ContinuationNode<R>) -> *mut ContinuationNode<R> {
    let mut reversed = ptr::null_mut();

    while !node.is_null() {
        // Safety: callers pass a chain they exclusively own.
        unsafe {
            let next = (*node).next.load(Ordering::Relaxed);
            (*node).next.store(reversed, Ordering::Relaxed);
            reversed = node;
            node = next;
        }
    }

    reversed
}

/// Future returned by [`ContinuationQueue::suspend`].
pub struct Suspend<'a, R> {
    queue: &'a ContinuationQueue<R>,
    node: ContinuationNode<R>,
    linked: bool,
}

impl<R> Future for Suspend<'_, R> {
    type Output = R;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<R> {
        // Safety: the node is never moved out of the pinned future.
        let this = unsafe { self.get_unchecked_mut() };
        let node = unsafe { Pin::new_unchecked(&this.node) };

        if !this.linked {
            this.linked = true;
            node.prepare(cx.waker());
            this.queue.push_back(node);
            return Poll::Pending;
        }

        node.poll_resumed(cx)
    }
}
