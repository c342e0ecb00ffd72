//! Transports that resume suspended computations elsewhere.
//!
//! A [`TaskScheduler`] takes a linked [`ContinuationNode`] and resumes it
//! later, possibly on another thread. It performs no queuing policy of its
//! own. Awaiting [`TaskScheduler::schedule`] moves the rest of the awaiting
//! computation onto the scheduler.
//!
//! Available transports:
//! - [`ThreadPool`] — OS worker threads,
//! - [`InlineScheduler`] — resumes immediately on the scheduling thread,
//! - [`ContinuationQueue<()>`] — parks nodes until the queue's owner drains
//!   it, e.g. once per frame on the main thread.

mod builder;
mod inline;
mod pool;

pub use builder::ThreadPoolBuilder;
pub use inline::InlineScheduler;
pub use pool::ThreadPool;

use crate::continuation::{ContinuationNode, ContinuationQueue, SuspendReason};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Resumes continuation nodes on some execution resource.
pub trait TaskScheduler: Send + Sync {
    /// Takes over `node` and resumes it later.
    ///
    /// The node is idle and prepared with its waker. Implementations link
    /// it into their transport and eventually resume it exactly once.
    fn schedule_node(&self, node: Pin<&ContinuationNode<()>>);

    /// Returns an awaitable moving the awaiting computation onto this
    /// scheduler.
    fn schedule(&self) -> Schedule<'_, Self>
    where
        Self: Sized,
    {
        Schedule::new(self)
    }

    /// Moves every node linked into `queue` onto this scheduler, in push
    /// order. Returns the number of moved nodes.
    fn schedule_queue(&self, queue: &ContinuationQueue<()>) -> usize {
        let count = queue.consume(|node| self.schedule_node(node));
        if count > 0 {
            tracing::trace!(count, "continuation queue moved to scheduler");
        }
        count
    }
}

impl TaskScheduler for ContinuationQueue<()> {
    fn schedule_node(&self, node: Pin<&ContinuationNode<()>>) {
        self.push_back(node);
    }
}

/// Future returned by [`TaskScheduler::schedule`].
pub struct Schedule<'a, S: ?Sized> {
    scheduler: &'a S,
    node: ContinuationNode<()>,
    scheduled: bool,
}

impl<'a, S> Schedule<'a, S>
where
    S: TaskScheduler + ?Sized,
{
    /// Creates the awaitable for `scheduler`.
    ///
    /// Useful with trait objects, where [`TaskScheduler::schedule`] is
    /// unavailable.
    pub fn new(scheduler: &'a S) -> Self {
        Self {
            scheduler,
            node: ContinuationNode::new(SuspendReason::Scheduler),
            scheduled: false,
        }
    }
}

impl<S> Future for Schedule<'_, S>
where
    S: TaskScheduler + ?Sized,
{
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Safety: the node is never moved out of the pinned future.
        let this = unsafe { self.get_unchecked_mut() };
        let node = unsafe { Pin::new_unchecked(&this.node) };

        if !this.scheduled {
            this.scheduled = true;
            node.prepare(cx.waker());
            this.scheduler.schedule_node(node);

            // Even if already resumed, the wake-up that follows is what
            // continues the computation on the scheduler's thread.
            return Poll::Pending;
        }

        node.poll_resumed(cx)
    }
}

impl<S: ?Sized> fmt::Debug for Schedule<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schedule")
            .field("node", &self.node)
            .field("scheduled", &self.scheduled)
            .finish()
    }
}
