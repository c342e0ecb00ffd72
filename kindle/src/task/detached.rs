use super::waker::make_waker;

use std::cell::UnsafeCell;
use std::future::Future;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::thread;

/// Not being polled; waiting for a wake-up.
const IDLE: usize = 0;

/// Being polled by exactly one thread.
const RUNNING: usize = 1;

/// Woken by the polling thread itself; must be polled again.
const NOTIFIED: usize = 2;

/// Finished, the future has been dropped.
const COMPLETED: usize = 3;

type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

thread_local! {
    static THREAD_TOKEN: u8 = const { 0 };
}

/// Identifies the calling thread for as long as it lives.
fn thread_token() -> usize {
    THREAD_TOKEN.with(|token| token as *const u8 as usize)
}

/// A computation running without an awaiter.
///
/// There is no executor behind it: it is polled on the thread that starts
/// it, and afterwards on whichever thread wakes it. A checkpoint opener or
/// a pool worker therefore resumes the computation inline, the same way a
/// coroutine handle is resumed.
///
/// A wake-up from another thread while the computation is still being
/// polled waits for that poll to return, then polls on the waking thread.
/// This is what lets a computation move to the thread that resumed it.
pub(crate) struct Detached {
    /// `None` once the computation completed.
    future: UnsafeCell<Option<BoxFuture<'static>>>,

    /// One of `IDLE`, `RUNNING`, `NOTIFIED`, `COMPLETED`.
    state: AtomicUsize,

    /// Token of the thread currently polling.
    runner: AtomicUsize,
}

// Safety: the future is only touched by the thread that moved the state to
// `RUNNING`.
unsafe impl Send for Detached {}
unsafe impl Sync for Detached {}

impl Detached {
    /// Starts `future` on the calling thread.
    ///
    /// Returns once the computation completed or suspended.
    pub(crate) fn spawn<F>(future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::start(Box::pin(future));
    }

    /// Starts a future that may borrow from the caller.
    ///
    /// # Safety
    ///
    /// Everything `future` borrows must stay alive until the future
    /// returned `Poll::Ready`. Completing drops every value it holds; only
    /// the empty frame allocation is released afterwards.
    pub(crate) unsafe fn spawn_unchecked<'a>(future: BoxFuture<'a>) {
        // Safety: upheld by the caller, see above.
        let future = unsafe { mem::transmute::<BoxFuture<'a>, BoxFuture<'static>>(future) };
        Self::start(future);
    }

    fn start(future: BoxFuture<'static>) {
        let detached = Arc::new(Detached {
            future: UnsafeCell::new(Some(future)),
            state: AtomicUsize::new(IDLE),
            runner: AtomicUsize::new(0),
        });

        detached.wake();
    }

    /// Signals that the computation can make progress.
    ///
    /// If it is idle, it is polled right away on the calling thread.
    pub(crate) fn wake(self: Arc<Self>) {
        loop {
            match self.state.load(Ordering::Acquire) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.run();
                        return;
                    }
                }
                RUNNING if self.runner.load(Ordering::Acquire) == thread_token() => {
                    // Woken from inside its own poll.
                    if self
                        .state
                        .compare_exchange(RUNNING, NOTIFIED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }
                }
                RUNNING => thread::yield_now(),
                _ => return,
            }
        }
    }

    /// Polls until the computation completes or goes idle.
    ///
    /// The caller must have moved the state to `RUNNING`.
    fn run(self: Arc<Self>) {
        let waker = make_waker(self.clone());
        let mut cx = Context::from_waker(&waker);

        loop {
            self.runner.store(thread_token(), Ordering::Release);

            // Safety: the `RUNNING` state grants exclusive access to the cell.
            let slot = unsafe { &mut *self.future.get() };

            let Some(future) = slot.as_mut() else {
                return;
            };

            let poll = panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)));

            match poll {
                Err(payload) => {
                    *slot = None;
                    self.runner.store(0, Ordering::Release);
                    self.state.store(COMPLETED, Ordering::Release);
                    panic::resume_unwind(payload);
                }
                Ok(Poll::Ready(())) => {
                    *slot = None;
                    self.runner.store(0, Ordering::Release);
                    self.state.store(COMPLETED, Ordering::Release);
                    return;
                }
                Ok(Poll::Pending) => {
                    self.runner.store(0, Ordering::Release);

                    if self
                        .state
                        .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return;
                    }

                    self.state.store(RUNNING, Ordering::Release);
                }
            }
        }
    }
}
