use parking_lot::{Condvar, Mutex};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// A blocking event that stays signalled until reset.
///
/// # Examples
///
/// ```rust,ignore
/// let event = Arc::new(ManualResetEvent::new());
///
/// let waiter = thread::spawn({
///     let event = event.clone();
///     move || event.wait()
/// });
///
/// event.set();
/// waiter.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ManualResetEvent {
    set: AtomicBool,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl ManualResetEvent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals the event and releases every waiting thread.
    pub fn set(&self) {
        let _guard = self.lock.lock();
        self.set.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    pub fn reset(&self) {
        self.set.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the event is set.
    pub fn wait(&self) {
        if self.is_set() {
            return;
        }

        let mut guard = self.lock.lock();
        while !self.is_set() {
            self.condvar.wait(&mut guard);
        }
    }
}

/// A countdown that releases waiters once it reaches zero.
///
/// Used to wait for a batch of detached tasks: the count is raised to the
/// batch size, and every task signals once when it finishes.
#[derive(Debug, Default)]
pub struct ManualResetBarrier {
    remaining: AtomicU32,
    lock: Mutex<()>,
    condvar: Condvar,
}

impl ManualResetBarrier {
    /// Creates a barrier expecting `count` signals.
    pub fn new(count: u32) -> Self {
        Self {
            remaining: AtomicU32::new(count),
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Sets the number of expected signals.
    pub fn reset(&self, count: u32) {
        self.remaining.store(count, Ordering::Release);
    }

    /// Raises the number of expected signals by `count`.
    pub fn add(&self, count: u32) {
        self.remaining.fetch_add(count, Ordering::AcqRel);
    }

    /// Records one signal, releasing the waiters if it was the last one.
    ///
    /// # Panics
    ///
    /// Panics if no signal was expected.
    pub fn signal(&self) {
        let Ok(previous) =
            self.remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        else {
            panic!("barrier signalled more often than expected");
        };

        if previous == 1 {
            let _guard = self.lock.lock();
            self.condvar.notify_all();
        }
    }

    /// Returns the number of signals still expected.
    pub fn value(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_set(&self) -> bool {
        self.value() == 0
    }

    /// Blocks the calling thread until every expected signal arrived.
    pub fn wait(&self) {
        if self.is_set() {
            return;
        }

        let mut guard = self.lock.lock();
        while !self.is_set() {
            self.condvar.wait(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;

    #[test]
    fn event_releases_waiters() {
        let event = Arc::new(ManualResetEvent::new());

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let event = event.clone();
                thread::spawn(move || event.wait())
            })
            .collect();

        event.set();
        for waiter in waiters {
            waiter.join().unwrap();
        }

        assert!(event.is_set());
        event.reset();
        assert!(!event.is_set());
    }

    #[test]
    fn barrier_counts_down() {
        let barrier = Arc::new(ManualResetBarrier::new(3));

        let signallers: Vec<_> = (0..3)
            .map(|_| {
                let barrier = barrier.clone();
                thread::spawn(move || barrier.signal())
            })
            .collect();

        barrier.wait();
        assert!(barrier.is_set());

        for signaller in signallers {
            signaller.join().unwrap();
        }
    }

    #[test]
    #[should_panic(expected = "more often than expected")]
    fn barrier_rejects_extra_signals() {
        let barrier = ManualResetBarrier::new(0);
        barrier.signal();
    }
}
