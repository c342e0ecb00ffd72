use kindle::Task;
use kindle::sync::{CheckpointRegistry, TaskCheckpoint};
use kindle::task::execute_detached;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

#[test]
fn three_computations_wait_for_the_checkpoint() {
    let checkpoint = Arc::new(TaskCheckpoint::new(false));
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let checkpoint = checkpoint.clone();
        let counter = counter.clone();

        execute_detached(Task::new(async move {
            checkpoint.checkpoint_gate().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert!(!checkpoint.is_open());
    assert_eq!(checkpoint.waiting(), Some(3));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    assert!(checkpoint.open());
    assert!(checkpoint.is_open());
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[kindle::test]
async fn initially_open_checkpoint_lets_awaiters_through() {
    let checkpoint = TaskCheckpoint::new(true);

    assert!(checkpoint.is_open());
    checkpoint.checkpoint_gate().await;
    checkpoint.checkpoint_gate().await;
    assert_eq!(checkpoint.waiting(), None);
}

#[test]
fn awaiting_after_open_does_not_suspend() {
    let checkpoint = Arc::new(TaskCheckpoint::new(false));
    let counter = Arc::new(AtomicUsize::new(0));

    checkpoint.open();

    let task = Task::new({
        let checkpoint = checkpoint.clone();
        let counter = counter.clone();
        async move {
            checkpoint.checkpoint_gate().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    execute_detached(task);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn reused_across_rounds() {
    let checkpoint = Arc::new(TaskCheckpoint::new(false));
    let counter = Arc::new(AtomicUsize::new(0));

    for round in 1..=4 {
        for _ in 0..round {
            let checkpoint = checkpoint.clone();
            let counter = counter.clone();

            execute_detached(Task::new(async move {
                checkpoint.checkpoint_gate().await;
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert!(checkpoint.open());
        checkpoint.close();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1 + 2 + 3 + 4);
}

#[test]
fn concurrent_waiters_racing_open_are_resumed_exactly_once() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 200;
    const ROUNDS: usize = 20;

    for _ in 0..ROUNDS {
        let checkpoint = Arc::new(TaskCheckpoint::new(false));
        let resumed: Arc<Vec<AtomicUsize>> = Arc::new(
            (0..THREADS * PER_THREAD)
                .map(|_| AtomicUsize::new(0))
                .collect(),
        );

        let waiters: Vec<_> = (0..THREADS)
            .map(|t| {
                let checkpoint = checkpoint.clone();
                let resumed = resumed.clone();

                thread::spawn(move || {
                    for i in 0..PER_THREAD {
                        let id = t * PER_THREAD + i;
                        let checkpoint = checkpoint.clone();
                        let resumed = resumed.clone();

                        execute_detached(Task::new(async move {
                            checkpoint.checkpoint_gate().await;
                            resumed[id].fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();

        // Open while waiters are still arriving.
        thread::yield_now();
        checkpoint.open();

        for waiter in waiters {
            waiter.join().unwrap();
        }

        assert!(checkpoint.is_open());
        assert!(
            resumed
                .iter()
                .all(|count| count.load(Ordering::SeqCst) == 1)
        );
    }
}

#[test]
fn registry_opens_named_checkpoints() {
    let registry = CheckpointRegistry::new();
    let loaded = registry.register("assets.loaded", false);
    let counter = Arc::new(AtomicUsize::new(0));

    {
        let gate = registry.find("assets.loaded").unwrap();
        let counter = counter.clone();

        execute_detached(Task::new(async move {
            gate.checkpoint_gate().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(registry.open_all(), 1);
    assert!(loaded.is_open());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn panicking_waiter_still_releases_the_others() {
    fn explode() {
        panic!("waiter failed after the checkpoint");
    }

    let checkpoint = Arc::new(TaskCheckpoint::new(false));
    let counter = Arc::new(AtomicUsize::new(0));

    for i in 0..3 {
        let checkpoint = checkpoint.clone();
        let counter = counter.clone();

        execute_detached(Task::new(async move {
            checkpoint.checkpoint_gate().await;
            if i == 0 {
                explode();
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| checkpoint.open()));

    assert!(outcome.is_err());
    assert!(checkpoint.is_open());
    assert_eq!(checkpoint.waiting(), None);
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    // The checkpoint stays usable for the next round.
    checkpoint.close();
    assert_eq!(checkpoint.waiting(), Some(0));
}
