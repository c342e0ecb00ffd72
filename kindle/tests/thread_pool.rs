use kindle::continuation::ContinuationQueue;
use kindle::task::{await_scheduled, execute_detached, schedule_on, wait_for};
use kindle::{InlineScheduler, Task, TaskScheduler, ThreadPool, ThreadPoolBuilder};

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[test]
fn schedule_resumes_on_a_pool_thread() {
    init_tracing();
    let pool = ThreadPoolBuilder::new().worker_threads(2).build().unwrap();
    let caller = thread::current().id();

    let resumed_on = wait_for(Task::new(async {
        pool.schedule().await;
        thread::current().id()
    }));

    assert_ne!(resumed_on, caller);
}

#[cfg(not(windows))]
#[test]
fn workers_are_named_after_the_prefix() {
    let pool = ThreadPool::builder()
        .worker_threads(1)
        .thread_name("loader")
        .build()
        .unwrap();

    let name = wait_for(Task::new(async {
        pool.schedule().await;
        thread::current().name().map(String::from)
    }));

    assert_eq!(name.as_deref(), Some("loader 00"));
    assert_eq!(pool.thread_count(), 1);
}

#[test]
fn computation_stays_on_the_pool_after_resuming() {
    let pool = ThreadPool::builder().worker_threads(1).build().unwrap();

    let (first, second) = wait_for(Task::new(async {
        pool.schedule().await;
        let first = thread::current().id();
        pool.schedule().await;
        (first, thread::current().id())
    }));

    // A single worker resumes both halves.
    assert_eq!(first, second);
    assert_ne!(first, thread::current().id());
}

#[test]
fn scheduled_batch_runs_on_worker_threads() {
    init_tracing();
    let pool = ThreadPoolBuilder::new().worker_threads(4).build().unwrap();
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let caller = thread::current().id();

    let tasks = (0..32)
        .map(|_| {
            let seen = seen.clone();
            Task::new(async move {
                seen.lock().unwrap().insert(thread::current().id());
            })
        })
        .collect();

    wait_for(Task::new(await_scheduled(tasks, &pool)));

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.len() <= 4);
    assert!(!seen.contains(&caller));
}

#[test]
fn dropping_the_pool_resumes_every_submitted_node() {
    init_tracing();
    const TASKS: usize = 64;

    let queue = Arc::new(ContinuationQueue::<()>::new());
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..TASKS {
        let queue = queue.clone();
        let counter = counter.clone();

        execute_detached(Task::new(async move {
            queue.suspend().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let pool = ThreadPoolBuilder::new().worker_threads(2).build().unwrap();
    assert_eq!(pool.schedule_queue(&queue), TASKS);
    assert!(queue.is_empty());

    drop(pool);
    assert_eq!(counter.load(Ordering::SeqCst), TASKS);
}

#[test]
fn schedule_on_wraps_a_task() {
    let pool = ThreadPoolBuilder::new().worker_threads(1).build().unwrap();
    let caller = thread::current().id();

    let task = Task::new(async { thread::current().id() });
    let ran_on = wait_for(schedule_on(task, &pool));

    assert_ne!(ran_on, caller);
}

#[test]
fn inline_scheduler_as_explicit_fallback() {
    let scheduler: Box<dyn TaskScheduler> = match ThreadPoolBuilder::new().worker_threads(1).build() {
        Ok(pool) => Box::new(pool),
        Err(error) => {
            eprintln!("falling back to inline scheduling: {error}");
            Box::new(InlineScheduler)
        }
    };

    let value = wait_for(schedule_on(Task::new(async { 5 }), scheduler.as_ref()));
    assert_eq!(value, 5);
}

#[test]
#[should_panic(expected = "worker_threads must be > 0")]
fn zero_worker_threads_panics() {
    let _ = ThreadPoolBuilder::new().worker_threads(0);
}
