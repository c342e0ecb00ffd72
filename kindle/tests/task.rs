use kindle::continuation::ContinuationQueue;
use kindle::task::{await_all, execute_detached, wait_for, wait_for_all};
use kindle::{Task, TaskState};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug)]
struct Mesh {
    vertices: Vec<f32>,
}

#[kindle::test]
async fn reference_result_is_the_same_instance() {
    let mesh = Mesh {
        vertices: vec![0.0, 1.0, 2.0],
    };

    let borrowed = Task::new(async { &mesh }).await;

    assert!(std::ptr::eq(borrowed, &mesh));
    assert_eq!(borrowed.vertices.len(), 3);
}

#[kindle::test]
async fn tasks_chain_through_await() {
    async fn load(id: u32) -> u32 {
        id * 10
    }

    let first = Task::new(load(1));
    let second = Task::new(async move { first.await + load(2).await });

    assert_eq!(second.await, 30);
}

#[test]
fn tasks_start_lazily() {
    let started = Arc::new(AtomicBool::new(false));

    let task = Task::new({
        let started = started.clone();
        async move {
            started.store(true, Ordering::SeqCst);
        }
    });

    assert!(!started.load(Ordering::SeqCst));
    assert_eq!(task.state(), TaskState::Created);

    wait_for(task);
    assert!(started.load(Ordering::SeqCst));
}

#[test]
fn handle_follows_the_lifecycle() {
    let queue = Arc::new(ContinuationQueue::<()>::new());

    let task = Task::new({
        let queue = queue.clone();
        async move { queue.suspend().await }
    });
    let handle = task.handle();

    execute_detached(task);
    assert!(handle.is_suspended());
    assert!(!handle.has_finished());

    queue.process_all(());
    assert!(handle.has_finished());
    assert!(handle.has_succeeded());
}

#[test]
fn cancel_is_advisory() {
    let queue = Arc::new(ContinuationQueue::<()>::new());
    let observed = Arc::new(AtomicBool::new(false));

    let task = Task::with_handle({
        let queue = queue.clone();
        let observed = observed.clone();
        move |me| async move {
            queue.suspend().await;
            observed.store(me.is_canceled(), Ordering::SeqCst);
        }
    });
    let handle = task.handle();

    execute_detached(task);
    assert!(handle.cancel());

    // The computation still runs to completion and sees the request.
    queue.process_all(());
    assert!(observed.load(Ordering::SeqCst));
    assert_eq!(handle.state(), TaskState::Canceled);
    assert!(!handle.cancel());
}

#[test]
fn cancel_after_completion_is_refused() {
    let task = Task::new(async { 1 });
    let handle = task.handle();

    assert_eq!(wait_for(task), 1);
    assert!(!handle.cancel());
    assert!(handle.has_succeeded());
}

#[test]
fn fallible_task_reports_failure_as_state() {
    let task = Task::fallible(async { "not a number".parse::<u32>() });
    let handle = task.handle();

    let result = wait_for(task);

    assert!(result.is_err());
    assert!(handle.has_failed());
    assert!(handle.has_finished());
}

#[test]
fn panic_is_resumed_on_the_waiting_thread() {
    fn explode() -> u32 {
        panic!("broken invariant")
    }

    let task = Task::new(async { explode() });
    let handle = task.handle();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| wait_for(task)));

    assert!(outcome.is_err());
    assert!(handle.has_failed());
}

#[test]
fn wait_for_all_runs_every_task() {
    let counter = Arc::new(AtomicUsize::new(0));

    let tasks = (0..10)
        .map(|_| {
            let counter = counter.clone();
            Task::new(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    wait_for_all(tasks);
    assert_eq!(counter.load(Ordering::SeqCst), 10);
}

#[kindle::test]
async fn await_all_collects_values_in_order() {
    let tasks = (1..=4).map(|i| Task::new(async move { i * i })).collect();

    assert_eq!(await_all(tasks).await, [1, 4, 9, 16]);
}

#[kindle::test]
async fn empty_task_completes_immediately() {
    let task = Task::default();

    assert!(task.is_ready());
    task.await;
}
