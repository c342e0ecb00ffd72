//! # Kindle
//!
//! **Kindle** is the cooperative task core of the **Nebula** engine. It lets
//! engine systems express asynchronous work (loading, render submission,
//! world updates) as suspendable computations instead of dedicating a
//! thread to each job.
//!
//! Kindle has no executor loop. Each primitive decides where a suspended
//! computation resumes: inline on the thread that releases it, or on a
//! worker of a [`ThreadPool`]. It offers:
//!
//! - **Lazy tasks** that only start when awaited, with an observable
//!   lifecycle state
//! - An **intrusive lock-free queue** of suspended continuations that never
//!   allocates on suspension
//! - **Checkpoints**, gates that hold arriving computations until opened
//! - **Schedulers** moving computations onto OS worker threads
//! - A **scoped batch container** that never lets its computations outlive
//!   it
//! - **Ergonomic macros** like `#[kindle::main]` and `#[kindle::test]`
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kindle::sync::TaskCheckpoint;
//! use kindle::task::{Task, execute_detached};
//! use std::sync::Arc;
//!
//! fn main() {
//!     let loaded = Arc::new(TaskCheckpoint::new(false));
//!
//!     execute_detached(Task::new({
//!         let loaded = loaded.clone();
//!         async move {
//!             loaded.checkpoint_gate().await;
//!             println!("assets ready");
//!         }
//!     }));
//!
//!     // Resumes the waiting computation on this thread.
//!     loaded.open();
//! }
//! ```
//!
//! ## Modules
//!
//! - [`continuation`] — Continuation nodes and the lock-free queue
//! - [`task`] — Deferred computations and the functions that run them
//! - [`sync`] — Checkpoints, their registry, events and barriers
//! - [`scheduler`] — Thread pool and other resumption transports
//! - [`diagnostics`] — Frame allocation hooks
//!
//! ## Getting Started
//!
//! Add Kindle to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! kindle = { git = "https://github.com/Nebula-ecosystem/Kindle", package = "kindle" }
//! ```

mod container;

pub mod continuation;
pub mod diagnostics;
pub mod error;
pub mod scheduler;
pub mod sync;
pub mod task;

pub use container::ScopedTaskContainer;
pub use error::PoolError;
pub use scheduler::{InlineScheduler, TaskScheduler, ThreadPool, ThreadPoolBuilder};
pub use task::{Task, TaskHandle, TaskState};

pub use kindle_macros::*;
