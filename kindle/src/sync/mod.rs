//! Synchronization primitives for Kindle.
//!
//! - [`TaskCheckpoint`] — a gate that suspends arriving computations until
//!   it is opened, then resumes all of them on the opening thread.
//! - [`CheckpointRegistry`] — an owned, named collection of checkpoints.
//! - [`ManualResetEvent`] and [`ManualResetBarrier`] — blocking primitives
//!   for threads that wait on computations from the outside.
//!
//! ## Design notes
//!
//! - Checkpoints never allocate when a computation suspends; the waiter's
//!   continuation lives inside its own future.
//! - The blocking primitives park the calling OS thread and are meant for
//!   synchronous callers only, not for use inside a task.

mod checkpoint;
mod event;
mod registry;

pub use checkpoint::{CheckpointGate, TaskCheckpoint};
pub use event::{ManualResetBarrier, ManualResetEvent};
pub use registry::CheckpointRegistry;
