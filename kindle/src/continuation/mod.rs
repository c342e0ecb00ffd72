//! Suspended continuations and the lock-free queue that links them.
//!
//! A [`ContinuationNode`] represents one computation waiting for something.
//! It lives inside the future that suspended and is linked, without any
//! allocation, into a [`ContinuationQueue`] owned by the awaited primitive.
//! Consumers later detach the chain and resume each node exactly once.

mod node;
mod queue;

pub use node::{ContinuationNode, SuspendReason};
pub use queue::{ContinuationQueue, Suspend};
