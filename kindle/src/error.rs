//! Error types.

use std::io;

use thiserror::Error;

/// Errors raised while creating a [`ThreadPool`](crate::scheduler::ThreadPool).
#[derive(Debug, Error)]
pub enum PoolError {
    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker thread {index}")]
    SpawnWorker {
        index: usize,
        #[source]
        source: io::Error,
    },

    /// The native thread pool could not be created or configured.
    #[error("failed to create the native thread pool")]
    NativePool(#[source] io::Error),
}

pub type Result<T, E = PoolError> = std::result::Result<T, E>;
